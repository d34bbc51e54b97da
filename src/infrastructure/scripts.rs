//! 页面内执行的 JS 片段
//!
//! 参数一律经 `serde_json` 序列化后以 `const` 声明注入，脚本体本身不做字符串拼接。

use serde_json::Value as JsonValue;

/// 元素标记属性名
pub const REF_ATTR: &str = "data-amk-ref";

/// 公共辅助函数：按 frame 路径解析文档、按标记找元素、给元素打标记
const PRELUDE: &str = r#"
const __amkDoc = (framePath) => {
    let d = document;
    const off = { top: 0, left: 0 };
    for (const i of framePath) {
        const frames = d.querySelectorAll('iframe, frame');
        const f = frames[i];
        if (!f) return null;
        const r = f.getBoundingClientRect();
        off.top += r.top;
        off.left += r.left;
        let sub = null;
        try { sub = f.contentDocument; } catch (e) { sub = null; }
        if (!sub) return null;
        d = sub;
    }
    return { doc: d, off };
};
const __amkEl = (framePath, token) => {
    const c = __amkDoc(framePath);
    if (!c) return null;
    const el = c.doc.querySelector('[data-amk-ref="' + token + '"]');
    return el ? { el, off: c.off } : null;
};
const __amkTag = (el) => {
    let t = el.getAttribute('data-amk-ref');
    if (!t) {
        window.__amkSeq = (window.__amkSeq || 0) + 1;
        t = 'r' + window.__amkSeq;
        el.setAttribute('data-amk-ref', t);
    }
    return t;
};
const __amkRequire = (framePath, token) => {
    const found = __amkEl(framePath, token);
    if (!found) throw new Error('element detached: ' + token);
    return found;
};
"#;

pub const LOCATION: &str = r#"
return { href: location.href, host: location.host, title: document.title || '' };
"#;

pub const VISIBILITY: &str = r#"
return document.visibilityState === 'visible';
"#;

pub const CONTEXTS: &str = r#"
const out = [[]];
const walk = (d, path, depth) => {
    if (depth > 4) return;
    d.querySelectorAll('iframe, frame').forEach((f, i) => {
        let sub = null;
        try { sub = f.contentDocument; } catch (e) { sub = null; }
        if (sub && sub.documentElement) {
            const p = path.concat([i]);
            out.push(p);
            walk(sub, p, depth + 1);
        }
    });
};
walk(document, [], 0);
return out;
"#;

/// 参数：framePath, selector
pub const FIND: &str = r#"
const c = __amkDoc(framePath);
if (!c) return [];
let nodes = [];
try { nodes = Array.from(c.doc.querySelectorAll(selector)); } catch (e) { return []; }
return nodes.map((el) => ({ frame_path: framePath, token: __amkTag(el) }));
"#;

/// 参数：framePath, token
pub const DESCRIBE: &str = r#"
const { el } = __amkRequire(framePath, token);
const tag = el.tagName.toLowerCase();
const win = el.ownerDocument.defaultView || window;
const style = win.getComputedStyle(el);
const absolutize = (u) => { try { return new URL(u, el.ownerDocument.baseURI).href; } catch (e) { return u; } };
let kind = 'other';
let source = null;
if (tag === 'img') {
    kind = 'image';
    source = el.currentSrc || el.src || null;
} else if (tag === 'canvas') {
    kind = 'canvas';
} else if (tag === 'image') {
    kind = 'svg_image';
    const raw = el.getAttribute('href') || el.getAttribute('xlink:href') || (el.href && el.href.baseVal) || null;
    source = raw ? absolutize(raw) : null;
} else if (tag === 'input' || tag === 'textarea') {
    kind = 'input';
} else if (tag === 'button' || el.getAttribute('role') === 'button') {
    kind = 'button';
}
if (kind === 'other') {
    const bg = style.backgroundImage || '';
    const m = bg.match(/url\(["']?(.*?)["']?\)/);
    if (m && m[1]) {
        kind = 'container';
        source = absolutize(m[1]);
    }
}
const rect = el.getBoundingClientRect();
const visible = rect.width > 0 && rect.height > 0
    && style.visibility !== 'hidden' && style.display !== 'none'
    && parseFloat(style.opacity || '1') > 0;
let toggled = null;
if (tag === 'input' && (el.type === 'checkbox' || el.type === 'radio')) {
    toggled = !!el.checked;
} else if (el.hasAttribute('aria-checked')) {
    toggled = el.getAttribute('aria-checked') === 'true';
} else if (el.hasAttribute('aria-pressed')) {
    toggled = el.getAttribute('aria-pressed') === 'true';
}
const textOf = (n) => ((n && (n.innerText || n.textContent)) || '').trim();
const num = (v) => { const f = parseFloat(v); return Number.isFinite(f) && f > 0 ? f : null; };
const className = typeof el.className === 'string' ? el.className : (el.getAttribute('class') || '');
return {
    kind,
    tag,
    source,
    text: textOf(el).slice(0, 200),
    label: [el.getAttribute('aria-label'), el.getAttribute('title'), el.getAttribute('placeholder')]
        .filter(Boolean).join(' '),
    context_text: textOf(el.parentElement).slice(0, 80),
    class_name: className,
    visible,
    disabled: !!el.disabled || el.getAttribute('aria-disabled') === 'true',
    input_type: tag === 'input' ? (el.type || 'text') : null,
    toggled,
    declared_width: num(el.getAttribute('width')),
    declared_height: num(el.getAttribute('height')),
};
"#;

/// 参数：framePath, token
pub const MEASURE: &str = r#"
const { el, off } = __amkRequire(framePath, token);
const r = el.getBoundingClientRect();
return { top: r.top + off.top, left: r.left + off.left, width: r.width, height: r.height };
"#;

/// 参数：framePath, token
pub const CONTAINER: &str = r#"
const { el, off } = __amkRequire(framePath, token);
let p = el.parentElement;
while (p) {
    const r = p.getBoundingClientRect();
    if (r.width > 0 && r.height > 0) {
        return { top: r.top + off.top, left: r.left + off.left, width: r.width, height: r.height };
    }
    p = p.parentElement;
}
return null;
"#;

/// 参数：framePath, token；返回 data URL 或 null（画布被污染）
pub const READ_PIXELS: &str = r#"
const { el } = __amkRequire(framePath, token);
const tag = el.tagName.toLowerCase();
try {
    if (tag === 'canvas') return el.toDataURL('image/png');
    if (tag === 'img') {
        if (!el.complete || !el.naturalWidth) return null;
        const c = document.createElement('canvas');
        c.width = el.naturalWidth;
        c.height = el.naturalHeight;
        c.getContext('2d').drawImage(el, 0, 0);
        return c.toDataURL('image/png');
    }
} catch (e) {
    return null;
}
return null;
"#;

/// 参数：address；带 cookie 拉取并转为 data URL
pub const FETCH_CREDENTIALED: &str = r#"
try {
    const res = await fetch(address, { credentials: 'include', cache: 'no-store' });
    if (!res.ok) return null;
    const blob = await res.blob();
    return await new Promise((resolve) => {
        const reader = new FileReader();
        reader.onload = () => resolve(reader.result);
        reader.onerror = () => resolve(null);
        reader.readAsDataURL(blob);
    });
} catch (e) {
    return null;
}
"#;

/// 参数：address, timeoutMs；匿名跨域 Image 绘制到离屏画布
pub const FETCH_ANONYMOUS_IMAGE: &str = r#"
return await new Promise((resolve) => {
    const img = new Image();
    img.crossOrigin = 'anonymous';
    const timer = setTimeout(() => resolve(null), timeoutMs);
    img.onload = () => {
        clearTimeout(timer);
        try {
            const c = document.createElement('canvas');
            c.width = img.naturalWidth;
            c.height = img.naturalHeight;
            c.getContext('2d').drawImage(img, 0, 0);
            resolve(c.toDataURL('image/png'));
        } catch (e) {
            resolve(null);
        }
    };
    img.onerror = () => { clearTimeout(timer); resolve(null); };
    img.src = address;
});
"#;

/// 参数：framePath, token, event（"press" | "click" | "focus" | "enter"）
pub const DISPATCH: &str = r#"
const { el } = __amkRequire(framePath, token);
const win = el.ownerDocument.defaultView || window;
if (event === 'click') { el.click(); return true; }
if (event === 'focus') { el.focus(); return true; }
if (event === 'enter') {
    const k = { key: 'Enter', code: 'Enter', keyCode: 13, which: 13, bubbles: true, cancelable: true };
    el.dispatchEvent(new win.KeyboardEvent('keydown', k));
    el.dispatchEvent(new win.KeyboardEvent('keypress', k));
    el.dispatchEvent(new win.KeyboardEvent('keyup', k));
    return true;
}
const r = el.getBoundingClientRect();
const x = r.left + r.width * (0.3 + Math.random() * 0.4);
const y = r.top + r.height * (0.3 + Math.random() * 0.4);
const base = { bubbles: true, cancelable: true, view: win, clientX: x, clientY: y, button: 0 };
const ptr = Object.assign({ pointerId: 1, pointerType: 'mouse', isPrimary: true }, base);
el.dispatchEvent(new win.PointerEvent('pointerdown', ptr));
el.dispatchEvent(new win.MouseEvent('mousedown', Object.assign({ buttons: 1 }, base)));
el.dispatchEvent(new win.PointerEvent('pointerup', ptr));
el.dispatchEvent(new win.MouseEvent('mouseup', base));
el.dispatchEvent(new win.MouseEvent('click', base));
return true;
"#;

/// 参数：framePath, token, value；使用原型上的 setter，避免被框架劫持
pub const SET_VALUE: &str = r#"
const { el } = __amkRequire(framePath, token);
const win = el.ownerDocument.defaultView || window;
const proto = el.tagName.toLowerCase() === 'textarea'
    ? win.HTMLTextAreaElement.prototype
    : win.HTMLInputElement.prototype;
const desc = Object.getOwnPropertyDescriptor(proto, 'value');
el.focus();
if (desc && desc.set) { desc.set.call(el, value); } else { el.value = value; }
el.dispatchEvent(new win.Event('input', { bubbles: true }));
el.dispatchEvent(new win.Event('change', { bubbles: true }));
return true;
"#;

/// 参数：framePath, token
pub const READ_VALUE: &str = r#"
const { el } = __amkRequire(framePath, token);
return ('value' in el && el.value !== undefined && el.value !== null) ? String(el.value) : null;
"#;

pub const FOCUSED: &str = r#"
let d = document;
const path = [];
let el = d.activeElement;
while (el && (el.tagName === 'IFRAME' || el.tagName === 'FRAME')) {
    const frames = Array.from(d.querySelectorAll('iframe, frame'));
    const idx = frames.indexOf(el);
    let sub = null;
    try { sub = el.contentDocument; } catch (e) { sub = null; }
    if (!sub || idx < 0) return null;
    path.push(idx);
    d = sub;
    el = d.activeElement;
}
if (!el || el === d.body || el === d.documentElement) return null;
return { frame_path: path, token: __amkTag(el) };
"#;

/// 参数：framePath
pub const TEXT: &str = r#"
const c = __amkDoc(framePath);
if (!c || !c.doc.body) return '';
return c.doc.body.innerText || '';
"#;

/// 组装同步脚本
pub fn sync_script(args: &[(&str, JsonValue)], body: &str) -> String {
    format!("(() => {{\n{}{}{}\n}})()", PRELUDE, declare(args), body)
}

/// 组装异步脚本（返回 Promise，由 CDP 等待）
pub fn async_script(args: &[(&str, JsonValue)], body: &str) -> String {
    format!("(async () => {{\n{}{}{}\n}})()", PRELUDE, declare(args), body)
}

fn declare(args: &[(&str, JsonValue)]) -> String {
    args.iter()
        .map(|(name, value)| format!("const {} = {};\n", name, value))
        .collect()
}
