#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use auto_mark_submit::clients::ScoringClient;
use auto_mark_submit::config::{Config, PacingSettings, Thresholds};
use auto_mark_submit::error::ScoringError;
use auto_mark_submit::infrastructure::{
    DocContext, ElementInfo, ElementKind, ElementRef, FetchMode, Geometry, PageEvent,
    PageLocation, PageSurface,
};
use auto_mark_submit::models::{Artifact, ScoringContext, ScoringResult};

/// 页面元素被操作后的副作用
#[derive(Debug, Clone)]
pub enum Effect {
    SetValue { token: String, value: String },
    AddClass(String),
    SetToggled(bool),
    Navigate(String),
    SetPixels { token: String, bytes: Vec<u8> },
}

#[derive(Debug, Clone)]
pub struct FakeElement {
    pub element: ElementRef,
    pub info: ElementInfo,
    pub geometry: Geometry,
    pub container: Option<Geometry>,
    pub pixels: Option<Vec<u8>>,
    pub selectors: Vec<String>,
    pub value: Option<String>,
    /// 按下或点击时触发
    pub on_press: Vec<Effect>,
    /// 回车时触发
    pub on_enter: Vec<Effect>,
    /// 加入页面时的样式类，换卷时恢复
    pub initial_class: String,
}

impl FakeElement {
    pub fn new(token: &str, kind: ElementKind, tag: &str) -> Self {
        Self {
            element: ElementRef::new(DocContext::main(), token),
            info: ElementInfo::new(kind, tag),
            geometry: Geometry::new(0.0, 0.0, 100.0, 30.0),
            container: None,
            pixels: None,
            selectors: Vec::new(),
            value: None,
            on_press: Vec::new(),
            on_enter: Vec::new(),
            initial_class: String::new(),
        }
    }

    pub fn canvas(token: &str, bytes: Vec<u8>) -> Self {
        let mut el = Self::new(token, ElementKind::Canvas, "canvas");
        el.geometry = Geometry::new(100.0, 0.0, 800.0, 600.0);
        el.pixels = Some(bytes);
        el
    }

    pub fn image(token: &str, source: &str) -> Self {
        let mut el = Self::new(token, ElementKind::Image, "img");
        el.info.source = Some(source.to_string());
        el.geometry = Geometry::new(100.0, 0.0, 800.0, 600.0);
        el
    }

    pub fn button(token: &str, text: &str) -> Self {
        let mut el = Self::new(token, ElementKind::Button, "button");
        el.info.text = text.to_string();
        el
    }

    pub fn input(token: &str) -> Self {
        let mut el = Self::new(token, ElementKind::Input, "input");
        el.info.input_type = Some("text".to_string());
        el.geometry = Geometry::new(40.0, 900.0, 80.0, 30.0);
        el.value = Some(String::new());
        el
    }

    pub fn in_frame(mut self, path: Vec<usize>) -> Self {
        self.element.context = DocContext::frame(path);
        self
    }

    pub fn matching(mut self, selector: &str) -> Self {
        self.selectors.push(selector.to_string());
        self
    }

    pub fn at(mut self, geometry: Geometry) -> Self {
        self.geometry = geometry;
        self
    }

    pub fn on_press(mut self, effect: Effect) -> Self {
        self.on_press.push(effect);
        self
    }

    pub fn on_enter(mut self, effect: Effect) -> Self {
        self.on_enter.push(effect);
        self
    }

    fn matches(&self, selector: &str) -> bool {
        self.selectors.iter().any(|s| s == selector)
            || selector.split(',').any(|part| part.trim() == self.info.tag)
    }
}

#[derive(Default)]
struct PageData {
    location: PageLocation,
    hidden_after: Option<usize>,
    foreground_checks: usize,
    elements: Vec<FakeElement>,
    fetchable: HashMap<(String, FetchMode), Vec<u8>>,
    fetch_log: Vec<(String, FetchMode)>,
    events: Vec<(String, PageEvent)>,
    text: String,
    focused: Option<ElementRef>,
    set_value_fails: bool,
}

/// 内存中的假页面
pub struct FakePage {
    data: Mutex<PageData>,
}

impl FakePage {
    pub fn new(href: &str) -> Self {
        let host = url::Url::parse(href)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default();
        Self {
            data: Mutex::new(PageData {
                location: PageLocation {
                    href: href.to_string(),
                    host,
                    title: String::new(),
                },
                ..PageData::default()
            }),
        }
    }

    pub fn add(&self, mut element: FakeElement) {
        element.initial_class = element.info.class_name.clone();
        self.data.lock().elements.push(element);
    }

    /// 换到下一份答题卡：`sheet` 画布换成新图，按钮样式恢复初始状态
    pub fn next_sheet(&self, bytes: Vec<u8>) {
        let mut data = self.data.lock();
        for el in data.elements.iter_mut() {
            el.info.class_name = el.initial_class.clone();
            if el.element.token == "sheet" {
                el.pixels = Some(bytes.clone());
            }
        }
    }

    pub fn set_text(&self, text: &str) {
        self.data.lock().text = text.to_string();
    }

    pub fn set_hidden(&self) {
        self.data.lock().hidden_after = Some(0);
    }

    /// 前 `checks` 次可见性检查返回前台，之后变为后台
    pub fn hide_after(&self, checks: usize) {
        self.data.lock().hidden_after = Some(checks);
    }

    pub fn focus(&self, token: &str) {
        let mut data = self.data.lock();
        data.focused = data
            .elements
            .iter()
            .find(|e| e.element.token == token)
            .map(|e| e.element.clone());
    }

    pub fn refuse_set_value(&self) {
        self.data.lock().set_value_fails = true;
    }

    pub fn allow_fetch(&self, address: &str, mode: FetchMode, bytes: Vec<u8>) {
        self.data
            .lock()
            .fetchable
            .insert((address.to_string(), mode), bytes);
    }

    pub fn set_pixels(&self, token: &str, bytes: Vec<u8>) {
        let mut data = self.data.lock();
        if let Some(el) = data.elements.iter_mut().find(|e| e.element.token == token) {
            el.pixels = Some(bytes);
        }
    }

    pub fn fetch_log(&self) -> Vec<(String, FetchMode)> {
        self.data.lock().fetch_log.clone()
    }

    pub fn events(&self) -> Vec<(String, PageEvent)> {
        self.data.lock().events.clone()
    }

    pub fn events_on(&self, token: &str) -> Vec<PageEvent> {
        self.data
            .lock()
            .events
            .iter()
            .filter(|(t, _)| t == token)
            .map(|(_, e)| *e)
            .collect()
    }

    pub fn value_of(&self, token: &str) -> Option<String> {
        self.data
            .lock()
            .elements
            .iter()
            .find(|e| e.element.token == token)
            .and_then(|e| e.value.clone())
    }

    pub fn info_of(&self, token: &str) -> Option<ElementInfo> {
        self.data
            .lock()
            .elements
            .iter()
            .find(|e| e.element.token == token)
            .map(|e| e.info.clone())
    }

    pub fn href(&self) -> String {
        self.data.lock().location.href.clone()
    }

    fn with_element<T>(&self, element: &ElementRef, f: impl FnOnce(&FakeElement) -> T) -> Result<T> {
        let data = self.data.lock();
        data.elements
            .iter()
            .find(|e| &e.element == element)
            .map(f)
            .ok_or_else(|| anyhow!("元素不存在: {}", element.token))
    }

    fn apply(data: &mut PageData, source: &ElementRef, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::SetValue { token, value } => {
                    if let Some(el) = data.elements.iter_mut().find(|e| e.element.token == token) {
                        el.value = Some(value);
                    }
                }
                Effect::AddClass(class) => {
                    if let Some(el) = data.elements.iter_mut().find(|e| &e.element == source) {
                        el.info.class_name = format!("{} {}", el.info.class_name, class);
                    }
                }
                Effect::SetToggled(state) => {
                    if let Some(el) = data.elements.iter_mut().find(|e| &e.element == source) {
                        el.info.toggled = Some(state);
                    }
                }
                Effect::Navigate(href) => data.location.href = href,
                Effect::SetPixels { token, bytes } => {
                    if let Some(el) = data.elements.iter_mut().find(|e| e.element.token == token) {
                        el.pixels = Some(bytes);
                    }
                }
            }
        }
    }
}

/// 去掉防缓存参数，便于按原地址匹配
pub fn strip_cache_buster(address: &str) -> String {
    match address.find("_amk=") {
        Some(index) => {
            let base = &address[..index];
            base.trim_end_matches(['?', '&']).to_string()
        }
        None => address.to_string(),
    }
}

#[async_trait]
impl PageSurface for FakePage {
    async fn location(&self) -> Result<PageLocation> {
        Ok(self.data.lock().location.clone())
    }

    async fn is_foreground(&self) -> Result<bool> {
        let mut data = self.data.lock();
        data.foreground_checks += 1;
        Ok(match data.hidden_after {
            Some(limit) => data.foreground_checks <= limit,
            None => true,
        })
    }

    async fn contexts(&self) -> Result<Vec<DocContext>> {
        let data = self.data.lock();
        let mut contexts = vec![DocContext::main()];
        for el in &data.elements {
            if !contexts.contains(&el.element.context) {
                contexts.push(el.element.context.clone());
            }
        }
        Ok(contexts)
    }

    async fn find_elements(&self, selector: &str, context: &DocContext) -> Result<Vec<ElementRef>> {
        let data = self.data.lock();
        Ok(data
            .elements
            .iter()
            .filter(|e| &e.element.context == context && e.matches(selector))
            .map(|e| e.element.clone())
            .collect())
    }

    async fn describe(&self, element: &ElementRef) -> Result<ElementInfo> {
        self.with_element(element, |e| e.info.clone())
    }

    async fn measure(&self, element: &ElementRef) -> Result<Geometry> {
        self.with_element(element, |e| e.geometry)
    }

    async fn container_geometry(&self, element: &ElementRef) -> Result<Option<Geometry>> {
        self.with_element(element, |e| e.container)
    }

    async fn read_pixels(&self, element: &ElementRef) -> Result<Option<Vec<u8>>> {
        self.with_element(element, |e| e.pixels.clone())
    }

    async fn fetch_bytes(&self, address: &str, mode: FetchMode) -> Result<Option<Vec<u8>>> {
        let mut data = self.data.lock();
        data.fetch_log.push((address.to_string(), mode));
        Ok(data
            .fetchable
            .get(&(strip_cache_buster(address), mode))
            .cloned())
    }

    async fn dispatch(&self, element: &ElementRef, event: PageEvent) -> Result<()> {
        let mut data = self.data.lock();
        let Some(target) = data.elements.iter().find(|e| &e.element == element).cloned() else {
            return Err(anyhow!("元素不存在: {}", element.token));
        };
        data.events.push((element.token.clone(), event));
        match event {
            PageEvent::Press | PageEvent::Click => Self::apply(&mut data, element, target.on_press),
            PageEvent::Key(_) => Self::apply(&mut data, element, target.on_enter),
            PageEvent::Focus => data.focused = Some(element.clone()),
        }
        Ok(())
    }

    async fn set_value(&self, element: &ElementRef, value: &str) -> Result<()> {
        let mut data = self.data.lock();
        if data.set_value_fails {
            return Ok(());
        }
        match data.elements.iter_mut().find(|e| &e.element == element) {
            Some(el) => {
                el.value = Some(value.to_string());
                Ok(())
            }
            None => Err(anyhow!("元素不存在: {}", element.token)),
        }
    }

    async fn read_value(&self, element: &ElementRef) -> Result<Option<String>> {
        self.with_element(element, |e| e.value.clone())
    }

    async fn focused_element(&self) -> Result<Option<ElementRef>> {
        Ok(self.data.lock().focused.clone())
    }

    async fn text_content(&self, context: &DocContext) -> Result<String> {
        if context.frame_path.is_empty() {
            Ok(self.data.lock().text.clone())
        } else {
            Ok(String::new())
        }
    }
}

/// 按顺序返回预设结果的评分服务；预设用完后固定返回 7/10
pub struct ScriptedScoring {
    results: Mutex<VecDeque<Result<ScoringResult, ScoringError>>>,
    calls: AtomicUsize,
    contexts: Mutex<Vec<ScoringContext>>,
}

impl ScriptedScoring {
    pub fn new() -> Self {
        Self {
            results: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            contexts: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, result: Result<ScoringResult, ScoringError>) {
        self.results.lock().push_back(result);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn contexts(&self) -> Vec<ScoringContext> {
        self.contexts.lock().clone()
    }
}

pub fn score_result(score: f64, max_score: f64) -> ScoringResult {
    ScoringResult {
        score,
        max_score: Some(max_score),
        rationale: "测试".to_string(),
        breakdown: Vec::new(),
    }
}

#[async_trait]
impl ScoringClient for ScriptedScoring {
    async fn score(
        &self,
        _artifact: &Artifact,
        context: &ScoringContext,
        _strategy_id: &str,
    ) -> Result<ScoringResult, ScoringError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.contexts.lock().push(context.clone());
        self.results
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(score_result(7.0, 10.0)))
    }
}

/// 生成一张带噪点的 PNG，不同种子得到不同字节
pub fn noisy_png(seed: u32, width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        let mut h = x
            .wrapping_mul(0x9E37_79B1)
            ^ y.wrapping_mul(0x85EB_CA77)
            ^ seed.wrapping_mul(0xC2B2_AE3D);
        h ^= h >> 15;
        h = h.wrapping_mul(0x2C1B_3C6D);
        h ^= h >> 12;
        let [r, g, b, _] = h.to_le_bytes();
        Rgba([r, g, b, 255])
    });
    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("PNG 编码失败");
    bytes
}

/// 所有等待都缩短到毫秒级的配置
pub fn fast_config() -> Config {
    Config {
        thresholds: Thresholds {
            keypad_poll_attempts: 3,
            keypad_poll_interval: Duration::from_millis(1),
            navigation_wait: Duration::from_millis(1),
            ..Thresholds::default()
        },
        pacing: PacingSettings {
            base_delay: Duration::from_millis(2),
            refresh_delay: Duration::from_millis(4),
            extract_retry_delay: Duration::from_millis(1),
            pause_probability: 0.0,
            ..PacingSettings::default()
        },
        ..Config::default()
    }
}

/// 在页面上放一排 0..=max 的打分按钮，按下后按钮变为选中样式
pub fn add_keypad(page: &FakePage, max: i64) {
    for value in 0..=max {
        page.add(
            FakeElement::button(&format!("k{}", value), &value.to_string())
                .matching(".score-btn")
                .on_press(Effect::AddClass("selected".to_string())),
        );
    }
}
