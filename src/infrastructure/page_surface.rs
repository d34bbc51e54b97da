//! 页面表面抽象 - 基础设施层
//!
//! 所有自动化算法（定位、提取、写分、循环）只通过 [`PageSurface`] 与宿主页面交互。
//! 生产环境由 [`crate::infrastructure::ChromeSurface`] 通过 CDP 执行脚本实现，
//! 测试中由内存假页面实现。

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// 文档上下文：主文档或可访问的嵌套 frame
///
/// `frame_path` 为从主文档逐层进入 `iframe/frame` 的下标序列，主文档为空序列。
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocContext {
    pub frame_path: Vec<usize>,
}

impl DocContext {
    pub fn main() -> Self {
        Self::default()
    }

    pub fn frame(path: Vec<usize>) -> Self {
        Self { frame_path: path }
    }
}

/// 页面元素引用
///
/// `token` 是打在元素上的 `data-*` 标记值，只在所属文档上下文内唯一。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementRef {
    pub context: DocContext,
    pub token: String,
}

impl ElementRef {
    pub fn new(context: DocContext, token: impl Into<String>) -> Self {
        Self {
            context,
            token: token.into(),
        }
    }
}

/// 元素类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    /// `<img>`
    Image,
    /// `<canvas>`
    Canvas,
    /// SVG 内嵌 `<image>`
    SvgImage,
    /// 带背景图的普通容器
    Container,
    Input,
    Button,
    Other,
}

impl ElementKind {
    /// 是否为可直接承载图像的元素
    pub fn is_media(self) -> bool {
        matches!(self, Self::Image | Self::Canvas | Self::SvgImage)
    }
}

/// 元素描述（一次性读取的静态属性快照）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementInfo {
    pub kind: ElementKind,
    pub tag: String,
    /// 图片地址：img 的 currentSrc、SVG image 的 href、或计算样式中的背景图地址
    #[serde(default)]
    pub source: Option<String>,
    /// 去首尾空白后的文本内容
    #[serde(default)]
    pub text: String,
    /// aria-label / title / placeholder 合并
    #[serde(default)]
    pub label: String,
    /// 父元素的文本（用于识别“自动提交”等开关旁的文字）
    #[serde(default)]
    pub context_text: String,
    #[serde(default)]
    pub class_name: String,
    #[serde(default)]
    pub visible: bool,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub input_type: Option<String>,
    /// checked / aria-checked / aria-pressed 综合得出的开关状态
    #[serde(default)]
    pub toggled: Option<bool>,
    #[serde(default)]
    pub declared_width: Option<f64>,
    #[serde(default)]
    pub declared_height: Option<f64>,
}

impl ElementInfo {
    pub fn new(kind: ElementKind, tag: impl Into<String>) -> Self {
        Self {
            kind,
            tag: tag.into(),
            source: None,
            text: String::new(),
            label: String::new(),
            context_text: String::new(),
            class_name: String::new(),
            visible: true,
            disabled: false,
            input_type: None,
            toggled: None,
            declared_width: None,
            declared_height: None,
        }
    }

    fn class_tokens(&self) -> impl Iterator<Item = String> + '_ {
        self.class_name.split_whitespace().map(str::to_lowercase)
    }

    /// 是否带有表示某种状态的样式类
    ///
    /// 整个类名等于状态词，或以 `-状态词`/`_状态词` 结尾（`is-checked`、
    /// `ant-switch-checked`、`btn--active`）才算。`inactive`、`is-unchecked`、
    /// `not-selected` 不算。
    pub fn has_state_class(&self, states: &[&str]) -> bool {
        self.class_tokens().any(|token| {
            if token.starts_with("not-") || token.starts_with("no-") {
                return false;
            }
            states.iter().any(|state| {
                token == *state
                    || token
                        .strip_suffix(*state)
                        .is_some_and(|head| head.ends_with('-') || head.ends_with('_'))
            })
        })
    }

    /// 是否带有某类组件的样式类（按 `-`/`_` 切分后整段匹配，如 `el-switch__core`）
    pub fn has_component_class(&self, names: &[&str]) -> bool {
        self.class_tokens().any(|token| {
            token
                .split(['-', '_'])
                .any(|segment| names.contains(&segment))
        })
    }
}

/// 元素几何信息（顶层视口坐标，frame 偏移已折算）
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
}

impl Geometry {
    pub fn new(top: f64, left: f64, width: f64, height: f64) -> Self {
        Self {
            top,
            left,
            width,
            height,
        }
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    pub fn is_measurable(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

/// 重新拉取图片的方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    /// 携带 cookie 的 fetch
    Credentialed,
    /// 新建 crossOrigin=anonymous 的 Image 并绘制到离屏画布
    AnonymousImage,
}

/// 键盘按键
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Key {
    Enter,
}

/// 派发到元素上的事件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageEvent {
    /// pointerdown → mousedown → pointerup → mouseup → click 完整序列
    Press,
    /// 单独的 click()
    Click,
    Focus,
    /// keydown → keypress → keyup
    Key(Key),
}

/// 页面地址信息
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLocation {
    pub href: String,
    pub host: String,
    #[serde(default)]
    pub title: String,
}

/// 页面表面
///
/// 传输层失败（CDP 断开、脚本异常）以 `Err` 返回；
/// “读不到像素”“拉取失败”这类预期中的失败以 `Ok(None)` 返回。
#[async_trait]
pub trait PageSurface: Send + Sync {
    async fn location(&self) -> Result<PageLocation>;

    /// 标签页是否在前台（document.visibilityState === "visible"）
    async fn is_foreground(&self) -> Result<bool>;

    /// 主文档及所有同源可访问的嵌套 frame
    async fn contexts(&self) -> Result<Vec<DocContext>>;

    async fn find_elements(&self, selector: &str, context: &DocContext) -> Result<Vec<ElementRef>>;

    async fn describe(&self, element: &ElementRef) -> Result<ElementInfo>;

    /// 渲染尺寸，SVG image 等未布局元素可能返回 0
    async fn measure(&self, element: &ElementRef) -> Result<Geometry>;

    /// 最近的非零尺寸祖先容器
    async fn container_geometry(&self, element: &ElementRef) -> Result<Option<Geometry>>;

    /// 直接读取画布像素，或将已解码的 img 绘制到离屏画布后读取
    async fn read_pixels(&self, element: &ElementRef) -> Result<Option<Vec<u8>>>;

    async fn fetch_bytes(&self, address: &str, mode: FetchMode) -> Result<Option<Vec<u8>>>;

    async fn dispatch(&self, element: &ElementRef, event: PageEvent) -> Result<()>;

    /// 绕过框架拦截的 value setter 写值，并派发 input/change
    async fn set_value(&self, element: &ElementRef, value: &str) -> Result<()>;

    async fn read_value(&self, element: &ElementRef) -> Result<Option<String>>;

    async fn focused_element(&self) -> Result<Option<ElementRef>>;

    /// 文档可见文本（innerText）
    async fn text_content(&self, context: &DocContext) -> Result<String>;
}

/// 在所有可访问上下文中查找
pub async fn find_everywhere(
    surface: &dyn PageSurface,
    selector: &str,
) -> Result<Vec<ElementRef>> {
    let mut found = Vec::new();
    for context in surface.contexts().await? {
        found.extend(surface.find_elements(selector, &context).await?);
    }
    Ok(found)
}
