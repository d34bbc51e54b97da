//! 写分服务 - 业务能力层
//!
//! 把分数写回阅卷页面。两种方式按顺序尝试：
//! 1. 数字键盘：页面上有一排整数按钮时，直接按对应分值
//! 2. 输入框：找到分数输入框写值，再回车或点击提交
//!
//! 写分前先确保页面的“自动提交”开关处于开启状态（每个会话只检查到一次开启即可）。

use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::Thresholds;
use crate::error::WriteError;
use crate::infrastructure::{
    find_everywhere, ElementInfo, ElementKind, ElementRef, Key, PageEvent, PageSurface,
};
use crate::models::platform::PlatformProfile;

/// 找不到平台键盘选择器时的兜底扫描
const KEYPAD_FALLBACK_SELECTOR: &str = "button, [role='button'], li, a";
/// 按文字匹配提交按钮时扫描的元素
const SUBMIT_FALLBACK_SELECTOR: &str =
    "button, [role='button'], a, input[type='submit'], input[type='button']";
const SCORE_INPUT_FALLBACK_SELECTOR: &str = "input";

const SUBMIT_WORDS: &[&str] = &[
    "提交", "确定", "确认", "保存", "下一份", "submit", "confirm", "save", "next",
];
const AUTO_SUBMIT_WORDS: &[&str] = &["自动提交", "自动下一份", "auto submit", "auto-submit", "autosubmit"];
const SELECTED_STATES: &[&str] = &["selected", "active", "checked", "current"];
const TOGGLED_STATES: &[&str] = &["checked", "active", "on", "open"];
const SWITCH_COMPONENTS: &[&str] = &["switch", "checkbox", "toggle"];

/// 键盘按钮允许的最大分值
const MAX_KEYPAD_VALUE: i64 = 150;
/// 小输入框的最大宽度
const SMALL_INPUT_MAX_WIDTH: f64 = 200.0;
/// 提交按钮文字的最大长度（过滤整段说明文字）
const MAX_SUBMIT_LABEL_CHARS: usize = 12;

/// 提交方式
///
/// 每轮随机选一种，避免每次都是完全相同的操作序列
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubmissionMode {
    /// 只按回车
    Keystroke,
    /// 只点提交按钮
    Click,
    /// 回车后再点提交按钮
    Both,
    /// 等待一段时间后点提交按钮
    DelayedClick,
}

impl SubmissionMode {
    pub fn all() -> [SubmissionMode; 4] {
        [
            SubmissionMode::Keystroke,
            SubmissionMode::Click,
            SubmissionMode::Both,
            SubmissionMode::DelayedClick,
        ]
    }

    /// 抽取权重
    pub fn weight(self) -> u32 {
        match self {
            SubmissionMode::Keystroke => 30,
            SubmissionMode::Click => 30,
            SubmissionMode::Both => 25,
            SubmissionMode::DelayedClick => 15,
        }
    }
}

/// 写分选项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitOptions {
    pub mode: SubmissionMode,
    /// 为 false 时只填分不提交（人工确认场景）
    pub submit: bool,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            mode: SubmissionMode::Both,
            submit: true,
        }
    }
}

/// 实际生效的写分方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteStrategy {
    Keypad,
    TextInput,
}

struct KeypadButton {
    element: ElementRef,
    value: i64,
}

/// 按键前的页面状态
struct KeypadSnapshot {
    href: String,
    input_had_value: bool,
    button_selected: bool,
}

fn page_err(e: anyhow::Error) -> WriteError {
    WriteError::Page(e.to_string())
}

/// 写分器
pub struct ScoreWriter {
    surface: Arc<dyn PageSurface>,
    thresholds: Thresholds,
    auto_submit_confirmed: AtomicBool,
}

impl ScoreWriter {
    pub fn new(surface: Arc<dyn PageSurface>, thresholds: Thresholds) -> Self {
        Self {
            surface,
            thresholds,
            auto_submit_confirmed: AtomicBool::new(false),
        }
    }

    /// 写入分数并提交
    pub async fn write(
        &self,
        score: f64,
        profile: &PlatformProfile,
        options: SubmitOptions,
    ) -> Result<WriteStrategy, WriteError> {
        if let Err(e) = self.ensure_auto_submit(profile).await {
            warn!("检查自动提交开关失败: {}", e);
        }

        match self.write_with_keypad(score, profile, options).await {
            Ok(()) => {
                info!("✅ 已通过数字键盘写入 {} 分", format_score(score));
                return Ok(WriteStrategy::Keypad);
            }
            Err(WriteError::NoScoreTarget) => debug!("页面没有数字键盘，改用输入框"),
            Err(e) => warn!("数字键盘写分失败，改用输入框: {}", e),
        }

        self.write_with_input(score, profile, options).await?;
        info!("✅ 已通过输入框写入 {} 分", format_score(score));
        Ok(WriteStrategy::TextInput)
    }

    /// 只填分，不提交
    pub async fn fill_score(
        &self,
        score: f64,
        profile: &PlatformProfile,
        submit: bool,
    ) -> Result<WriteStrategy, WriteError> {
        self.write(
            score,
            profile,
            SubmitOptions {
                mode: SubmissionMode::Both,
                submit,
            },
        )
        .await
    }

    /// 人工填分后单独触发提交
    pub async fn confirm_submit(&self, profile: &PlatformProfile) -> Result<(), WriteError> {
        if let Some(control) = self.find_submit_control(profile).await? {
            self.surface
                .dispatch(&control, PageEvent::Press)
                .await
                .map_err(page_err)?;
            info!("📤 已点击提交按钮");
            return Ok(());
        }

        let focused = self.surface.focused_element().await.map_err(page_err)?;
        let target = match focused {
            Some(element) => Some(element),
            None => self.find_score_input(profile).await?,
        };
        match target {
            Some(element) => {
                self.surface
                    .dispatch(&element, PageEvent::Key(Key::Enter))
                    .await
                    .map_err(page_err)?;
                info!("📤 未找到提交按钮，已按回车提交");
                Ok(())
            }
            None => Err(WriteError::NoSubmitControl),
        }
    }

    /// 确保“自动提交”开关已开启
    ///
    /// 返回是否确认开关处于开启状态。找到开关并点击过一次后本会话不再操作，
    /// 避免无状态的图标开关被反复切换。
    pub async fn ensure_auto_submit(&self, profile: &PlatformProfile) -> anyhow::Result<bool> {
        if self.auto_submit_confirmed.load(Ordering::Relaxed) {
            return Ok(true);
        }

        for selector in &profile.auto_submit_selectors {
            for element in find_everywhere(self.surface.as_ref(), selector).await? {
                let info = self.surface.describe(&element).await?;
                if !info.visible || !is_auto_submit_control(&info) {
                    continue;
                }

                if toggle_state(&info) == Some(true) {
                    debug!("自动提交开关已开启");
                    self.auto_submit_confirmed.store(true, Ordering::Relaxed);
                    return Ok(true);
                }

                self.surface.dispatch(&element, PageEvent::Click).await?;
                self.auto_submit_confirmed.store(true, Ordering::Relaxed);

                let after = self.surface.describe(&element).await?;
                match toggle_state(&after) {
                    Some(true) => info!("🔛 已开启自动提交"),
                    Some(false) => warn!("⚠️ 点击后自动提交开关仍为关闭状态"),
                    None => info!("🔛 已点击自动提交图标（无法读取状态）"),
                }
                return Ok(toggle_state(&after) != Some(false));
            }
        }

        debug!("页面上没有自动提交开关");
        Ok(false)
    }

    // ========== 数字键盘 ==========

    async fn write_with_keypad(
        &self,
        score: f64,
        profile: &PlatformProfile,
        options: SubmitOptions,
    ) -> Result<(), WriteError> {
        let buttons = self.keypad_buttons(profile).await?;
        if buttons.len() < self.thresholds.keypad_min_buttons {
            return Err(WriteError::NoScoreTarget);
        }

        let target = score.round() as i64;
        let button = buttons
            .iter()
            .find(|b| b.value == target)
            .ok_or(WriteError::NoKeypadButton(target))?;

        let expected = target.to_string();
        let score_input = self.find_score_input(profile).await?;
        let input_had_value = match &score_input {
            Some(input) => self.input_holds(input, &expected).await,
            None => false,
        };
        let before = KeypadSnapshot {
            href: self.current_href().await,
            input_had_value,
            button_selected: self.button_selected(&button.element).await,
        };

        self.surface
            .dispatch(&button.element, PageEvent::Press)
            .await
            .map_err(page_err)?;
        debug!("已按下键盘按钮 {}", target);

        for _ in 0..self.thresholds.keypad_poll_attempts {
            sleep(self.thresholds.keypad_poll_interval).await;
            if self
                .keypad_accepted(&button.element, score_input.as_ref(), &expected, &before)
                .await
            {
                return Ok(());
            }
        }

        if !options.submit {
            debug!("未观察到键盘确认，按要求不提交");
            return Ok(());
        }

        warn!("⏳ 键盘打分未确认，尝试点击提交按钮");
        match self.find_submit_control(profile).await? {
            Some(control) => {
                self.surface
                    .dispatch(&control, PageEvent::Press)
                    .await
                    .map_err(page_err)?;
                Ok(())
            }
            None => Err(WriteError::NoSubmitControl),
        }
    }

    async fn keypad_buttons(&self, profile: &PlatformProfile) -> Result<Vec<KeypadButton>, WriteError> {
        let mut buttons = self.collect_keypad(&profile.keypad_selectors).await?;
        if buttons.len() < self.thresholds.keypad_min_buttons {
            buttons = self
                .collect_keypad(&[KEYPAD_FALLBACK_SELECTOR.to_string()])
                .await?;
        }
        Ok(buttons)
    }

    async fn collect_keypad(&self, selectors: &[String]) -> Result<Vec<KeypadButton>, WriteError> {
        let mut seen = HashSet::new();
        let mut buttons = Vec::new();
        for selector in selectors {
            let elements = find_everywhere(self.surface.as_ref(), selector)
                .await
                .map_err(page_err)?;
            for element in elements {
                if !seen.insert(element.clone()) {
                    continue;
                }
                let info = self.surface.describe(&element).await.map_err(page_err)?;
                if !info.visible || info.disabled {
                    continue;
                }
                if let Some(value) = parse_keypad_value(&info.text) {
                    buttons.push(KeypadButton { element, value });
                }
            }
        }
        Ok(buttons)
    }

    /// 三种独立确认：输入框读回、按钮选中样式、页面跳转
    ///
    /// 按下前就已成立的信号不算数。
    async fn keypad_accepted(
        &self,
        button: &ElementRef,
        score_input: Option<&ElementRef>,
        expected: &str,
        before: &KeypadSnapshot,
    ) -> bool {
        if let Some(input) = score_input {
            if !before.input_had_value && self.input_holds(input, expected).await {
                return true;
            }
        }

        if !before.button_selected && self.button_selected(button).await {
            return true;
        }

        self.current_href().await != before.href
    }

    async fn button_selected(&self, button: &ElementRef) -> bool {
        match self.surface.describe(button).await {
            Ok(info) => info.has_state_class(SELECTED_STATES) || info.toggled == Some(true),
            Err(_) => false,
        }
    }

    async fn input_holds(&self, input: &ElementRef, expected: &str) -> bool {
        matches!(
            self.surface.read_value(input).await,
            Ok(Some(value)) if values_match(expected, &value)
        )
    }

    // ========== 输入框 ==========

    async fn write_with_input(
        &self,
        score: f64,
        profile: &PlatformProfile,
        options: SubmitOptions,
    ) -> Result<(), WriteError> {
        let input = self
            .find_score_input(profile)
            .await?
            .ok_or(WriteError::NoScoreTarget)?;
        let value = format_score(score);

        self.surface
            .dispatch(&input, PageEvent::Focus)
            .await
            .map_err(page_err)?;
        self.surface
            .set_value(&input, &value)
            .await
            .map_err(page_err)?;

        let actual = self.surface.read_value(&input).await.map_err(page_err)?;
        if !actual.as_deref().map(|a| values_match(&value, a)).unwrap_or(false) {
            return Err(WriteError::ValueMismatch {
                expected: value,
                actual,
            });
        }

        if !options.submit {
            return Ok(());
        }

        self.submit_after_input(&input, &value, profile, options.mode)
            .await
    }

    async fn submit_after_input(
        &self,
        input: &ElementRef,
        value: &str,
        profile: &PlatformProfile,
        mode: SubmissionMode,
    ) -> Result<(), WriteError> {
        let before_href = self.current_href().await;

        match mode {
            SubmissionMode::Keystroke | SubmissionMode::Both => {
                self.press_enter(input).await?;
                sleep(self.thresholds.navigation_wait).await;
                if mode == SubmissionMode::Keystroke
                    && self.page_advanced(input, value, &before_href).await
                {
                    return Ok(());
                }
                if self.click_submit(profile).await?
                    || self.page_advanced(input, value, &before_href).await
                {
                    Ok(())
                } else {
                    Err(WriteError::NoSubmitControl)
                }
            }
            SubmissionMode::Click | SubmissionMode::DelayedClick => {
                if mode == SubmissionMode::DelayedClick {
                    sleep(self.thresholds.navigation_wait).await;
                }
                if self.click_submit(profile).await? {
                    return Ok(());
                }
                debug!("未找到提交按钮，改为回车");
                self.press_enter(input).await?;
                sleep(self.thresholds.navigation_wait).await;
                if self.page_advanced(input, value, &before_href).await {
                    Ok(())
                } else {
                    Err(WriteError::NoSubmitControl)
                }
            }
        }
    }

    async fn press_enter(&self, input: &ElementRef) -> Result<(), WriteError> {
        self.surface
            .dispatch(input, PageEvent::Key(Key::Enter))
            .await
            .map_err(page_err)
    }

    async fn click_submit(&self, profile: &PlatformProfile) -> Result<bool, WriteError> {
        match self.find_submit_control(profile).await? {
            Some(control) => {
                self.surface
                    .dispatch(&control, PageEvent::Press)
                    .await
                    .map_err(page_err)?;
                debug!("已点击提交按钮");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// 页面已切换：地址变化，或输入框被清空/换成别的值
    async fn page_advanced(&self, input: &ElementRef, value: &str, before_href: &str) -> bool {
        if self.current_href().await != before_href {
            return true;
        }
        match self.surface.read_value(input).await {
            Ok(Some(current)) => !values_match(value, &current),
            Ok(None) => true,
            Err(_) => false,
        }
    }

    async fn current_href(&self) -> String {
        self.surface
            .location()
            .await
            .map(|l| l.href)
            .unwrap_or_default()
    }

    /// 查找分数输入框：平台选择器 → 当前焦点 → 可见的小输入框
    pub async fn find_score_input(
        &self,
        profile: &PlatformProfile,
    ) -> Result<Option<ElementRef>, WriteError> {
        for selector in &profile.score_input_selectors {
            let elements = find_everywhere(self.surface.as_ref(), selector)
                .await
                .map_err(page_err)?;
            for element in elements {
                let info = self.surface.describe(&element).await.map_err(page_err)?;
                if is_usable_input(&info) {
                    return Ok(Some(element));
                }
            }
        }

        if let Some(focused) = self.surface.focused_element().await.map_err(page_err)? {
            let info = self.surface.describe(&focused).await.map_err(page_err)?;
            if is_usable_input(&info) {
                return Ok(Some(focused));
            }
        }

        let elements = find_everywhere(self.surface.as_ref(), SCORE_INPUT_FALLBACK_SELECTOR)
            .await
            .map_err(page_err)?;
        for element in elements {
            let info = self.surface.describe(&element).await.map_err(page_err)?;
            if !is_usable_input(&info) {
                continue;
            }
            let geometry = self.surface.measure(&element).await.map_err(page_err)?;
            if geometry.is_measurable() && geometry.width <= SMALL_INPUT_MAX_WIDTH {
                return Ok(Some(element));
            }
        }

        Ok(None)
    }

    /// 查找提交按钮：平台选择器优先，其次按文字匹配
    pub async fn find_submit_control(
        &self,
        profile: &PlatformProfile,
    ) -> Result<Option<ElementRef>, WriteError> {
        for selector in &profile.submit_selectors {
            let elements = find_everywhere(self.surface.as_ref(), selector)
                .await
                .map_err(page_err)?;
            for element in elements {
                let info = self.surface.describe(&element).await.map_err(page_err)?;
                if info.visible && !info.disabled {
                    return Ok(Some(element));
                }
            }
        }

        let elements = find_everywhere(self.surface.as_ref(), SUBMIT_FALLBACK_SELECTOR)
            .await
            .map_err(page_err)?;
        for element in elements {
            let info = self.surface.describe(&element).await.map_err(page_err)?;
            if info.visible && !info.disabled && has_submit_label(&info) {
                return Ok(Some(element));
            }
        }

        Ok(None)
    }
}

/// 分数格式化：整数不带小数点，否则保留一位小数
pub fn format_score(score: f64) -> String {
    let rounded = (score * 10.0).round() / 10.0;
    if rounded.fract().abs() < f64::EPSILON {
        format!("{}", rounded as i64)
    } else {
        format!("{:.1}", rounded)
    }
}

/// 按钮文字是否恰好是一个小整数
pub fn parse_keypad_value(text: &str) -> Option<i64> {
    let text = text.trim();
    if text.is_empty() || text.len() > 3 || !text.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    text.parse::<i64>().ok().filter(|v| *v <= MAX_KEYPAD_VALUE)
}

fn values_match(expected: &str, actual: &str) -> bool {
    let actual = actual.trim();
    if expected == actual {
        return true;
    }
    match (expected.parse::<f64>(), actual.parse::<f64>()) {
        (Ok(a), Ok(b)) => (a - b).abs() < 1e-6,
        _ => false,
    }
}

fn is_usable_input(info: &ElementInfo) -> bool {
    info.kind == ElementKind::Input
        && info.visible
        && !info.disabled
        && matches!(
            info.input_type.as_deref(),
            None | Some("number") | Some("text") | Some("tel") | Some("")
        )
}

fn has_submit_label(info: &ElementInfo) -> bool {
    let label = if info.text.trim().is_empty() {
        info.label.trim()
    } else {
        info.text.trim()
    };
    if label.is_empty() || label.chars().count() > MAX_SUBMIT_LABEL_CHARS {
        return false;
    }
    let label = label.to_lowercase();
    SUBMIT_WORDS.iter().any(|word| label.contains(word))
}

fn is_auto_submit_control(info: &ElementInfo) -> bool {
    let text = format!("{} {} {}", info.label, info.text, info.context_text).to_lowercase();
    AUTO_SUBMIT_WORDS.iter().any(|word| text.contains(word))
}

/// 开关状态：优先读 checked/aria 属性，其次看样式类
fn toggle_state(info: &ElementInfo) -> Option<bool> {
    if let Some(state) = info.toggled {
        return Some(state);
    }
    if info.has_state_class(TOGGLED_STATES) {
        return Some(true);
    }
    if info.has_component_class(SWITCH_COMPONENTS) {
        Some(false)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_score() {
        assert_eq!(format_score(7.0), "7");
        assert_eq!(format_score(3.5), "3.5");
        assert_eq!(format_score(6.98), "7");
        assert_eq!(format_score(0.0), "0");
    }

    #[test]
    fn test_parse_keypad_value() {
        assert_eq!(parse_keypad_value(" 7 "), Some(7));
        assert_eq!(parse_keypad_value("12"), Some(12));
        assert_eq!(parse_keypad_value("7分"), None);
        assert_eq!(parse_keypad_value("提交"), None);
        assert_eq!(parse_keypad_value("999"), None);
        assert_eq!(parse_keypad_value(""), None);
    }

    #[test]
    fn test_values_match_numerically() {
        assert!(values_match("7", "7.0"));
        assert!(values_match("3.5", " 3.5"));
        assert!(!values_match("7", "6"));
        assert!(!values_match("7", ""));
    }

    #[test]
    fn test_submit_label_matching() {
        let mut info = ElementInfo::new(ElementKind::Button, "button");
        info.text = "提交分数".to_string();
        assert!(has_submit_label(&info));

        info.text = "Next".to_string();
        assert!(has_submit_label(&info));

        info.text = "点击这里查看评分细则并在完成后提交".to_string();
        assert!(!has_submit_label(&info));

        info.text = "返回".to_string();
        assert!(!has_submit_label(&info));
    }

    #[test]
    fn test_toggle_state_heuristics() {
        let mut info = ElementInfo::new(ElementKind::Other, "div");
        info.class_name = "el-switch".to_string();
        assert_eq!(toggle_state(&info), Some(false));

        info.class_name = "el-switch is-checked".to_string();
        assert_eq!(toggle_state(&info), Some(true));

        info.class_name = "ant-switch ant-switch-checked".to_string();
        assert_eq!(toggle_state(&info), Some(true));

        info.class_name = "el-switch is-unchecked".to_string();
        assert_eq!(toggle_state(&info), Some(false));

        info.class_name = "toggle inactive".to_string();
        assert_eq!(toggle_state(&info), Some(false));

        info.class_name = "icon".to_string();
        assert_eq!(toggle_state(&info), None);

        info.class_name = "iconfont icon-switch".to_string();
        assert_eq!(toggle_state(&info), Some(false));

        info.toggled = Some(false);
        assert_eq!(toggle_state(&info), Some(false));
    }

    #[test]
    fn test_selected_state_matches_whole_class_names() {
        let mut info = ElementInfo::new(ElementKind::Button, "li");
        for class_name in ["score-btn selected", "btn btn--active", "is-current", "Active"] {
            info.class_name = class_name.to_string();
            assert!(info.has_state_class(SELECTED_STATES), "{}", class_name);
        }
        for class_name in ["score-btn inactive", "unselected", "is-unchecked", "not-selected", "btn-deactivated"] {
            info.class_name = class_name.to_string();
            assert!(!info.has_state_class(SELECTED_STATES), "{}", class_name);
        }
    }

    #[test]
    fn test_submission_mode_weights_sum_to_hundred() {
        let total: u32 = SubmissionMode::all().iter().map(|m| m.weight()).sum();
        assert_eq!(total, 100);
    }
}
