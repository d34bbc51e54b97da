//! 阅卷平台配置
//!
//! 每个平台一份纯数据配置，定位器与写分器对所有平台使用同一套算法。

use serde::{Deserialize, Serialize};
use std::fmt;

/// 已知平台
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformId {
    /// 智学网
    Zhixue,
    /// 好分数 / 云校
    Haofenshu,
    /// 七天网络
    Qitian,
    /// 未识别平台
    Generic,
}

impl PlatformId {
    pub fn all() -> [PlatformId; 4] {
        [
            PlatformId::Zhixue,
            PlatformId::Haofenshu,
            PlatformId::Qitian,
            PlatformId::Generic,
        ]
    }

    /// 获取标准名称
    pub fn name(self) -> &'static str {
        match self {
            PlatformId::Zhixue => "智学网",
            PlatformId::Haofenshu => "好分数",
            PlatformId::Qitian => "七天网络",
            PlatformId::Generic => "通用",
        }
    }
}

impl fmt::Display for PlatformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 平台配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformProfile {
    pub id: PlatformId,
    pub label: String,
    /// 匹配 host 的片段
    #[serde(default)]
    pub host_patterns: Vec<String>,
    /// 页面特征选择器，任一命中即判定为该平台
    #[serde(default)]
    pub markup_signatures: Vec<String>,
    #[serde(default)]
    pub image_selectors: Vec<String>,
    #[serde(default)]
    pub score_input_selectors: Vec<String>,
    #[serde(default)]
    pub submit_selectors: Vec<String>,
    #[serde(default)]
    pub keypad_selectors: Vec<String>,
    #[serde(default)]
    pub auto_submit_selectors: Vec<String>,
    #[serde(default)]
    pub student_name_selectors: Vec<String>,
    /// 答题卡图片所在的可信图床地址片段
    #[serde(default)]
    pub trusted_image_hosts: Vec<String>,
    /// “已无待阅试卷”提示语
    #[serde(default)]
    pub empty_phrases: Vec<String>,
    #[serde(default)]
    pub empty_selectors: Vec<String>,
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
    /// 多图合并时，候选面积与首位面积的最小比例
    #[serde(default = "default_merge_area_ratio")]
    pub merge_area_ratio: f64,
    /// 超过该字节数时重新压缩
    #[serde(default = "default_compress_threshold")]
    pub compress_threshold_bytes: usize,
}

fn default_max_candidates() -> usize {
    2
}

fn default_merge_area_ratio() -> f64 {
    0.5
}

fn default_compress_threshold() -> usize {
    1_500_000
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

const COMMON_IMAGE_SELECTORS: &[&str] = &[
    ".answer-img img",
    ".answer-sheet img",
    ".paper-img img",
    "img[src*='answer']",
    "img[src*='sheet']",
    "canvas.answer-canvas",
    "svg image",
];

const COMMON_SCORE_INPUTS: &[&str] = &[
    "input[placeholder*='分']",
    "input[placeholder*='score' i]",
    "input.score-input",
    ".score-input input",
    "input[name*='score' i]",
];

const COMMON_SUBMIT: &[&str] = &[
    "button[type='submit']",
    ".submit-btn",
    ".btn-submit",
    "button.el-button--primary",
    ".ant-btn-primary",
];

const COMMON_KEYPAD: &[&str] = &[
    ".score-btn",
    ".score-list li",
    ".score-panel button",
    ".keyboard button",
    ".num-key",
];

const COMMON_AUTO_SUBMIT: &[&str] = &[
    "[role='switch']",
    ".el-switch",
    ".ant-switch",
    "input[type='checkbox']",
    ".auto-submit i",
    ".auto-submit svg",
    "[class*='auto'] [class*='icon']",
];

fn with_common(specific: &[&str], common: &[&str]) -> Vec<String> {
    specific.iter().chain(common.iter()).map(|s| s.to_string()).collect()
}

impl PlatformProfile {
    /// 内置配置
    pub fn builtin(id: PlatformId) -> Self {
        match id {
            PlatformId::Zhixue => Self {
                id,
                label: id.name().to_string(),
                host_patterns: strings(&["zhixue.com"]),
                markup_signatures: strings(&["#markingArea", ".zx-marking", "[class*='zhixue']"]),
                image_selectors: with_common(
                    &["#markingArea img", ".marking-img img", ".stu-answer img"],
                    COMMON_IMAGE_SELECTORS,
                ),
                score_input_selectors: with_common(
                    &["#scoreInput", ".marking-score input"],
                    COMMON_SCORE_INPUTS,
                ),
                submit_selectors: with_common(&["#submitScore", ".marking-submit"], COMMON_SUBMIT),
                keypad_selectors: with_common(&[".score-board span", ".mark-key"], COMMON_KEYPAD),
                auto_submit_selectors: with_common(&[".auto-commit .el-switch"], COMMON_AUTO_SUBMIT),
                student_name_selectors: strings(&[".stu-name", ".student-name"]),
                trusted_image_hosts: strings(&["zhixue.com", "zxcdn"]),
                empty_phrases: strings(&["已阅完", "暂无可阅试卷", "没有待阅的试卷"]),
                empty_selectors: strings(&[".marking-finished", ".no-paper-tip"]),
                max_candidates: 3,
                merge_area_ratio: 0.45,
                compress_threshold_bytes: default_compress_threshold(),
            },
            PlatformId::Haofenshu => Self {
                id,
                label: id.name().to_string(),
                host_patterns: strings(&["haofenshu.com", "yunxiao.com"]),
                markup_signatures: strings(&[".yx-marking", "[class*='yunxiao']"]),
                image_selectors: with_common(
                    &[".mark-paper img", ".answer-card img", ".mark-image canvas"],
                    COMMON_IMAGE_SELECTORS,
                ),
                score_input_selectors: with_common(&[".mark-score input"], COMMON_SCORE_INPUTS),
                submit_selectors: with_common(&[".mark-submit", ".commit-btn"], COMMON_SUBMIT),
                keypad_selectors: with_common(&[".score-item"], COMMON_KEYPAD),
                auto_submit_selectors: COMMON_AUTO_SUBMIT.iter().map(|s| s.to_string()).collect(),
                student_name_selectors: strings(&[".student-info .name"]),
                trusted_image_hosts: strings(&["yunxiao.com", "haofenshu.com"]),
                empty_phrases: strings(&["阅卷任务已完成", "当前无可阅试卷"]),
                empty_selectors: strings(&[".mark-empty"]),
                max_candidates: 3,
                merge_area_ratio: 0.5,
                compress_threshold_bytes: 600_000,
            },
            PlatformId::Qitian => Self {
                id,
                label: id.name().to_string(),
                host_patterns: strings(&["7net.cc", "qitianwl"]),
                markup_signatures: strings(&["#pjImg", ".pj-main"]),
                image_selectors: with_common(&["#pjImg", ".pj-main img"], COMMON_IMAGE_SELECTORS),
                score_input_selectors: with_common(&["#txtScore"], COMMON_SCORE_INPUTS),
                submit_selectors: with_common(&["#btnSubmit", ".pj-submit"], COMMON_SUBMIT),
                keypad_selectors: COMMON_KEYPAD.iter().map(|s| s.to_string()).collect(),
                auto_submit_selectors: COMMON_AUTO_SUBMIT.iter().map(|s| s.to_string()).collect(),
                student_name_selectors: Vec::new(),
                trusted_image_hosts: strings(&["7net.cc"]),
                empty_phrases: strings(&["评卷结束", "没有可评的试卷"]),
                empty_selectors: Vec::new(),
                max_candidates: 1,
                merge_area_ratio: 1.0,
                compress_threshold_bytes: default_compress_threshold(),
            },
            PlatformId::Generic => Self {
                id,
                label: id.name().to_string(),
                host_patterns: Vec::new(),
                markup_signatures: Vec::new(),
                image_selectors: strings(COMMON_IMAGE_SELECTORS),
                score_input_selectors: strings(COMMON_SCORE_INPUTS),
                submit_selectors: strings(COMMON_SUBMIT),
                keypad_selectors: strings(COMMON_KEYPAD),
                auto_submit_selectors: strings(COMMON_AUTO_SUBMIT),
                student_name_selectors: strings(&[".student-name", ".stu-name"]),
                trusted_image_hosts: Vec::new(),
                empty_phrases: Vec::new(),
                empty_selectors: Vec::new(),
                max_candidates: default_max_candidates(),
                merge_area_ratio: default_merge_area_ratio(),
                compress_threshold_bytes: default_compress_threshold(),
            },
        }
    }

    pub fn generic() -> Self {
        Self::builtin(PlatformId::Generic)
    }

    /// 地址是否来自该平台的可信图床
    pub fn is_trusted_source(&self, address: &str) -> bool {
        let address = address.to_lowercase();
        self.trusted_image_hosts
            .iter()
            .any(|pattern| address.contains(&pattern.to_lowercase()))
    }

    pub fn matches_host(&self, host: &str) -> bool {
        let host = host.to_lowercase();
        self.host_patterns
            .iter()
            .any(|pattern| host.contains(&pattern.to_lowercase()))
    }

    /// 是否声明了“已无待阅”识别规则
    pub fn detects_empty_queue(&self) -> bool {
        !self.empty_phrases.is_empty() || !self.empty_selectors.is_empty()
    }
}
