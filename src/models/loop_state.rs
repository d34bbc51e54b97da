//! 自动阅卷循环状态

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::artifact::Fingerprint;
use crate::models::scoring::ScoringResult;

/// 循环阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Extracting,
    ExtractFailed,
    /// 页面尚未切换到下一份
    WaitingNext,
    /// 长时间未切换，需要人工刷新
    WaitingRefresh,
    Grading,
    GradingFailed,
    Submitting,
    Submitted,
    SubmitFailed,
    /// 已无待阅试卷，循环结束
    NoMoreItems,
    /// 外部停止或页面切到后台
    Stopped,
}

impl Phase {
    /// 终止阶段：不再自动进入下一轮
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::NoMoreItems | Phase::Stopped)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "空闲",
            Phase::Extracting => "提取中",
            Phase::ExtractFailed => "提取失败",
            Phase::WaitingNext => "等待下一份",
            Phase::WaitingRefresh => "等待刷新",
            Phase::Grading => "评分中",
            Phase::GradingFailed => "评分失败",
            Phase::Submitting => "提交中",
            Phase::Submitted => "已提交",
            Phase::SubmitFailed => "提交失败",
            Phase::NoMoreItems => "已阅完",
            Phase::Stopped => "已停止",
        };
        f.write_str(name)
    }
}

/// 循环状态（由 LoopController 独占修改）
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopState {
    pub running: bool,
    pub phase: Phase,
    pub processed_count: u64,
    pub consecutive_success: u32,
    pub last_error: Option<String>,
    pub last_fingerprint: Option<Fingerprint>,
    /// 连续未拿到新答题卡的轮数（提取失败与签名未变都计入）
    pub wait_count: u32,
    /// 其中签名未变的轮数，只有它决定是否提示刷新
    pub unchanged_count: u32,
    /// 本轮卡住期间是否已发出刷新提示
    pub refresh_signalled: bool,
    pub strategy_id: Option<String>,
    pub pinned_question_id: Option<String>,
    pub last_score: Option<f64>,
    pub started_at: Option<DateTime<Local>>,
    pub last_activity_at: Option<DateTime<Local>>,
    pub last_pause_at: Option<DateTime<Local>>,
    /// 已评分但写回失败的结果，同一份答题卡再次出现时直接重试提交
    #[serde(skip)]
    pub pending: Option<(Fingerprint, ScoringResult)>,
}

impl Default for LoopState {
    fn default() -> Self {
        Self {
            running: false,
            phase: Phase::Idle,
            processed_count: 0,
            consecutive_success: 0,
            last_error: None,
            last_fingerprint: None,
            wait_count: 0,
            unchanged_count: 0,
            refresh_signalled: false,
            strategy_id: None,
            pinned_question_id: None,
            last_score: None,
            started_at: None,
            last_activity_at: None,
            last_pause_at: None,
            pending: None,
        }
    }
}

impl LoopState {
    /// 开始新一轮循环时的初始状态
    pub fn started(strategy_id: String, pinned_question_id: Option<String>) -> Self {
        Self {
            running: true,
            phase: Phase::Extracting,
            strategy_id: Some(strategy_id),
            pinned_question_id,
            started_at: Some(Local::now()),
            ..Self::default()
        }
    }

    pub fn enter(&mut self, phase: Phase) {
        self.phase = phase;
        self.last_activity_at = Some(Local::now());
    }

    /// 记录可重试失败
    pub fn record_failure(&mut self, phase: Phase, error: impl Into<String>) {
        self.enter(phase);
        self.consecutive_success = 0;
        self.last_error = Some(error.into());
    }
}

/// 推送给宿主控制端的通知
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LoopEvent {
    Submitted { processed: u64, score: f64 },
    NeedsRefresh { wait_count: u32 },
    Finished { processed: u64 },
    Paused { reason: String },
}
