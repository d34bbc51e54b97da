//! 自动阅卷循环
//!
//! 单个后台任务按阶段推进：提取 → 判断是否换卷 → 评分 → 写分，
//! 每轮结束后按节奏等待再进入下一轮。状态只由本模块修改，外部只能启动、停止、查询。

use chrono::Local;
use futures::FutureExt;
use parking_lot::Mutex;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::clients::ScoringClient;
use crate::config::Config;
use crate::error::ScanError;
use crate::infrastructure::PageSurface;
use crate::models::artifact::{Artifact, Fingerprint};
use crate::models::loop_state::{LoopEvent, LoopState, Phase};
use crate::models::platform::PlatformProfile;
use crate::models::scoring::ScoringResult;
use crate::services::fingerprint::{fingerprint, is_unchanged};
use crate::services::page_context;
use crate::services::{ProfileResolver, ScoreWriter, SubmitOptions};
use crate::workflow::pacing::Pacer;
use crate::workflow::scan::{RetryPolicy, Scanner};

/// 标签页切到后台时记录的错误
pub const NOT_FOREGROUND_ERROR: &str = "页面不在前台，已暂停自动阅卷";

/// 自动阅卷循环控制器
#[derive(Clone)]
pub struct LoopController {
    inner: Arc<Inner>,
}

struct Inner {
    surface: Arc<dyn PageSurface>,
    scanner: Arc<Scanner>,
    writer: Arc<ScoreWriter>,
    scoring: Arc<dyn ScoringClient>,
    state: Mutex<LoopState>,
    pacer: Mutex<Pacer>,
    wait_refresh_threshold: u32,
    min_artifact_bytes: usize,
    events: Mutex<Option<UnboundedSender<LoopEvent>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// 本轮评分前的判断结果
enum Verdict {
    /// 新答题卡，需要评分
    Fresh(Fingerprint),
    /// 上次写分失败的同一份答题卡，直接重试写分
    Pending(Fingerprint, ScoringResult),
}

impl LoopController {
    pub fn new(
        surface: Arc<dyn PageSurface>,
        scoring: Arc<dyn ScoringClient>,
        resolver: ProfileResolver,
        config: &Config,
    ) -> Self {
        let scanner = Scanner::new(surface.clone(), resolver, config.thresholds.clone());
        let writer = ScoreWriter::new(surface.clone(), config.thresholds.clone());
        Self::with_parts(
            surface,
            Arc::new(scanner),
            Arc::new(writer),
            scoring,
            Pacer::new(config.pacing.clone()),
            config,
        )
    }

    pub fn with_parts(
        surface: Arc<dyn PageSurface>,
        scanner: Arc<Scanner>,
        writer: Arc<ScoreWriter>,
        scoring: Arc<dyn ScoringClient>,
        pacer: Pacer,
        config: &Config,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                surface,
                scanner,
                writer,
                scoring,
                state: Mutex::new(LoopState::default()),
                pacer: Mutex::new(pacer),
                wait_refresh_threshold: config.thresholds.wait_refresh_threshold.max(1),
                min_artifact_bytes: config.thresholds.min_artifact_bytes,
                events: Mutex::new(None),
                task: Mutex::new(None),
            }),
        }
    }

    pub fn scanner(&self) -> &Arc<Scanner> {
        &self.inner.scanner
    }

    pub fn writer(&self) -> &Arc<ScoreWriter> {
        &self.inner.writer
    }

    /// 订阅循环通知；重复订阅时旧的接收端不再收到消息
    pub fn subscribe(&self) -> UnboundedReceiver<LoopEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.inner.events.lock() = Some(tx);
        rx
    }

    /// 启动循环；已在运行时返回 false
    pub fn start(&self, strategy_id: impl Into<String>, pinned_question_id: Option<String>) -> bool {
        if !self.prepare(strategy_id, pinned_question_id) {
            return false;
        }

        let inner = self.inner.clone();
        let handle = tokio::spawn(async move { inner.run().await });
        if let Some(previous) = self.inner.task.lock().replace(handle) {
            previous.abort();
        }
        true
    }

    /// 只重置状态不启动后台任务，配合 [`LoopController::step`] 单步执行
    pub fn prepare(&self, strategy_id: impl Into<String>, pinned_question_id: Option<String>) -> bool {
        let mut state = self.inner.state.lock();
        if state.running {
            return false;
        }
        *state = LoopState::started(strategy_id.into(), pinned_question_id);
        info!(
            "▶️ 自动阅卷已启动，评分策略: {}",
            state.strategy_id.as_deref().unwrap_or("-")
        );
        true
    }

    /// 请求停止；进行中的阶段会执行完，之后不再进入新阶段
    pub fn stop(&self) {
        let mut state = self.inner.state.lock();
        if state.running {
            info!("⏹️ 收到停止请求，已处理 {} 份", state.processed_count);
        }
        state.running = false;
        if !state.phase.is_terminal() {
            state.enter(Phase::Stopped);
        }
    }

    pub fn status(&self) -> LoopState {
        self.inner.state.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.inner.state.lock().running
    }

    /// 执行一轮，返回下一轮前应等待的时间；循环结束时返回 `None`
    pub async fn step(&self) -> Option<Duration> {
        self.inner.step().await
    }

    /// 等待后台任务结束
    pub async fn join(&self) {
        let handle = self.inner.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    error!("阅卷循环任务异常退出: {}", e);
                }
            }
        }
    }
}

impl Inner {
    async fn run(self: Arc<Self>) {
        while let Some(delay) = self.step().await {
            debug!("下一轮等待 {:?}", delay);
            tokio::time::sleep(delay).await;
            if !self.state.lock().running {
                break;
            }
        }

        let state = self.state.lock().clone();
        info!(
            "🛑 自动阅卷结束: {}，共处理 {} 份",
            state.phase, state.processed_count
        );
    }

    /// 修改状态；停止后阶段不再被改回非终止状态
    fn update<R>(&self, f: impl FnOnce(&mut LoopState) -> R) -> R {
        let mut state = self.state.lock();
        let result = f(&mut state);
        if !state.running && !state.phase.is_terminal() {
            state.phase = Phase::Stopped;
        }
        result
    }

    fn emit(&self, event: LoopEvent) {
        if let Some(tx) = self.events.lock().as_ref() {
            let _ = tx.send(event);
        }
    }

    async fn step(&self) -> Option<Duration> {
        if !self.state.lock().running {
            return None;
        }
        if !self.gate().await {
            return None;
        }

        match AssertUnwindSafe(self.cycle()).catch_unwind().await {
            Ok(next) => next,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "未知异常".to_string());
                error!("阅卷循环出现异常，按可重试处理: {}", message);
                let consecutive = self.update(|s| {
                    let failed = failure_phase(s.phase);
                    s.record_failure(failed, format!("内部异常: {}", message));
                    s.consecutive_success
                });
                self.still_running()
                    .then(|| self.pacer.lock().next_delay(consecutive))
            }
        }
    }

    fn still_running(&self) -> bool {
        self.state.lock().running
    }

    /// 阶段边界检查：外部已停止或标签页不在前台时返回 false
    async fn gate(&self) -> bool {
        if !self.still_running() {
            return false;
        }
        match self.surface.is_foreground().await {
            Ok(true) => true,
            Ok(false) => {
                warn!("⏸️ {}", NOT_FOREGROUND_ERROR);
                self.update(|s| {
                    s.running = false;
                    s.last_error = Some(NOT_FOREGROUND_ERROR.to_string());
                    s.enter(Phase::Stopped);
                });
                self.emit(LoopEvent::Paused {
                    reason: NOT_FOREGROUND_ERROR.to_string(),
                });
                false
            }
            Err(e) => {
                debug!("读取页面可见性失败，继续执行: {}", e);
                true
            }
        }
    }

    async fn cycle(&self) -> Option<Duration> {
        let (strategy_id, pinned_question_id) = {
            let mut state = self.state.lock();
            state.enter(Phase::Extracting);
            (
                state.strategy_id.clone().unwrap_or_default(),
                state.pinned_question_id.clone(),
            )
        };

        let profile = self.scanner.resolve_profile().await;
        let retry = RetryPolicy::in_loop(self.pacer.lock().settings().extract_retry_delay);

        let artifact = match self.scanner.scan_with_retry(&profile, retry).await {
            Ok(artifact) => artifact,
            Err(ScanError::NoMoreItems) => return self.finish_queue(),
            Err(e) => return self.extraction_failed(e),
        };

        let verdict = match self.judge(&artifact) {
            Ok(verdict) => verdict,
            Err(next) => return next,
        };

        let (fingerprint, result) = match verdict {
            Verdict::Pending(fingerprint, result) => {
                info!("🔁 同一份答题卡上次写分失败，直接重试提交");
                (fingerprint, result)
            }
            Verdict::Fresh(fingerprint) => {
                if !self.gate().await {
                    return None;
                }
                match self
                    .grade(&artifact, &profile, &strategy_id, pinned_question_id)
                    .await
                {
                    Some(result) => {
                        self.update(|s| {
                            s.last_fingerprint = Some(fingerprint.clone());
                            s.last_score = Some(result.clamped_score());
                        });
                        (fingerprint, result)
                    }
                    None => return self.retry_after_failure(),
                }
            }
        };

        if !self.gate().await {
            return None;
        }
        self.submit(fingerprint, result, &profile).await
    }

    fn finish_queue(&self) -> Option<Duration> {
        let processed = self.update(|s| {
            s.running = false;
            s.enter(Phase::NoMoreItems);
            s.processed_count
        });
        info!("🏁 已无待阅试卷，本次共处理 {} 份", processed);
        self.emit(LoopEvent::Finished { processed });
        None
    }

    /// 提取失败只是被动状态：照常计入等待并按当前节奏重试，不提示刷新
    fn extraction_failed(&self, error: ScanError) -> Option<Duration> {
        let (wait_count, consecutive) = self.update(|s| {
            s.wait_count += 1;
            s.record_failure(Phase::ExtractFailed, error.to_string());
            (s.wait_count, s.consecutive_success)
        });
        debug!("提取失败 (第 {} 次等待): {}", wait_count, error);

        if !self.still_running() {
            return None;
        }
        Some(self.pacer.lock().next_delay(consecutive))
    }

    /// 达到阈值且本轮卡住期间尚未提示过时返回 true，并记下已提示
    fn take_refresh_signal(&self, state: &mut LoopState) -> bool {
        if state.unchanged_count >= self.wait_refresh_threshold && !state.refresh_signalled {
            state.refresh_signalled = true;
            true
        } else {
            false
        }
    }

    fn signal_refresh(&self, wait_count: u32) {
        warn!("🔄 连续 {} 次未切换到新答题卡，请手动刷新页面", wait_count);
        self.emit(LoopEvent::NeedsRefresh { wait_count });
    }

    /// 用签名判断页面是否已换卷；未换卷时直接给出下一轮等待时间
    fn judge(&self, artifact: &Artifact) -> Result<Verdict, Option<Duration>> {
        let Some(current) = fingerprint(&artifact.bytes, self.min_artifact_bytes) else {
            return Err(self.extraction_failed(ScanError::ArtifactTooSmall(artifact.len())));
        };

        let outcome = self.update(|s| {
            if let Some((pending_fp, result)) = s.pending.as_ref() {
                if *pending_fp == current {
                    return Ok(Verdict::Pending(current.clone(), result.clone()));
                }
            }

            if is_unchanged(s.last_fingerprint.as_ref(), &current) {
                s.wait_count += 1;
                s.unchanged_count += 1;
                let phase = if s.unchanged_count >= self.wait_refresh_threshold {
                    Phase::WaitingRefresh
                } else {
                    Phase::WaitingNext
                };
                s.enter(phase);
                return Err((s.unchanged_count, self.take_refresh_signal(s)));
            }

            s.wait_count = 0;
            s.unchanged_count = 0;
            s.refresh_signalled = false;
            s.last_error = None;
            s.pending = None;
            Ok(Verdict::Fresh(current.clone()))
        });

        match outcome {
            Ok(verdict) => Ok(verdict),
            Err((unchanged, signal)) => {
                debug!("答题卡未变化 (第 {} 次)", unchanged);
                if signal {
                    self.signal_refresh(unchanged);
                }
                if !self.still_running() {
                    return Err(None);
                }
                let consecutive = self.state.lock().consecutive_success;
                let mut pacer = self.pacer.lock();
                Err(Some(if unchanged >= self.wait_refresh_threshold {
                    pacer.refresh_delay()
                } else {
                    pacer.next_delay(consecutive)
                }))
            }
        }
    }

    async fn grade(
        &self,
        artifact: &Artifact,
        profile: &PlatformProfile,
        strategy_id: &str,
        pinned_question_id: Option<String>,
    ) -> Option<ScoringResult> {
        self.update(|s| s.enter(Phase::Grading));

        let mut context = page_context::read_context(self.surface.as_ref(), profile).await;
        if pinned_question_id.is_some() {
            context.question_id = pinned_question_id;
        }
        info!("📝 开始评分 {}", context);

        match self.scoring.score(artifact, &context, strategy_id).await {
            Ok(result) => {
                info!(
                    "✓ 评分完成: {} / {}",
                    result.clamped_score(),
                    result
                        .max_score
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| "-".to_string())
                );
                Some(result)
            }
            Err(e) => {
                warn!("❌ 评分失败: {}", e);
                self.update(|s| s.record_failure(Phase::GradingFailed, e.to_string()));
                None
            }
        }
    }

    async fn submit(
        &self,
        fingerprint: Fingerprint,
        result: ScoringResult,
        profile: &PlatformProfile,
    ) -> Option<Duration> {
        self.update(|s| s.enter(Phase::Submitting));
        let mode = self.pacer.lock().pick_mode();
        let score = result.clamped_score();

        match self
            .writer
            .write(score, profile, SubmitOptions { mode, submit: true })
            .await
        {
            Ok(strategy) => {
                let (processed, consecutive, last_pause_at) = self.update(|s| {
                    s.processed_count += 1;
                    s.consecutive_success += 1;
                    s.pending = None;
                    s.last_error = None;
                    s.enter(Phase::Submitted);
                    (s.processed_count, s.consecutive_success, s.last_pause_at)
                });
                info!(
                    "📤 第 {} 份已提交 ({:?} / {:?})，得分 {}",
                    processed, strategy, mode, score
                );
                self.emit(LoopEvent::Submitted { processed, score });

                if !self.still_running() {
                    return None;
                }
                let now = Local::now();
                let mut pacer = self.pacer.lock();
                let mut delay = pacer.next_delay(consecutive);
                if let Some(pause) = pacer.maybe_inattention(last_pause_at, now) {
                    debug!("插入额外停顿 {:?}", pause);
                    delay += pause;
                    drop(pacer);
                    self.update(|s| s.last_pause_at = Some(now));
                }
                Some(delay)
            }
            Err(e) => {
                warn!("❌ 写分失败: {}", e);
                self.update(|s| {
                    s.record_failure(Phase::SubmitFailed, e.to_string());
                    s.pending = Some((fingerprint, result));
                });
                self.retry_after_failure()
            }
        }
    }

    fn retry_after_failure(&self) -> Option<Duration> {
        if !self.still_running() {
            return None;
        }
        let consecutive = self.state.lock().consecutive_success;
        Some(self.pacer.lock().next_delay(consecutive))
    }
}

/// 异常发生时所在阶段对应的失败阶段
fn failure_phase(phase: Phase) -> Phase {
    match phase {
        Phase::Grading => Phase::GradingFailed,
        Phase::Submitting => Phase::SubmitFailed,
        _ => Phase::ExtractFailed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_phase_mapping() {
        assert_eq!(failure_phase(Phase::Grading), Phase::GradingFailed);
        assert_eq!(failure_phase(Phase::Submitting), Phase::SubmitFailed);
        assert_eq!(failure_phase(Phase::Extracting), Phase::ExtractFailed);
    }
}
