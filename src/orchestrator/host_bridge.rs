//! 与控制端（侧边栏）的消息协议
//!
//! 每行一个 JSON 请求，按 `type` 字段分发；响应与推送同样按行输出。

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::models::artifact::Fingerprint;
use crate::models::loop_state::{LoopEvent, LoopState};
use crate::models::scoring::ScoringContext;
use crate::services::fingerprint::fingerprint;
use crate::services::page_context;
use crate::services::WriteStrategy;
use crate::workflow::{LoopController, RetryPolicy};

/// 控制端请求
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostCommand {
    GetPageContext,
    StartLoop {
        #[serde(default, alias = "strategyId")]
        strategy_id: Option<String>,
        #[serde(default, alias = "questionId")]
        question_id: Option<String>,
    },
    StopLoop,
    Status,
    /// 人工单次扫描（更长的重试策略）
    ScanOnce,
    /// 只检查答题卡图片是否存在，不提取
    CheckReady,
    FillScore {
        score: f64,
        #[serde(default = "default_submit")]
        submit: bool,
    },
    ConfirmSubmit,
}

fn default_submit() -> bool {
    true
}

/// 带编号的请求
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HostRequest {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(flatten)]
    pub command: HostCommand,
}

/// 单次扫描结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    /// data URL
    pub image: String,
    pub mime: String,
    pub width: u32,
    pub height: u32,
    pub source_count: usize,
    pub fingerprint: Option<Fingerprint>,
    pub context: ScoringContext,
}

/// 响应
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostResponse {
    PageContext { context: ScoringContext },
    LoopStarted { started: bool },
    LoopStopped { state: LoopState },
    Status { state: LoopState },
    Scan { report: ScanReport },
    Ready { ready: bool },
    ScoreFilled { strategy: WriteStrategy },
    SubmitConfirmed,
    Error { message: String },
}

/// 带编号的响应
#[derive(Debug, Clone, Serialize)]
pub struct HostReply {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(flatten)]
    pub response: HostResponse,
}

/// 循环推送
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(flatten)]
    pub event: LoopEvent,
}

impl From<LoopEvent> for EventEnvelope {
    fn from(event: LoopEvent) -> Self {
        Self {
            kind: "event",
            event,
        }
    }
}

/// 请求分发
pub struct HostBridge {
    controller: LoopController,
    default_strategy: String,
}

impl HostBridge {
    pub fn new(controller: LoopController, default_strategy: impl Into<String>) -> Self {
        Self {
            controller,
            default_strategy: default_strategy.into(),
        }
    }

    pub fn controller(&self) -> &LoopController {
        &self.controller
    }

    /// 解析一行请求并处理
    pub async fn handle_line(&self, line: &str) -> HostReply {
        match serde_json::from_str::<HostRequest>(line) {
            Ok(request) => HostReply {
                id: request.id,
                response: self.handle(request.command).await,
            },
            Err(e) => HostReply {
                id: None,
                response: HostResponse::Error {
                    message: format!("无法解析请求: {}", e),
                },
            },
        }
    }

    pub async fn handle(&self, command: HostCommand) -> HostResponse {
        debug!("收到控制端请求: {:?}", command);
        let scanner = self.controller.scanner();

        match command {
            HostCommand::GetPageContext => {
                let profile = scanner.resolve_profile().await;
                let context = page_context::read_context(scanner.surface().as_ref(), &profile).await;
                HostResponse::PageContext { context }
            }
            HostCommand::StartLoop {
                strategy_id,
                question_id,
            } => {
                let strategy = strategy_id
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| self.default_strategy.clone());
                HostResponse::LoopStarted {
                    started: self.controller.start(strategy, question_id),
                }
            }
            HostCommand::StopLoop => {
                self.controller.stop();
                HostResponse::LoopStopped {
                    state: self.controller.status(),
                }
            }
            HostCommand::Status => HostResponse::Status {
                state: self.controller.status(),
            },
            HostCommand::ScanOnce => {
                let profile = scanner.resolve_profile().await;
                match scanner.scan_with_retry(&profile, RetryPolicy::manual()).await {
                    Ok(artifact) => {
                        let context =
                            page_context::read_context(scanner.surface().as_ref(), &profile).await;
                        info!("🖼️ 单次扫描完成: {}x{}", artifact.width, artifact.height);
                        HostResponse::Scan {
                            report: ScanReport {
                                image: artifact.to_data_url(),
                                fingerprint: fingerprint(&artifact.bytes, 0),
                                mime: artifact.mime,
                                width: artifact.width,
                                height: artifact.height,
                                source_count: artifact.source_count,
                                context,
                            },
                        }
                    }
                    Err(e) => HostResponse::Error {
                        message: e.to_string(),
                    },
                }
            }
            HostCommand::CheckReady => {
                let profile = scanner.resolve_profile().await;
                HostResponse::Ready {
                    ready: scanner.check_ready(&profile).await,
                }
            }
            HostCommand::FillScore { score, submit } => {
                let profile = scanner.resolve_profile().await;
                match self.controller.writer().fill_score(score, &profile, submit).await {
                    Ok(strategy) => HostResponse::ScoreFilled { strategy },
                    Err(e) => HostResponse::Error {
                        message: e.to_string(),
                    },
                }
            }
            HostCommand::ConfirmSubmit => {
                let profile = scanner.resolve_profile().await;
                match self.controller.writer().confirm_submit(&profile).await {
                    Ok(()) => HostResponse::SubmitConfirmed,
                    Err(e) => HostResponse::Error {
                        message: e.to_string(),
                    },
                }
            }
        }
    }
}
