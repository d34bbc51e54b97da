//! 应用入口 - 编排层
//!
//! 负责连接浏览器、组装各层组件，并在 stdin/stdout 上运行控制端协议。
//! 唯一持有 Browser 的模块。

use anyhow::{Context, Result};
use chromiumoxide::Browser;
use serde::Serialize;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};

use crate::browser;
use crate::clients::{HttpScoringClient, LlmScoringClient, ScoringClient};
use crate::config::{Config, ScoringBackend};
use crate::infrastructure::{ChromeSurface, JsExecutor, PageSurface};
use crate::models::loaders::{load_profiles, load_rubrics};
use crate::orchestrator::host_bridge::{EventEnvelope, HostBridge};
use crate::services::ProfileResolver;
use crate::utils::logging::{log_session_summary, log_startup};
use crate::workflow::LoopController;

/// 应用主结构
pub struct App {
    _browser: Browser,
    bridge: HostBridge,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        log_startup(&config);

        let profiles = load_profiles(config.profile_file.as_deref())
            .await
            .context("加载平台配置失败")?;
        let resolver = ProfileResolver::new(profiles);

        let (browser, page) = match (config.headless, config.target_url.as_deref()) {
            (true, Some(url)) => {
                browser::launch_headless_browser(url, config.chrome_executable.as_deref()).await?
            }
            (true, None) => anyhow::bail!("无头模式需要设置 TARGET_URL"),
            (false, target_url) => {
                browser::connect_to_grading_page(
                    config.browser_debug_port,
                    target_url,
                    config.target_title.as_deref(),
                    &resolver,
                )
                .await?
            }
        };

        // JsExecutor 是唯一的 page owner
        let executor = Arc::new(JsExecutor::new(page));
        let surface: Arc<dyn PageSurface> = Arc::new(ChromeSurface::new(executor));

        let scoring = build_scoring_client(&config).await?;
        let controller = LoopController::new(surface, scoring, resolver, &config);

        Ok(Self {
            _browser: browser,
            bridge: HostBridge::new(controller, config.default_strategy.clone()),
        })
    }

    /// 运行控制端协议，直到 stdin 关闭
    pub async fn run(&self) -> Result<()> {
        let controller = self.bridge.controller();
        let mut events = controller.subscribe();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = tokio::io::stdout();

        info!("✓ 已就绪，等待控制端指令");

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let line = match line {
                        Ok(Some(line)) => line,
                        Ok(None) => break,
                        Err(e) => {
                            error!("读取控制端输入失败: {}", e);
                            break;
                        }
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    let reply = self.bridge.handle_line(&line).await;
                    write_line(&mut stdout, &reply).await?;
                }
                Some(event) = events.recv() => {
                    write_line(&mut stdout, &EventEnvelope::from(event)).await?;
                }
            }
        }

        warn!("控制端已断开，停止自动阅卷");
        controller.stop();
        controller.join().await;
        log_session_summary(&controller.status());
        Ok(())
    }
}

async fn build_scoring_client(config: &Config) -> Result<Arc<dyn ScoringClient>> {
    Ok(match config.scoring_backend {
        ScoringBackend::Http => {
            info!("使用评分服务: {}", config.scoring_api_base_url);
            Arc::new(HttpScoringClient::new(
                config.scoring_api_base_url.clone(),
                config.scoring_api_token.clone(),
                config.scoring_timeout,
            )?)
        }
        ScoringBackend::Llm => {
            if config.llm_api_key.is_empty() {
                warn!("⚠️ 未设置 LLM_API_KEY，模型请求可能被拒绝");
            }
            let rubrics = load_rubrics(config.rubric_file.as_deref())
                .await
                .context("加载评分细则失败")?;
            info!("使用模型评分: {}", config.llm_model_name);
            Arc::new(LlmScoringClient::new(config, rubrics))
        }
    })
}

async fn write_line<T: Serialize>(stdout: &mut tokio::io::Stdout, value: &T) -> Result<()> {
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    stdout.write_all(line.as_bytes()).await?;
    stdout.flush().await?;
    Ok(())
}
