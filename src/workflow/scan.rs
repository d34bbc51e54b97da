//! 扫描流程：平台识别 → 空队列检测 → 候选定位 → 图像提取
//!
//! 循环内部与人工单次扫描共用，区别只在重试策略。

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::Thresholds;
use crate::error::ScanError;
use crate::infrastructure::{find_everywhere, PageSurface};
use crate::models::artifact::Artifact;
use crate::models::platform::PlatformProfile;
use crate::services::{CandidateLocator, ImageExtractor, ProfileResolver};

/// 扫描重试策略
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// 总尝试次数（含第一次）
    pub attempts: u32,
    pub delay: Duration,
    /// 每次失败后延迟乘以该系数
    pub backoff: f64,
}

impl RetryPolicy {
    /// 循环内：只重试一次，间隔固定
    pub fn in_loop(delay: Duration) -> Self {
        Self {
            attempts: 2,
            delay,
            backoff: 1.0,
        }
    }

    /// 人工单次扫描：多次重试，间隔翻倍
    pub fn manual() -> Self {
        Self {
            attempts: 4,
            delay: Duration::from_millis(800),
            backoff: 2.0,
        }
    }

    /// 第 `attempt` 次失败（从 0 开始）后的等待时间
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.delay.mul_f64(self.backoff.max(1.0).powi(attempt as i32))
    }
}

/// 扫描器
pub struct Scanner {
    surface: Arc<dyn PageSurface>,
    resolver: ProfileResolver,
    locator: CandidateLocator,
    extractor: ImageExtractor,
}

impl Scanner {
    pub fn new(surface: Arc<dyn PageSurface>, resolver: ProfileResolver, thresholds: Thresholds) -> Self {
        Self {
            locator: CandidateLocator::new(surface.clone(), thresholds.clone()),
            extractor: ImageExtractor::new(surface.clone(), thresholds),
            surface,
            resolver,
        }
    }

    pub fn surface(&self) -> &Arc<dyn PageSurface> {
        &self.surface
    }

    pub async fn resolve_profile(&self) -> PlatformProfile {
        self.resolver.resolve(self.surface.as_ref()).await
    }

    /// 页面上是否已有可用的答题卡图片（不提取）
    pub async fn check_ready(&self, profile: &PlatformProfile) -> bool {
        match self.locator.is_ready(profile).await {
            Ok(ready) => ready,
            Err(e) => {
                debug!("就绪检查失败: {}", e);
                false
            }
        }
    }

    /// 是否出现“已无待阅试卷”提示
    pub async fn detect_empty_queue(&self, profile: &PlatformProfile) -> bool {
        if !profile.detects_empty_queue() {
            return false;
        }

        for selector in &profile.empty_selectors {
            let Ok(elements) = find_everywhere(self.surface.as_ref(), selector).await else {
                continue;
            };
            for element in elements {
                if let Ok(info) = self.surface.describe(&element).await {
                    if info.visible {
                        debug!("空队列标记命中: {}", selector);
                        return true;
                    }
                }
            }
        }

        if profile.empty_phrases.is_empty() {
            return false;
        }
        let Ok(contexts) = self.surface.contexts().await else {
            return false;
        };
        for context in contexts {
            let Ok(text) = self.surface.text_content(&context).await else {
                continue;
            };
            if let Some(phrase) = profile.empty_phrases.iter().find(|p| text.contains(p.as_str())) {
                info!("🏁 页面提示“{}”", phrase);
                return true;
            }
        }
        false
    }

    /// 扫描一次
    pub async fn scan(&self, profile: &PlatformProfile) -> Result<Artifact, ScanError> {
        if self.detect_empty_queue(profile).await {
            return Err(ScanError::NoMoreItems);
        }

        let candidates = self
            .locator
            .locate(profile)
            .await
            .map_err(|e| ScanError::Page(e.to_string()))?;
        if candidates.is_empty() {
            return Err(ScanError::NoCandidate);
        }

        self.extractor.extract_artifact(&candidates, profile).await
    }

    /// 按策略重试扫描；“已无待阅”立即返回
    pub async fn scan_with_retry(
        &self,
        profile: &PlatformProfile,
        policy: RetryPolicy,
    ) -> Result<Artifact, ScanError> {
        let attempts = policy.attempts.max(1);
        let mut last_error = ScanError::NoCandidate;

        for attempt in 0..attempts {
            match self.scan(profile).await {
                Ok(artifact) => return Ok(artifact),
                Err(e) if e.is_terminal() => return Err(e),
                Err(e) => {
                    debug!("扫描第 {}/{} 次失败: {}", attempt + 1, attempts, e);
                    last_error = e;
                }
            }
            if attempt + 1 < attempts {
                sleep(policy.delay_after(attempt)).await;
            }
        }

        if last_error != ScanError::NoCandidate {
            warn!("❌ 扫描失败: {}", last_error);
        }
        Err(last_error)
    }
}
