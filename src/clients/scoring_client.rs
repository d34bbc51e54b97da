/// 评分服务客户端
///
/// 只负责组装请求、解释成功/失败；重试策略由循环控制器决定
use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::error::ScoringError;
use crate::models::artifact::Artifact;
use crate::models::scoring::{ScoringContext, ScoringResult};

/// 评分服务
#[async_trait]
pub trait ScoringClient: Send + Sync {
    async fn score(
        &self,
        artifact: &Artifact,
        context: &ScoringContext,
        strategy_id: &str,
    ) -> Result<ScoringResult, ScoringError>;
}

/// 请求体
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScoringRequest<'a> {
    image: String,
    question_id: Option<&'a str>,
    exam_id: Option<&'a str>,
    student_name: Option<&'a str>,
    platform: &'a str,
    strategy_id: &'a str,
}

/// HTTP 评分服务客户端
pub struct HttpScoringClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpScoringClient {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("创建评分服务 HTTP 客户端失败")?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            token: token.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/grade", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ScoringClient for HttpScoringClient {
    async fn score(
        &self,
        artifact: &Artifact,
        context: &ScoringContext,
        strategy_id: &str,
    ) -> Result<ScoringResult, ScoringError> {
        let endpoint = self.endpoint();
        let body = ScoringRequest {
            image: artifact.to_data_url(),
            question_id: context.question_id.as_deref(),
            exam_id: context.exam_id.as_deref(),
            student_name: context.student_name.as_deref(),
            platform: &context.platform_label,
            strategy_id,
        };

        debug!("请求评分服务 {} (图片 {} 字节)", endpoint, artifact.len());

        let mut request = self.http.post(&endpoint).json(&body);
        if !self.token.is_empty() {
            request = request.bearer_auth(&self.token);
        }

        let response = request.send().await.map_err(|e| ScoringError::RequestFailed {
            endpoint: endpoint.clone(),
            source: Box::new(e),
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| ScoringError::RequestFailed {
            endpoint: endpoint.clone(),
            source: Box::new(e),
        })?;

        if !status.is_success() {
            return Err(ScoringError::BadResponse {
                code: Some(status.as_u16() as i64),
                message: Some(crate::utils::logging::truncate_text(&text, 200)),
            });
        }

        let value: Value = serde_json::from_str(&text)
            .map_err(|e| ScoringError::InvalidResult(format!("{}: {}", e, text)))?;
        parse_scoring_response(value)
    }
}

/// 解析评分服务响应，兼容 `{code, message, data}` 外层包装
pub fn parse_scoring_response(value: Value) -> Result<ScoringResult, ScoringError> {
    if let Some(code) = value.get("code").and_then(Value::as_i64) {
        if code != 0 && code != 200 {
            return Err(ScoringError::BadResponse {
                code: Some(code),
                message: value
                    .get("message")
                    .or_else(|| value.get("msg"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
            });
        }
    }

    let payload = match value.get("data") {
        Some(data) if data.is_object() => data.clone(),
        _ => value,
    };

    let result: ScoringResult = serde_json::from_value(payload)
        .map_err(|e| ScoringError::InvalidResult(e.to_string()))?;

    if !result.score.is_finite() || result.score < 0.0 {
        return Err(ScoringError::InvalidResult(format!(
            "分数不合法: {}",
            result.score
        )));
    }

    Ok(result)
}
