//! LLM 评分客户端
//!
//! 直接把答题卡图片交给兼容 OpenAI 的多模态模型，要求其按 JSON 返回分数。
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
        ChatCompletionRequestMessageContentPartText, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContent,
        ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequestArgs, ImageDetail,
        ImageUrl,
    },
    Client,
};
use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::clients::scoring_client::ScoringClient;
use crate::config::Config;
use crate::error::ScoringError;
use crate::models::artifact::Artifact;
use crate::models::loaders::{Rubric, RubricBook};
use crate::models::scoring::{ScoringContext, ScoringResult};

const SYSTEM_PROMPT: &str = "你是一名严谨的阅卷老师。根据评分细则为学生答题卡图片打分。\
只输出一个 JSON 对象，格式为 \
{\"score\": 数字, \"maxScore\": 数字, \"rationale\": \"简要理由\", \
\"breakdown\": [{\"label\": \"得分点\", \"score\": 数字, \"maxScore\": 数字}]}，不要输出其他内容。";

/// LLM 评分客户端
pub struct LlmScoringClient {
    client: Client<OpenAIConfig>,
    model_name: String,
    rubrics: RubricBook,
}

impl LlmScoringClient {
    pub fn new(config: &Config, rubrics: RubricBook) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: config.llm_model_name.clone(),
            rubrics,
        }
    }

    fn request_failed(&self, source: impl std::error::Error + Send + Sync + 'static) -> ScoringError {
        ScoringError::RequestFailed {
            endpoint: self.model_name.clone(),
            source: Box::new(source),
        }
    }

    fn rubric_for(&self, strategy_id: &str, context: &ScoringContext) -> Option<&Rubric> {
        self.rubrics.get(strategy_id).filter(|rubric| {
            rubric.question_ids.is_empty()
                || context
                    .question_id
                    .as_ref()
                    .map(|q| rubric.question_ids.contains(q))
                    .unwrap_or(false)
        })
    }
}

/// 构建用户消息
fn build_user_message(strategy_id: &str, context: &ScoringContext, rubric: Option<&Rubric>) -> String {
    let rubric_text = rubric
        .map(|r| r.prompt.trim())
        .filter(|p| !p.is_empty())
        .unwrap_or("按照常规阅卷标准评分，步骤分与结果分分别给出。");
    let max_score = rubric
        .and_then(|r| r.max_score)
        .map(|m| m.to_string())
        .unwrap_or_else(|| "未知（请根据题目判断）".to_string());

    format!(
        "评分策略：{}\n平台：{}\n题目编号：{}\n满分：{}\n\n评分细则：\n{}\n\n请为图片中的作答打分。",
        strategy_id,
        context.platform_label,
        context.question_id.as_deref().unwrap_or("未知"),
        max_score,
        rubric_text
    )
}

/// 模型没按 JSON 回答时，从“得分：X”一类文字里取分数
static TEXT_SCORE_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"(?:"score"|得分|分数)\s*[:：]\s*(\d+(?:\.\d+)?)"#).ok());

/// 解析模型返回的 JSON 判定
///
/// 容忍代码块包裹与前后多余文字；找不到 JSON 时退回“得分：X”形式。
pub fn parse_llm_verdict(response: &str) -> Result<ScoringResult, ScoringError> {
    let response = response.trim();

    if let (Some(start), Some(end)) = (response.find('{'), response.rfind('}')) {
        if start < end {
            if let Ok(result) = serde_json::from_str::<ScoringResult>(&response[start..=end]) {
                if result.score.is_finite() && result.score >= 0.0 {
                    return Ok(result);
                }
            }
        }
    }

    if let Some(score) = TEXT_SCORE_PATTERN
        .as_ref()
        .and_then(|pattern| pattern.captures(response))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
    {
        warn!("模型未返回规范 JSON，按文本提取分数: {}", score);
        return Ok(ScoringResult {
            score,
            max_score: None,
            rationale: response.to_string(),
            breakdown: Vec::new(),
        });
    }

    Err(ScoringError::InvalidResult(
        crate::utils::logging::truncate_text(response, 120),
    ))
}

#[async_trait]
impl ScoringClient for LlmScoringClient {
    async fn score(
        &self,
        artifact: &Artifact,
        context: &ScoringContext,
        strategy_id: &str,
    ) -> Result<ScoringResult, ScoringError> {
        debug!("调用 LLM 评分，模型: {} {}", self.model_name, context);

        let rubric = self.rubric_for(strategy_id, context);
        let user_text = build_user_message(strategy_id, context, rubric);

        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(SYSTEM_PROMPT)
            .build()
            .map_err(|e| self.request_failed(e))?;

        let content_parts = vec![
            ChatCompletionRequestUserMessageContentPart::Text(
                ChatCompletionRequestMessageContentPartText { text: user_text },
            ),
            ChatCompletionRequestUserMessageContentPart::ImageUrl(
                ChatCompletionRequestMessageContentPartImage {
                    image_url: ImageUrl {
                        url: artifact.to_data_url(),
                        detail: Some(ImageDetail::High),
                    },
                },
            ),
        ];

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(ChatCompletionRequestUserMessageContent::Array(content_parts))
            .build()
            .map_err(|e| self.request_failed(e))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(vec![
                ChatCompletionRequestMessage::System(system_msg),
                ChatCompletionRequestMessage::User(user_msg),
            ])
            .temperature(0.1)
            .max_tokens(1024u32)
            .build()
            .map_err(|e| self.request_failed(e))?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            self.request_failed(e)
        })?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| ScoringError::EmptyContent {
                model: self.model_name.clone(),
            })?;

        let mut result = parse_llm_verdict(&content)?;
        if result.max_score.is_none() {
            result.max_score = rubric.and_then(|r| r.max_score);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::platform::PlatformId;

    fn context() -> ScoringContext {
        ScoringContext {
            question_id: Some("q17".to_string()),
            exam_id: None,
            student_name: None,
            platform: PlatformId::Zhixue,
            platform_label: "智学网".to_string(),
        }
    }

    #[test]
    fn test_parse_fenced_json() {
        let result = parse_llm_verdict(
            "```json\n{\"score\": 6, \"maxScore\": 8, \"rationale\": \"缺少单位\"}\n```",
        )
        .unwrap();
        assert_eq!(result.score, 6.0);
        assert_eq!(result.max_score, Some(8.0));
    }

    #[test]
    fn test_parse_text_fallback() {
        let result = parse_llm_verdict("综合来看，得分：4.5，扣分点在第二步").unwrap();
        assert_eq!(result.score, 4.5);
        assert!(result.breakdown.is_empty());
        let result = parse_llm_verdict("分数: 6").unwrap();
        assert_eq!(result.score, 6.0);
        assert!(TEXT_SCORE_PATTERN.is_some());
    }

    #[test]
    fn test_parse_garbage_fails() {
        assert!(parse_llm_verdict("无法识别图片").is_err());
    }

    #[test]
    fn test_user_message_includes_rubric() {
        let rubric = Rubric {
            prompt: "写出公式得 2 分".to_string(),
            max_score: Some(6.0),
            question_ids: Vec::new(),
        };
        let text = build_user_message("physics", &context(), Some(&rubric));
        assert!(text.contains("写出公式得 2 分"));
        assert!(text.contains("满分：6"));
        assert!(text.contains("题目编号：q17"));
    }
}
