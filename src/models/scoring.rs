use serde::{Deserialize, Serialize};
use std::fmt::Display;

use crate::models::platform::PlatformId;

/// 一次评分所需的上下文
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringContext {
    pub question_id: Option<String>,
    pub exam_id: Option<String>,
    /// 学生姓名（尽力识别，可能为空）
    pub student_name: Option<String>,
    pub platform: PlatformId,
    pub platform_label: String,
}

impl Display for ScoringContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{} 考试#{} 题目#{} 学生:{}]",
            self.platform_label,
            self.exam_id.as_deref().unwrap_or("-"),
            self.question_id.as_deref().unwrap_or("-"),
            self.student_name.as_deref().unwrap_or("-")
        )
    }
}

/// 评分细项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreItem {
    #[serde(alias = "name", alias = "point")]
    pub label: String,
    pub score: f64,
    #[serde(default, alias = "max")]
    pub max_score: Option<f64>,
    #[serde(default)]
    pub comment: Option<String>,
}

/// 评分结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringResult {
    pub score: f64,
    #[serde(default, alias = "max_score", alias = "fullScore")]
    pub max_score: Option<f64>,
    #[serde(default, alias = "reason", alias = "comment")]
    pub rationale: String,
    #[serde(default, alias = "details")]
    pub breakdown: Vec<ScoreItem>,
}

impl ScoringResult {
    /// 分数限制在 [0, max_score] 内
    pub fn clamped_score(&self) -> f64 {
        let upper = self.max_score.unwrap_or(f64::MAX);
        self.score.clamp(0.0, upper.max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_accepts_aliases() {
        let result: ScoringResult = serde_json::from_str(
            r#"{"score": 7, "fullScore": 10, "comment": "步骤完整", "details": [{"name": "第一步", "score": 3, "max": 4}]}"#,
        )
        .unwrap();
        assert_eq!(result.score, 7.0);
        assert_eq!(result.max_score, Some(10.0));
        assert_eq!(result.rationale, "步骤完整");
        assert_eq!(result.breakdown[0].max_score, Some(4.0));
    }

    #[test]
    fn test_clamped_score() {
        let result = ScoringResult {
            score: 12.0,
            max_score: Some(10.0),
            rationale: String::new(),
            breakdown: Vec::new(),
        };
        assert_eq!(result.clamped_score(), 10.0);
    }
}
