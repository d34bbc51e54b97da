use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tokio::fs;

/// 评分策略（细则）
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Rubric {
    /// 细则正文，直接放入提示词
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub max_score: Option<f64>,
    /// 只适用于这些题目，空表示不限
    #[serde(default)]
    pub question_ids: Vec<String>,
}

/// 策略 id → 细则
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RubricBook {
    #[serde(default)]
    pub strategies: HashMap<String, Rubric>,
}

impl RubricBook {
    pub fn get(&self, strategy_id: &str) -> Option<&Rubric> {
        self.strategies.get(strategy_id)
    }
}

pub async fn load_rubrics(path: Option<&Path>) -> Result<RubricBook> {
    let Some(path) = path else {
        return Ok(RubricBook::default());
    };

    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("无法读取评分细则文件: {}", path.display()))?;

    let book: RubricBook = toml::from_str(&content)
        .with_context(|| format!("无法解析评分细则文件: {}", path.display()))?;

    tracing::info!("成功加载 {} 个评分策略", book.strategies.len());
    Ok(book)
}
