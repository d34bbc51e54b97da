//! 错误类型
//!
//! 自动化组件一律返回带类型的错误值，不向上抛出 panic；
//! 胶水代码使用 `anyhow::Result`。

use thiserror::Error;

/// 扫描（定位 + 提取）错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    /// 页面上没有找到答题卡图片，属于正常的等待状态
    #[error("未找到答题卡图片")]
    NoCandidate,
    /// 找到了元素但读不出图像，可重试
    #[error("答题卡图片提取失败: {0}")]
    ExtractFailed(String),
    /// 图像过小，视为尚未加载完成
    #[error("答题卡图片尚未加载完成 ({0} 字节)")]
    ArtifactTooSmall(usize),
    /// 平台提示已无待阅试卷
    #[error("已无待阅试卷")]
    NoMoreItems,
    /// 与页面通信失败
    #[error("页面通信失败: {0}")]
    Page(String),
}

impl ScanError {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanError::NoMoreItems)
    }
}

/// 写分错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteError {
    /// 既没有数字键盘也没有分数输入框
    #[error("未找到分数输入位置")]
    NoScoreTarget,
    /// 数字键盘上没有对应分值的按钮
    #[error("数字键盘上没有分值 {0}")]
    NoKeypadButton(i64),
    /// 写入后读回的值不一致
    #[error("分数写入未生效: 期望 {expected}, 实际 {actual:?}")]
    ValueMismatch {
        expected: String,
        actual: Option<String>,
    },
    /// 分数已填写但无法触发提交
    #[error("未找到提交按钮")]
    NoSubmitControl,
    #[error("页面通信失败: {0}")]
    Page(String),
}

/// 评分服务错误
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("评分请求失败 ({endpoint}): {source}")]
    RequestFailed {
        endpoint: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("评分服务返回错误: code={code:?}, message={message:?}")]
    BadResponse {
        code: Option<i64>,
        message: Option<String>,
    },
    #[error("评分结果无法解析: {0}")]
    InvalidResult(String),
    #[error("模型返回内容为空 (模型: {model})")]
    EmptyContent { model: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_no_more_items_is_terminal() {
        assert!(ScanError::NoMoreItems.is_terminal());
        assert!(!ScanError::NoCandidate.is_terminal());
        assert!(!ScanError::ExtractFailed("x".into()).is_terminal());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(ScanError::NoCandidate.to_string(), "未找到答题卡图片");
        assert_eq!(
            WriteError::NoKeypadButton(7).to_string(),
            "数字键盘上没有分值 7"
        );
    }
}
