//! 脚本执行器 - 基础设施层
//!
//! 唯一持有阅卷页 `Page` 的地方。上层只拿到“在页面里跑一段脚本”的能力，
//! 不接触 CDP 细节。

use anyhow::{anyhow, Context, Result};
use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// 单次脚本的默认超时（页面冻结时 evaluate 可能一直不返回）
const DEFAULT_EVAL_TIMEOUT: Duration = Duration::from_secs(20);

/// 页面脚本执行器
pub struct JsExecutor {
    page: Page,
    eval_timeout: Duration,
}

impl JsExecutor {
    pub fn new(page: Page) -> Self {
        Self {
            page,
            eval_timeout: DEFAULT_EVAL_TIMEOUT,
        }
    }

    pub fn with_eval_timeout(mut self, eval_timeout: Duration) -> Self {
        self.eval_timeout = eval_timeout;
        self
    }

    /// 执行脚本，返回值为 undefined 时得到 `Null`
    pub async fn eval(&self, script: impl Into<String>) -> Result<JsonValue> {
        let script = script.into();
        debug!("执行页面脚本 ({} 字符)", script.len());

        let evaluation = timeout(self.eval_timeout, self.page.evaluate(script))
            .await
            .map_err(|_| anyhow!("页面脚本执行超时 ({:?})", self.eval_timeout))?
            .context("页面脚本执行失败")?;
        Ok(evaluation.value().cloned().unwrap_or(JsonValue::Null))
    }

    /// 执行脚本并按类型解析返回值
    pub async fn eval_as<T: DeserializeOwned>(&self, script: impl Into<String>) -> Result<T> {
        let value = self.eval(script).await?;
        serde_json::from_value(value).context("页面脚本返回值格式不符")
    }
}
