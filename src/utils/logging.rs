/// 日志工具模块
///
/// 提供日志格式化和输出的辅助函数
use tracing::info;

use crate::config::Config;
use crate::models::loop_state::LoopState;

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 自动阅卷模式");
    info!("🌐 浏览器调试端口: {}", config.browser_debug_port);
    info!("🧮 评分后端: {:?}", config.scoring_backend);
    info!("📋 默认评分策略: {}", config.default_strategy);
    info!("{}", "=".repeat(60));
}

/// 打印一次阅卷会话的统计信息
pub fn log_session_summary(state: &LoopState) {
    info!("\n{}", "=".repeat(60));
    info!("📊 阅卷会话统计");
    info!(
        "结束时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(started_at) = state.started_at {
        info!("开始时间: {}", started_at.format("%Y-%m-%d %H:%M:%S"));
    }
    info!("{}", "=".repeat(60));
    info!("✅ 已提交: {}", state.processed_count);
    info!("📍 最终状态: {}", state.phase);
    if let Some(error) = &state.last_error {
        info!("❌ 最后错误: {}", truncate_text(error, 80));
    }
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
