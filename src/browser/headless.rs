use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chromiumoxide::{Browser, BrowserConfig, Page};
use tokio::time::sleep;
use tracing::{debug, info};

use super::{drive_handler, TARGET_SYNC_DELAY};

/// 无头模式下的启动参数
const HEADLESS_ARGS: [&str; 3] = ["--disable-gpu", "--no-sandbox", "--disable-dev-shm-usage"];

/// 启动无头浏览器并打开阅卷页面（本地调试用）
///
/// 无头页面永远处于“前台”，可见性检查不会暂停循环。
pub async fn launch_headless_browser(
    url: &str,
    chrome_executable: Option<&Path>,
) -> Result<(Browser, Page)> {
    info!("🚀 以无头模式打开阅卷页: {}", url);

    let mut builder = BrowserConfig::builder()
        .new_headless_mode()
        .args(HEADLESS_ARGS.to_vec());
    if let Some(path) = chrome_executable {
        debug!("使用指定的 Chrome: {}", path.display());
        builder = builder.chrome_executable(path);
    }
    let browser_config = builder
        .build()
        .map_err(|e| anyhow!("无头浏览器参数无效: {}", e))?;

    let (browser, handler) = Browser::launch(browser_config)
        .await
        .context("无头浏览器启动失败")?;
    drive_handler(handler);
    sleep(TARGET_SYNC_DELAY).await;

    let page = browser
        .new_page(url)
        .await
        .with_context(|| format!("打开阅卷页失败: {}", url))?;

    info!("✅ 无头浏览器已就绪");
    Ok((browser, page))
}
