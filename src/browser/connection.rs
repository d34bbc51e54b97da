use anyhow::{bail, Context, Result};
use chromiumoxide::{Browser, Page};
use tokio::time::sleep;
use tracing::{debug, info};

use super::{drive_handler, TARGET_SYNC_DELAY};
use crate::models::PlatformId;
use crate::services::ProfileResolver;

/// 连接到浏览器并找到阅卷页面
///
/// 查找顺序：标题包含 `target_title` 的页面 → 地址属于已知阅卷平台的页面 →
/// 新建页面并导航到 `target_url`。
pub async fn connect_to_grading_page(
    port: u16,
    target_url: Option<&str>,
    target_title: Option<&str>,
    resolver: &ProfileResolver,
) -> Result<(Browser, Page)> {
    let endpoint = format!("http://localhost:{}", port);
    info!("🔌 连接浏览器调试端口: {}", endpoint);

    let (browser, handler) = Browser::connect(&endpoint)
        .await
        .with_context(|| format!("无法连接浏览器 {}，请确认已用 --remote-debugging-port 启动", endpoint))?;
    drive_handler(handler);
    sleep(TARGET_SYNC_DELAY).await;

    let pages = browser.pages().await.context("读取标签页列表失败")?;
    debug!("浏览器中共有 {} 个标签页", pages.len());

    if let Some(title) = target_title {
        if let Some(page) = find_by_title(&pages, title).await {
            return Ok((browser, page));
        }
        debug!("没有标题包含 '{}' 的标签页", title);
    }

    if let Some((platform, page)) = find_by_platform(&pages, resolver).await {
        info!("✓ 使用已打开的{}阅卷页", platform);
        return Ok((browser, page));
    }

    let Some(url) = target_url else {
        bail!("未找到已打开的阅卷页面，请先在浏览器中打开阅卷页或设置 TARGET_URL");
    };

    let page = browser
        .new_page(url)
        .await
        .with_context(|| format!("打开阅卷页失败: {}", url))?;
    info!("✓ 已新开标签页: {}", url);
    Ok((browser, page))
}

async fn find_by_title(pages: &[Page], title: &str) -> Option<Page> {
    for page in pages {
        if let Ok(Some(page_title)) = page.get_title().await {
            if page_title.contains(title) {
                info!("✓ 按标题找到阅卷页: {}", page_title);
                return Some(page.clone());
            }
        }
    }
    None
}

async fn find_by_platform(pages: &[Page], resolver: &ProfileResolver) -> Option<(PlatformId, Page)> {
    for page in pages {
        let Ok(Some(address)) = page.url().await else {
            continue;
        };
        let host = url::Url::parse(&address)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default();
        if let Some(platform) = resolver.classify_host(&host) {
            debug!("标签页 {} 属于 {}", address, platform);
            return Some((platform, page.clone()));
        }
    }
    None
}
