//! 浏览器接入：连接操作者已打开的浏览器，或在本地调试时启动无头浏览器

pub mod connection;
pub mod headless;

pub use connection::connect_to_grading_page;
pub use headless::launch_headless_browser;

use chromiumoxide::Handler;
use futures::StreamExt;
use std::time::Duration;
use tracing::debug;

/// 浏览器建立连接后等待目标列表同步的时间
pub(crate) const TARGET_SYNC_DELAY: Duration = Duration::from_millis(300);

/// 在后台驱动 CDP 事件流，连接断开时结束
pub(crate) fn drive_handler(mut handler: Handler) {
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                debug!("浏览器事件流结束: {}", e);
                break;
            }
        }
    });
}
