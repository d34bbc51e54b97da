//! 基于 CDP 的页面表面实现
//!
//! 每个操作都是一次 `JsExecutor::eval`，元素通过 `data-amk-ref` 标记定位。

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::infrastructure::page_surface::{
    DocContext, ElementInfo, ElementRef, FetchMode, Geometry, Key, PageEvent, PageLocation,
    PageSurface,
};
use crate::infrastructure::scripts;
use crate::infrastructure::JsExecutor;
use crate::utils::data_url::decode_data_url;

/// 脚本返回的元素引用
#[derive(Debug, Deserialize)]
struct RawRef {
    frame_path: Vec<usize>,
    token: String,
}

impl From<RawRef> for ElementRef {
    fn from(raw: RawRef) -> Self {
        ElementRef::new(DocContext::frame(raw.frame_path), raw.token)
    }
}

/// 匿名 Image 加载的超时
const IMAGE_LOAD_TIMEOUT: Duration = Duration::from_secs(15);

/// CDP 页面表面
pub struct ChromeSurface {
    executor: Arc<JsExecutor>,
}

impl ChromeSurface {
    pub fn new(executor: Arc<JsExecutor>) -> Self {
        Self { executor }
    }

    fn element_args(element: &ElementRef) -> Vec<(&'static str, serde_json::Value)> {
        vec![
            ("framePath", json!(element.context.frame_path)),
            ("token", json!(element.token)),
        ]
    }

    /// 脚本返回 data URL 时解码为字节
    fn bytes_from_data_url(value: Option<String>) -> Option<Vec<u8>> {
        value
            .as_deref()
            .and_then(decode_data_url)
            .map(|(_, bytes)| bytes)
    }
}

#[async_trait]
impl PageSurface for ChromeSurface {
    async fn location(&self) -> Result<PageLocation> {
        self.executor
            .eval_as(scripts::sync_script(&[], scripts::LOCATION))
            .await
    }

    async fn is_foreground(&self) -> Result<bool> {
        self.executor
            .eval_as(scripts::sync_script(&[], scripts::VISIBILITY))
            .await
    }

    async fn contexts(&self) -> Result<Vec<DocContext>> {
        let paths: Vec<Vec<usize>> = self
            .executor
            .eval_as(scripts::sync_script(&[], scripts::CONTEXTS))
            .await?;
        Ok(paths.into_iter().map(DocContext::frame).collect())
    }

    async fn find_elements(&self, selector: &str, context: &DocContext) -> Result<Vec<ElementRef>> {
        let script = scripts::sync_script(
            &[
                ("framePath", json!(context.frame_path)),
                ("selector", json!(selector)),
            ],
            scripts::FIND,
        );
        let raw: Vec<RawRef> = self.executor.eval_as(script).await?;
        Ok(raw.into_iter().map(ElementRef::from).collect())
    }

    async fn describe(&self, element: &ElementRef) -> Result<ElementInfo> {
        let script = scripts::sync_script(&Self::element_args(element), scripts::DESCRIBE);
        self.executor.eval_as(script).await
    }

    async fn measure(&self, element: &ElementRef) -> Result<Geometry> {
        let script = scripts::sync_script(&Self::element_args(element), scripts::MEASURE);
        self.executor.eval_as(script).await
    }

    async fn container_geometry(&self, element: &ElementRef) -> Result<Option<Geometry>> {
        let script = scripts::sync_script(&Self::element_args(element), scripts::CONTAINER);
        self.executor.eval_as(script).await
    }

    async fn read_pixels(&self, element: &ElementRef) -> Result<Option<Vec<u8>>> {
        let script = scripts::sync_script(&Self::element_args(element), scripts::READ_PIXELS);
        let data_url: Option<String> = self.executor.eval_as(script).await?;
        if data_url.is_none() {
            debug!("元素 {} 像素不可读（画布被污染或未加载）", element.token);
        }
        Ok(Self::bytes_from_data_url(data_url))
    }

    async fn fetch_bytes(&self, address: &str, mode: FetchMode) -> Result<Option<Vec<u8>>> {
        let script = match mode {
            FetchMode::Credentialed => scripts::async_script(
                &[("address", json!(address))],
                scripts::FETCH_CREDENTIALED,
            ),
            FetchMode::AnonymousImage => scripts::async_script(
                &[
                    ("address", json!(address)),
                    ("timeoutMs", json!(IMAGE_LOAD_TIMEOUT.as_millis() as u64)),
                ],
                scripts::FETCH_ANONYMOUS_IMAGE,
            ),
        };
        let data_url: Option<String> = self.executor.eval_as(script).await?;
        Ok(Self::bytes_from_data_url(data_url))
    }

    async fn dispatch(&self, element: &ElementRef, event: PageEvent) -> Result<()> {
        let name = match event {
            PageEvent::Press => "press",
            PageEvent::Click => "click",
            PageEvent::Focus => "focus",
            PageEvent::Key(Key::Enter) => "enter",
        };
        let mut args = Self::element_args(element);
        args.push(("event", json!(name)));
        self.executor
            .eval(scripts::sync_script(&args, scripts::DISPATCH))
            .await?;
        Ok(())
    }

    async fn set_value(&self, element: &ElementRef, value: &str) -> Result<()> {
        let mut args = Self::element_args(element);
        args.push(("value", json!(value)));
        self.executor
            .eval(scripts::sync_script(&args, scripts::SET_VALUE))
            .await?;
        Ok(())
    }

    async fn read_value(&self, element: &ElementRef) -> Result<Option<String>> {
        let script = scripts::sync_script(&Self::element_args(element), scripts::READ_VALUE);
        self.executor.eval_as(script).await
    }

    async fn focused_element(&self) -> Result<Option<ElementRef>> {
        let raw: Option<RawRef> = self
            .executor
            .eval_as(scripts::sync_script(&[], scripts::FOCUSED))
            .await?;
        Ok(raw.map(ElementRef::from))
    }

    async fn text_content(&self, context: &DocContext) -> Result<String> {
        let script = scripts::sync_script(
            &[("framePath", json!(context.frame_path))],
            scripts::TEXT,
        );
        self.executor.eval_as(script).await
    }
}
