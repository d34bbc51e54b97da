//! 图像提取服务 - 业务能力层
//!
//! 把候选元素变成图像字节：画布直接读像素，已加载的 img 先画到离屏画布，
//! 读不到（跨域污染）再按“带 cookie 的 fetch → 匿名 Image”的顺序重新拉取。

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::Thresholds;
use crate::error::ScanError;
use crate::infrastructure::{ElementKind, FetchMode, PageSurface};
use crate::models::artifact::Artifact;
use crate::models::candidate::Candidate;
use crate::models::platform::PlatformProfile;
use crate::services::image_processing::{self, EncodedImage};
use crate::utils::data_url::decode_data_url;

/// 防缓存参数名
pub const CACHE_BUSTER_PARAM: &str = "_amk";

/// 重新拉取的尝试顺序
const REFETCH_LADDER: [FetchMode; 2] = [FetchMode::Credentialed, FetchMode::AnonymousImage];

/// 图像提取器
pub struct ImageExtractor {
    surface: Arc<dyn PageSurface>,
    thresholds: Thresholds,
}

impl ImageExtractor {
    pub fn new(surface: Arc<dyn PageSurface>, thresholds: Thresholds) -> Self {
        Self {
            surface,
            thresholds,
        }
    }

    /// 提取单个候选，失败返回 `None`（调用方按可重试处理）
    pub async fn extract(&self, candidate: &Candidate) -> Option<Vec<u8>> {
        match candidate.kind {
            ElementKind::Canvas => self.read_in_page(candidate).await,
            ElementKind::Image => {
                if let Some(bytes) = self.read_in_page(candidate).await {
                    return Some(bytes);
                }
                debug!("img 无法在页面内读取，改为重新拉取");
                self.refetch_source(candidate).await
            }
            ElementKind::SvgImage | ElementKind::Container => self.refetch_source(candidate).await,
            _ => None,
        }
    }

    async fn read_in_page(&self, candidate: &Candidate) -> Option<Vec<u8>> {
        match self.surface.read_pixels(&candidate.element).await {
            Ok(Some(bytes)) if !bytes.is_empty() => Some(bytes),
            Ok(_) => None,
            Err(e) => {
                warn!("读取像素失败: {}", e);
                None
            }
        }
    }

    async fn refetch_source(&self, candidate: &Candidate) -> Option<Vec<u8>> {
        match candidate.source.as_deref() {
            Some(address) => self.refetch(address).await,
            None => None,
        }
    }

    /// 重新拉取图片地址
    ///
    /// 两种方式依次尝试，每次都带上不同的防缓存标记。拿到的内容不是图片
    /// （登录页、错误页）视为该方式失败，继续下一种；全部失败返回 `None`。
    pub async fn refetch(&self, address: &str) -> Option<Vec<u8>> {
        if address.starts_with("data:") {
            return decode_data_url(address).map(|(_, bytes)| bytes);
        }

        let stamp = Utc::now().timestamp_millis();
        for (attempt, mode) in REFETCH_LADDER.into_iter().enumerate() {
            let url = cache_bust(address, &format!("{}-{}", stamp, attempt + 1));
            match self.surface.fetch_bytes(&url, mode).await {
                Ok(Some(bytes)) if image_processing::is_image(&bytes) => {
                    debug!("通过 {:?} 拉取成功: {} 字节", mode, bytes.len());
                    return Some(bytes);
                }
                Ok(Some(bytes)) if !bytes.is_empty() => {
                    debug!("通过 {:?} 拉取到 {} 字节非图片内容", mode, bytes.len())
                }
                Ok(_) => debug!("通过 {:?} 拉取失败", mode),
                Err(e) => debug!("通过 {:?} 拉取出错: {}", mode, e),
            }
        }

        warn!("图片地址无法获取: {}", address);
        None
    }

    /// 提取本轮候选并合成为一份答题卡图像
    ///
    /// 首位候选失败即整体失败；其余候选失败时忽略。
    pub async fn extract_artifact(
        &self,
        candidates: &[Candidate],
        profile: &PlatformProfile,
    ) -> Result<Artifact, ScanError> {
        let Some(first) = candidates.first() else {
            return Err(ScanError::NoCandidate);
        };

        let mut raw_images = Vec::with_capacity(candidates.len());
        for (index, candidate) in candidates.iter().enumerate() {
            match self.extract(candidate).await {
                Some(bytes) => raw_images.push(bytes),
                None if index == 0 => {
                    return Err(ScanError::ExtractFailed(format!(
                        "{:?} 元素 {} 无法读取",
                        first.kind, first.element.token
                    )));
                }
                None => debug!("附加候选 {} 提取失败，忽略", candidate.element.token),
            }
        }

        let min_bytes = self.thresholds.min_artifact_bytes;
        if raw_images.len() == 1 && raw_images[0].len() < min_bytes {
            return Err(ScanError::ArtifactTooSmall(raw_images[0].len()));
        }

        let threshold = profile.compress_threshold_bytes;
        let max_width = self.thresholds.merge_max_width;
        let processed = tokio::task::spawn_blocking(move || {
            post_process(raw_images, threshold, max_width)
        })
        .await
        .map_err(|e| ScanError::ExtractFailed(format!("图像处理任务异常: {}", e)))??;

        if processed.bytes.len() < min_bytes {
            return Err(ScanError::ArtifactTooSmall(processed.bytes.len()));
        }

        let source_count = processed.source_count;
        if source_count > 1 {
            info!("🧩 已合并 {} 张答题卡图片", source_count);
        }

        Ok(Artifact {
            bytes: processed.bytes,
            mime: processed.mime,
            width: processed.width,
            height: processed.height,
            source_count,
        })
    }
}

struct Processed {
    bytes: Vec<u8>,
    mime: String,
    width: u32,
    height: u32,
    source_count: usize,
}

/// 解码、合并、压缩（在阻塞线程中执行）
fn post_process(
    raw_images: Vec<Vec<u8>>,
    threshold: usize,
    max_width: u32,
) -> Result<Processed, ScanError> {
    let mut decoded = Vec::with_capacity(raw_images.len());
    let mut kept_raw = Vec::with_capacity(raw_images.len());
    for (index, bytes) in raw_images.into_iter().enumerate() {
        match image_processing::decode(&bytes) {
            Ok(img) => {
                decoded.push(img);
                kept_raw.push(bytes);
            }
            Err(e) if index == 0 => return Err(ScanError::ExtractFailed(e.to_string())),
            Err(e) => debug!("附加图片无法解码，忽略: {}", e),
        }
    }

    let source_count = decoded.len();
    let (image, encoded) = if source_count == 1 {
        let img = decoded.remove(0);
        let bytes = kept_raw.remove(0);
        let encoded = EncodedImage {
            mime: image_processing::sniff_mime(&bytes).to_string(),
            width: img.width(),
            height: img.height(),
            bytes,
        };
        (img, encoded)
    } else {
        let merged = image_processing::merge_vertical(&decoded, max_width)
            .ok_or_else(|| ScanError::ExtractFailed("合并后的图像为空".to_string()))?;
        let encoded = image_processing::encode_png(&merged)
            .map_err(|e| ScanError::ExtractFailed(e.to_string()))?;
        (merged, encoded)
    };

    let encoded = image_processing::compress_to_fit(&image, encoded, threshold)
        .map_err(|e| ScanError::ExtractFailed(e.to_string()))?;

    Ok(Processed {
        bytes: encoded.bytes,
        mime: encoded.mime,
        width: encoded.width,
        height: encoded.height,
        source_count,
    })
}

/// 追加防缓存参数；blob 地址原样返回
pub fn cache_bust(address: &str, stamp: &str) -> String {
    if address.starts_with("blob:") || address.starts_with("data:") {
        return address.to_string();
    }

    let (base, fragment) = match address.split_once('#') {
        Some((base, fragment)) => (base, Some(fragment)),
        None => (address, None),
    };
    let separator = if base.contains('?') { '&' } else { '?' };
    let mut busted = format!("{}{}{}={}", base, separator, CACHE_BUSTER_PARAM, stamp);
    if let Some(fragment) = fragment {
        busted.push('#');
        busted.push_str(fragment);
    }
    busted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_bust_appends_param() {
        assert_eq!(
            cache_bust("https://img.zhixue.com/a.png", "1"),
            "https://img.zhixue.com/a.png?_amk=1"
        );
        assert_eq!(
            cache_bust("https://img.zhixue.com/a.png?w=100#top", "2"),
            "https://img.zhixue.com/a.png?w=100&_amk=2#top"
        );
    }

    #[test]
    fn test_cache_bust_skips_blob() {
        let blob = "blob:https://mark.yunxiao.com/6c1f";
        assert_eq!(cache_bust(blob, "1"), blob);
    }
}
