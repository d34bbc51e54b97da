//! 图像后处理：多图纵向拼接与超限压缩

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;
use tracing::debug;

/// 逐级压缩参数：(缩放比例, JPEG 质量)
const COMPRESSION_STEPS: [(f64, u8); 3] = [(0.85, 80), (0.7, 70), (0.55, 60)];

/// 编码后的图像
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub mime: String,
    pub width: u32,
    pub height: u32,
}

pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes).context("无法解码图片数据")
}

/// 文件头是否为可识别的图片格式
pub fn is_image(bytes: &[u8]) -> bool {
    image::guess_format(bytes).is_ok()
}

/// 根据文件头判断 mime
pub fn sniff_mime(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => "image/png",
        Ok(ImageFormat::Jpeg) => "image/jpeg",
        Ok(ImageFormat::Gif) => "image/gif",
        Ok(ImageFormat::WebP) => "image/webp",
        Ok(ImageFormat::Bmp) => "image/bmp",
        _ => "application/octet-stream",
    }
}

/// 纵向拼接，统一缩放到最宽图的宽度（不超过 `max_width`）
pub fn merge_vertical(images: &[DynamicImage], max_width: u32) -> Option<DynamicImage> {
    let widest = images.iter().map(|img| img.width()).max()?;
    let target_width = widest.min(max_width.max(1));

    let scaled: Vec<DynamicImage> = images
        .iter()
        .filter(|img| img.width() > 0 && img.height() > 0)
        .map(|img| {
            if img.width() == target_width {
                img.clone()
            } else {
                let height = (img.height() as f64 * target_width as f64 / img.width() as f64)
                    .round()
                    .max(1.0) as u32;
                img.resize_exact(target_width, height, FilterType::Triangle)
            }
        })
        .collect();

    let total_height: u32 = scaled.iter().map(|img| img.height()).sum();
    if total_height == 0 {
        return None;
    }

    let mut canvas = RgbaImage::from_pixel(target_width, total_height, Rgba([255, 255, 255, 255]));
    let mut offset = 0i64;
    for img in &scaled {
        imageops::overlay(&mut canvas, &img.to_rgba8(), 0, offset);
        offset += img.height() as i64;
    }

    Some(DynamicImage::ImageRgba8(canvas))
}

pub fn encode_png(img: &DynamicImage) -> Result<EncodedImage> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .context("PNG 编码失败")?;
    let (width, height) = img.dimensions();
    Ok(EncodedImage {
        bytes,
        mime: "image/png".to_string(),
        width,
        height,
    })
}

pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<EncodedImage> {
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut bytes = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut bytes, quality))
        .context("JPEG 编码失败")?;
    let (width, height) = rgb.dimensions();
    Ok(EncodedImage {
        bytes,
        mime: "image/jpeg".to_string(),
        width,
        height,
    })
}

/// 体积超过阈值时逐级降低分辨率与质量，直到不超过阈值或用尽级数
pub fn compress_to_fit(img: &DynamicImage, encoded: EncodedImage, threshold: usize) -> Result<EncodedImage> {
    if encoded.bytes.len() <= threshold {
        return Ok(encoded);
    }

    let original_len = encoded.bytes.len();
    let mut best = encoded;
    for (scale, quality) in COMPRESSION_STEPS {
        let width = ((img.width() as f64) * scale).round().max(1.0) as u32;
        let height = ((img.height() as f64) * scale).round().max(1.0) as u32;
        let resized = img.resize(width, height, FilterType::Triangle);
        let candidate = encode_jpeg(&resized, quality)?;
        debug!(
            "压缩 {}x{} q{}: {} → {} 字节",
            width,
            height,
            quality,
            original_len,
            candidate.bytes.len()
        );
        let fits = candidate.bytes.len() <= threshold;
        if candidate.bytes.len() < best.bytes.len() {
            best = candidate;
        }
        if fits {
            break;
        }
    }

    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, shade: u8) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([shade, shade, shade, 255])))
    }

    fn noisy(width: u32, height: u32) -> DynamicImage {
        let img = RgbaImage::from_fn(width, height, |x, y| {
            let mut h = x.wrapping_mul(0x9E37_79B1) ^ y.wrapping_mul(0x85EB_CA77);
            h ^= h >> 15;
            h = h.wrapping_mul(0x2C1B_3C6D);
            h ^= h >> 12;
            let [r, g, b, _] = h.to_le_bytes();
            Rgba([r, g, b, 255])
        });
        DynamicImage::ImageRgba8(img)
    }

    #[test]
    fn test_merge_scales_to_common_width() {
        let merged = merge_vertical(&[solid(400, 100, 0), solid(200, 100, 200)], 2000).unwrap();
        assert_eq!(merged.width(), 400);
        assert_eq!(merged.height(), 300);
        // 第二张被放大到 400 宽，颜色保留在下半部分
        assert!(merged.get_pixel(10, 250)[0] >= 190);
        assert!(merged.get_pixel(10, 50)[0] <= 10);
    }

    #[test]
    fn test_merge_respects_max_width() {
        let merged = merge_vertical(&[solid(3000, 300, 10)], 1500).unwrap();
        assert_eq!(merged.width(), 1500);
        assert_eq!(merged.height(), 150);
    }

    #[test]
    fn test_compress_shrinks_large_images() {
        let img = noisy(600, 600);
        let png = encode_png(&img).unwrap();
        let threshold = png.bytes.len() / 4;
        let compressed = compress_to_fit(&img, png.clone(), threshold).unwrap();
        assert!(compressed.bytes.len() < png.bytes.len());
        assert_eq!(compressed.mime, "image/jpeg");
        assert!(compressed.width < 600);
    }

    #[test]
    fn test_compress_keeps_small_images() {
        let img = solid(50, 50, 128);
        let png = encode_png(&img).unwrap();
        let len = png.bytes.len();
        let kept = compress_to_fit(&img, png, len + 1).unwrap();
        assert_eq!(kept.bytes.len(), len);
        assert_eq!(kept.mime, "image/png");
    }

    #[test]
    fn test_sniff_mime() {
        let png = encode_png(&solid(4, 4, 0)).unwrap();
        assert_eq!(sniff_mime(&png.bytes), "image/png");
        assert_eq!(sniff_mime(b"not an image"), "application/octet-stream");
    }
}
