//! data URL 编解码

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// 解析 `data:<mime>;base64,<payload>`，返回 (mime, bytes)
///
/// 非 base64 的 data URL 与格式错误的输入返回 `None`。
pub fn decode_data_url(data_url: &str) -> Option<(String, Vec<u8>)> {
    let rest = data_url.strip_prefix("data:")?;
    let (meta, payload) = rest.split_once(',')?;
    let mime = meta.strip_suffix(";base64")?;
    let bytes = STANDARD.decode(payload.trim()).ok()?;
    let mime = if mime.is_empty() {
        "application/octet-stream".to_string()
    } else {
        mime.to_string()
    };
    Some((mime, bytes))
}

pub fn encode_data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_png_data_url() {
        let (mime, bytes) = decode_data_url("data:image/png;base64,iVBORw0K").unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(&bytes[1..4], b"PNG");
    }

    #[test]
    fn test_rejects_non_base64() {
        assert!(decode_data_url("data:text/plain,hello").is_none());
        assert!(decode_data_url("https://example.com/a.png").is_none());
    }

    #[test]
    fn test_encode_matches_decode() {
        let url = encode_data_url("image/jpeg", &[1, 2, 3, 250]);
        assert_eq!(decode_data_url(&url).unwrap().1, vec![1, 2, 3, 250]);
    }
}
