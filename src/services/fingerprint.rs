//! 答题卡签名
//!
//! 用“长度 + 内容前缀”判断页面是否已切换到下一份答题卡。只用于判等，不做安全用途。

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::models::artifact::Fingerprint;

/// 参与签名的前缀字节数
pub const PREFIX_BYTES: usize = 96;

/// 计算签名；小于 `min_bytes` 的图像视为未加载完成，返回 `None`
pub fn fingerprint(bytes: &[u8], min_bytes: usize) -> Option<Fingerprint> {
    if bytes.is_empty() || bytes.len() < min_bytes {
        return None;
    }
    let prefix = &bytes[..bytes.len().min(PREFIX_BYTES)];
    Some(Fingerprint(format!("{}:{}", bytes.len(), STANDARD.encode(prefix))))
}

/// 与上一轮签名相同
pub fn is_unchanged(previous: Option<&Fingerprint>, current: &Fingerprint) -> bool {
    previous == Some(current)
}
