use crate::utils::data_url::encode_data_url;

/// 本轮选定的答题卡图像
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub mime: String,
    pub width: u32,
    pub height: u32,
    /// 参与合并的候选数量
    pub source_count: usize,
}

impl Artifact {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn to_data_url(&self) -> String {
        encode_data_url(&self.mime, &self.bytes)
    }
}

/// 答题卡签名，仅用于判等
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(pub String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // 日志里只显示前一段
        let preview: String = self.0.chars().take(24).collect();
        write!(f, "{}", preview)
    }
}
