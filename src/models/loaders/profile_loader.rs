use crate::models::platform::{PlatformId, PlatformProfile};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tokio::fs;

/// 配置文件结构
#[derive(Debug, Deserialize)]
struct ProfileFile {
    #[serde(default)]
    profiles: Vec<PlatformProfile>,
}

/// 内置配置 + 文件覆盖
///
/// 文件中出现的平台整体替换同 id 的内置配置。
pub fn load_profiles_from_str(content: &str) -> Result<Vec<PlatformProfile>> {
    let file: ProfileFile = toml::from_str(content).context("无法解析平台配置")?;

    let mut profiles: Vec<PlatformProfile> = PlatformId::all()
        .into_iter()
        .map(PlatformProfile::builtin)
        .collect();

    for custom in file.profiles {
        tracing::info!("使用自定义平台配置: {}", custom.label);
        match profiles.iter_mut().find(|p| p.id == custom.id) {
            Some(existing) => *existing = custom,
            None => profiles.push(custom),
        }
    }

    Ok(profiles)
}

/// 从 TOML 文件加载平台配置；未指定文件时只返回内置配置
pub async fn load_profiles(path: Option<&Path>) -> Result<Vec<PlatformProfile>> {
    let Some(path) = path else {
        return load_profiles_from_str("");
    };

    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("无法读取平台配置文件: {}", path.display()))?;

    load_profiles_from_str(&content)
        .with_context(|| format!("无法解析平台配置文件: {}", path.display()))
}
