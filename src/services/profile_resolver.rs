//! 平台识别服务 - 业务能力层
//!
//! 根据页面地址与页面特征，返回唯一的平台配置。纯分类，不发网络请求。

use tracing::debug;

use crate::infrastructure::page_surface::{find_everywhere, PageSurface};
use crate::models::platform::{PlatformId, PlatformProfile};

/// 平台识别
#[derive(Debug, Clone)]
pub struct ProfileResolver {
    profiles: Vec<PlatformProfile>,
}

impl ProfileResolver {
    /// 使用给定配置集合；缺少通用配置时自动补上
    pub fn new(mut profiles: Vec<PlatformProfile>) -> Self {
        if !profiles.iter().any(|p| p.id == PlatformId::Generic) {
            profiles.push(PlatformProfile::generic());
        }
        Self { profiles }
    }

    pub fn builtin() -> Self {
        Self::new(
            PlatformId::all()
                .into_iter()
                .map(PlatformProfile::builtin)
                .collect(),
        )
    }

    pub fn profile(&self, id: PlatformId) -> PlatformProfile {
        self.profiles
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .unwrap_or_else(|| PlatformProfile::builtin(id))
    }

    /// 只按 host 分类
    pub fn classify_host(&self, host: &str) -> Option<PlatformId> {
        self.profiles
            .iter()
            .filter(|p| p.id != PlatformId::Generic)
            .find(|p| p.matches_host(host))
            .map(|p| p.id)
    }

    /// 识别当前页面所属平台
    ///
    /// 先看 host，再看页面特征；任何页面通信失败都退回通用配置。
    pub async fn resolve(&self, surface: &dyn PageSurface) -> PlatformProfile {
        let host = match surface.location().await {
            Ok(location) => location.host,
            Err(e) => {
                debug!("读取页面地址失败，使用通用配置: {}", e);
                return self.profile(PlatformId::Generic);
            }
        };

        if let Some(id) = self.classify_host(&host) {
            return self.profile(id);
        }

        for profile in self.profiles.iter().filter(|p| p.id != PlatformId::Generic) {
            for signature in &profile.markup_signatures {
                match find_everywhere(surface, signature).await {
                    Ok(found) if !found.is_empty() => {
                        debug!("页面特征 {} 命中平台 {}", signature, profile.label);
                        return profile.clone();
                    }
                    Ok(_) => {}
                    Err(e) => debug!("页面特征探测失败 ({}): {}", signature, e),
                }
            }
        }

        self.profile(PlatformId::Generic)
    }
}

impl Default for ProfileResolver {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_known_hosts() {
        let resolver = ProfileResolver::builtin();
        assert_eq!(resolver.classify_host("www.zhixue.com"), Some(PlatformId::Zhixue));
        assert_eq!(resolver.classify_host("mark.yunxiao.com"), Some(PlatformId::Haofenshu));
        assert_eq!(resolver.classify_host("pj.7net.cc"), Some(PlatformId::Qitian));
        assert_eq!(resolver.classify_host("example.org"), None);
    }

    #[test]
    fn test_generic_is_always_available() {
        let resolver = ProfileResolver::new(vec![PlatformProfile::builtin(PlatformId::Zhixue)]);
        assert_eq!(resolver.profile(PlatformId::Generic).id, PlatformId::Generic);
    }
}
