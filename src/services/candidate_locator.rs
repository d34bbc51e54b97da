//! 候选定位服务 - 业务能力层
//!
//! 在主文档和所有可访问 frame 中寻找答题卡图片，输出排好序的候选列表。
//! 空列表是正常结果，由调用方区别于“提取失败”处理。

use anyhow::Result;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::config::Thresholds;
use crate::infrastructure::{ElementInfo, ElementKind, ElementRef, Geometry, PageSurface};
use crate::models::candidate::{Candidate, DiscoveryReason};
use crate::models::platform::PlatformProfile;

/// 兜底扫描选择器
pub const HEURISTIC_SELECTOR: &str = "img, canvas, svg image";

/// 候选定位器
pub struct CandidateLocator {
    surface: Arc<dyn PageSurface>,
    thresholds: Thresholds,
}

impl CandidateLocator {
    pub fn new(surface: Arc<dyn PageSurface>, thresholds: Thresholds) -> Self {
        Self {
            surface,
            thresholds,
        }
    }

    /// 定位并排序，截取本轮要使用的候选
    pub async fn locate(&self, profile: &PlatformProfile) -> Result<Vec<Candidate>> {
        let ranked = self.rank_all(profile).await?;
        let selected = select_top(ranked, profile);
        debug!("[{}] 选定 {} 个候选", profile.label, selected.len());
        Ok(selected)
    }

    /// 是否已有可用的答题卡图片（不提取）
    pub async fn is_ready(&self, profile: &PlatformProfile) -> Result<bool> {
        Ok(!self.rank_all(profile).await?.is_empty())
    }

    /// 收集全部合格候选并排序
    pub async fn rank_all(&self, profile: &PlatformProfile) -> Result<Vec<Candidate>> {
        let discovered = self.discover(profile).await?;

        let mut candidates = Vec::with_capacity(discovered.len());
        for (element, reason) in discovered {
            if let Some(candidate) = self.evaluate(element, reason, profile).await {
                candidates.push(candidate);
            }
        }

        candidates.sort_by(|a, b| a.rank_cmp(b));
        Ok(candidates)
    }

    /// 先按平台选择器，再全量扫描；同一元素只保留第一次命中的原因
    async fn discover(
        &self,
        profile: &PlatformProfile,
    ) -> Result<Vec<(ElementRef, DiscoveryReason)>> {
        let contexts = self.surface.contexts().await?;
        let mut seen = HashSet::new();
        let mut discovered = Vec::new();

        let selectors = profile
            .image_selectors
            .iter()
            .map(|s| (s.as_str(), DiscoveryReason::Selector(s.clone())))
            .chain(std::iter::once((HEURISTIC_SELECTOR, DiscoveryReason::HeuristicScan)));

        for (selector, reason) in selectors {
            for context in &contexts {
                let found = match self.surface.find_elements(selector, context).await {
                    Ok(found) => found,
                    Err(e) => {
                        debug!("选择器 {} 在 frame {:?} 中查询失败: {}", selector, context.frame_path, e);
                        continue;
                    }
                };
                for element in found {
                    if seen.insert(element.clone()) {
                        discovered.push((element, reason.clone()));
                    }
                }
            }
        }

        Ok(discovered)
    }

    async fn evaluate(
        &self,
        element: ElementRef,
        reason: DiscoveryReason,
        profile: &PlatformProfile,
    ) -> Option<Candidate> {
        let info = match self.surface.describe(&element).await {
            Ok(info) => info,
            Err(e) => {
                debug!("读取元素 {} 失败: {}", element.token, e);
                return None;
            }
        };

        if !is_image_bearing(&info) {
            return None;
        }

        let geometry = self.resolve_geometry(&element, &info).await?;
        if !self.is_large_enough(&geometry) {
            return None;
        }

        let trusted = info
            .source
            .as_deref()
            .map(|s| profile.is_trusted_source(s))
            .unwrap_or(false);

        Some(Candidate {
            element,
            kind: info.kind,
            geometry,
            reason,
            priority: info.kind.into(),
            trusted,
            source: info.source,
        })
    }

    /// 渲染尺寸 → 属性声明尺寸 → 父容器尺寸，都拿不到则放弃
    async fn resolve_geometry(&self, element: &ElementRef, info: &ElementInfo) -> Option<Geometry> {
        let measured = self.surface.measure(element).await.ok();
        if let Some(geometry) = measured.filter(Geometry::is_measurable) {
            return Some(geometry);
        }

        let anchor = measured.unwrap_or_default();
        if let (Some(width), Some(height)) = (info.declared_width, info.declared_height) {
            return Some(Geometry::new(anchor.top, anchor.left, width, height));
        }

        match self.surface.container_geometry(element).await {
            Ok(Some(geometry)) if geometry.is_measurable() => Some(geometry),
            _ => {
                debug!("元素 {} 无法确定尺寸，跳过", element.token);
                None
            }
        }
    }

    fn is_large_enough(&self, geometry: &Geometry) -> bool {
        geometry.width >= self.thresholds.min_candidate_width
            && geometry.height >= self.thresholds.min_candidate_height
    }
}

/// 画布总是可用；其余类型必须能解析出图片地址
fn is_image_bearing(info: &ElementInfo) -> bool {
    match info.kind {
        ElementKind::Canvas => true,
        ElementKind::Image | ElementKind::SvgImage | ElementKind::Container => info
            .source
            .as_deref()
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false),
        _ => false,
    }
}

/// 按平台上限截取；多图时只保留面积不低于首位一定比例的候选
pub fn select_top(ranked: Vec<Candidate>, profile: &PlatformProfile) -> Vec<Candidate> {
    let Some(top_area) = ranked.first().map(Candidate::area) else {
        return ranked;
    };
    let limit = profile.max_candidates.max(1);
    let min_area = top_area * profile.merge_area_ratio;

    ranked
        .into_iter()
        .enumerate()
        .filter(|(i, c)| *i == 0 || c.area() >= min_area)
        .map(|(_, c)| c)
        .take(limit)
        .collect()
}
