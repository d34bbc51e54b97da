use serde::Serialize;
use std::cmp::Ordering;

use crate::infrastructure::{ElementKind, ElementRef, Geometry};

/// 候选元素的发现方式
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DiscoveryReason {
    /// 命中平台配置中的选择器
    Selector(String),
    /// 兜底的全量扫描
    HeuristicScan,
}

/// 类型优先级，数值越小越靠前
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum TypePriority {
    Media = 0,
    Container = 1,
}

impl From<ElementKind> for TypePriority {
    fn from(kind: ElementKind) -> Self {
        if kind.is_media() {
            TypePriority::Media
        } else {
            TypePriority::Container
        }
    }
}

/// 候选答题卡元素
///
/// 每轮扫描重新生成，扫描结束即丢弃。
#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    pub element: ElementRef,
    pub kind: ElementKind,
    pub geometry: Geometry,
    pub reason: DiscoveryReason,
    pub priority: TypePriority,
    /// 图片地址命中平台可信图床
    pub trusted: bool,
    pub source: Option<String>,
}

impl Candidate {
    pub fn area(&self) -> f64 {
        self.geometry.area()
    }

    /// 排序规则：可信图床 → 媒体类型 → 靠上 → 面积大
    pub fn rank_cmp(&self, other: &Candidate) -> Ordering {
        other
            .trusted
            .cmp(&self.trusted)
            .then(self.priority.cmp(&other.priority))
            .then(
                self.geometry
                    .top
                    .partial_cmp(&other.geometry.top)
                    .unwrap_or(Ordering::Equal),
            )
            .then(
                other
                    .area()
                    .partial_cmp(&self.area())
                    .unwrap_or(Ordering::Equal),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::DocContext;

    fn candidate(token: &str, kind: ElementKind, trusted: bool, geometry: Geometry) -> Candidate {
        Candidate {
            element: ElementRef::new(DocContext::main(), token),
            kind,
            geometry,
            reason: DiscoveryReason::HeuristicScan,
            priority: kind.into(),
            trusted,
            source: None,
        }
    }

    #[test]
    fn test_trusted_ranks_before_higher_media() {
        let mut list = vec![
            candidate("a", ElementKind::Image, false, Geometry::new(0.0, 0.0, 800.0, 600.0)),
            candidate("b", ElementKind::Container, true, Geometry::new(500.0, 0.0, 400.0, 300.0)),
        ];
        list.sort_by(|a, b| a.rank_cmp(b));
        assert_eq!(list[0].element.token, "b");
    }

    #[test]
    fn test_media_before_container_then_top_then_area() {
        let mut list = vec![
            candidate("div", ElementKind::Container, false, Geometry::new(0.0, 0.0, 900.0, 900.0)),
            candidate("low", ElementKind::Image, false, Geometry::new(300.0, 0.0, 900.0, 900.0)),
            candidate("small", ElementKind::Canvas, false, Geometry::new(100.0, 0.0, 200.0, 200.0)),
            candidate("big", ElementKind::SvgImage, false, Geometry::new(100.0, 0.0, 400.0, 400.0)),
        ];
        list.sort_by(|a, b| a.rank_cmp(b));
        let order: Vec<_> = list.iter().map(|c| c.element.token.as_str()).collect();
        assert_eq!(order, vec!["big", "small", "low", "div"]);
    }
}
