//! # Auto Mark Submit
//!
//! 通过 CDP 连接阅卷页面，自动提取答题卡图片、调用评分服务并把分数写回页面。
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（Page），只暴露能力
//! - `PageSurface` - 所有算法只通过这个 trait 访问页面
//! - `JsExecutor` - 唯一的 page owner，提供 eval() 能力
//!
//! ### ② 业务能力层（Services / Clients）
//! - `ProfileResolver` - 识别阅卷平台
//! - `CandidateLocator` / `ImageExtractor` - 找到并读出答题卡图片
//! - `ScoreWriter` - 把分数写回页面
//! - `ScoringClient` - 评分服务（HTTP 或多模态模型）
//!
//! ### ③ 流程层（Workflow）
//! - `Scanner` - 一次完整扫描（识别 → 定位 → 提取）
//! - `LoopController` - 自动阅卷状态机
//! - `Pacer` - 节奏与随机化
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/app` - 连接浏览器，运行控制端协议
//! - `orchestrator/host_bridge` - 请求分发
//!
//! ## 模块结构

pub mod browser;
pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod logger;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use infrastructure::{JsExecutor, PageSurface};
pub use orchestrator::App;
pub use workflow::LoopController;
