//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责资源持有与对外协议，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `app` - 应用生命周期
//! - 连接浏览器、创建 JsExecutor 与 ChromeSurface
//! - 按配置选择评分后端
//! - 在 stdin/stdout 上运行 JSON 行协议，转发循环推送
//!
//! ### `host_bridge` - 控制端协议
//! - 请求/响应的 serde 定义
//! - 把请求分发给 LoopController、Scanner、ScoreWriter
//!
//! ## 层次关系
//!
//! ```text
//! app (持有 Browser)
//!     ↓
//! host_bridge (协议分发)
//!     ↓
//! workflow::LoopController (阅卷循环)
//!     ↓
//! services (能力层：定位 / 提取 / 写分)
//!     ↓
//! infrastructure (基础设施：PageSurface / JsExecutor)
//! ```

pub mod app;
pub mod host_bridge;

pub use app::App;
pub use host_bridge::{HostBridge, HostCommand, HostReply, HostRequest, HostResponse};
