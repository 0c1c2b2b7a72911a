//! 拓扑可视化
//!
//! - DOT 文本，可直接交给 `dot`/`graph-easy` 渲染
//! - JSON 视图，包含主机、角色和各有向边的链路参数

mod dot;
mod view;

pub use dot::to_dot;
pub use view::{TopologyView, VizHost, VizLink};
