//! 网络模型
//!
//! 主机编号、可达图、链路参数以及图上的路径查询。

mod graph;
mod id;
mod link;
mod routing;

pub use graph::ReachabilityGraph;
pub use id::HostId;
pub use link::{LinkSpec, LinkTable, fmt_rate};
pub use routing::{RouteCandidate, equal_cost_paths, hop_distance, shortest_path};
