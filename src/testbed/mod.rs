//! 测试床配置
//!
//! 主机的管理地址、实验地址、角色以及测量流端点。本 crate 只消费解析好的结果，
//! 配置文件格式为 JSON。

mod resolve;
mod spec;

pub use resolve::{ConfigError, FlowPair, HostEntry, Testbed};
pub use spec::{HostSpec, NodeKind, PairSpec, TestbedSpec};
