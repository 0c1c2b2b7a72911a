//! 标识符类型
//!
//! 定义虚拟拓扑中主机的唯一标识符。

use std::fmt;

use serde::{Deserialize, Serialize};

/// 主机标识符（已加上 offset 之后的编号）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostId(pub u32);

impl HostId {
    /// 在原始编号上叠加 offset；溢出时返回 None
    pub fn with_offset(raw: u32, offset: u32) -> Option<HostId> {
        raw.checked_add(offset).map(HostId)
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
