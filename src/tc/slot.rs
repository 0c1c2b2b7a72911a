//! HTB class 编号
//!
//! 每台主机的 class 按槽位依次编号：先是各邻居链路（按主机编号升序），
//! 再是反向、前向两个方向 class。单拓扑时槽位 `i` 对应 `1:i`，叶子句柄 `i0:`；
//! 多拓扑时所有编号都挂在父编号 `p` 之下，`minor = p * 100 + i`。

use crate::net::{HostId, LinkSpec};

/// 单拓扑根队列的默认 class
const SINGLE_DEFAULT_CLASS: u32 = 100;
/// 多拓扑根队列的默认 class
const MULTI_DEFAULT_CLASS: u32 = 1100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TopologyMode {
    #[default]
    Single,
    /// 同一物理网卡上叠加多套拓扑，`parent` 取自接口名的数字后缀加一
    Multi { parent: u32 },
}

impl TopologyMode {
    /// 按接口名推断父编号：`eth0` -> 1，`ens3` -> 4。没有数字后缀时返回 `None`。
    pub fn multi_for_iface(iface: &str) -> Option<Self> {
        let prefix = iface.trim_end_matches(|c: char| c.is_ascii_digit());
        let digits = &iface[prefix.len()..];
        let n: u32 = digits.parse().ok()?;
        Some(Self::Multi { parent: n.checked_add(1)? })
    }

    pub fn is_multi(self) -> bool {
        matches!(self, Self::Multi { .. })
    }

    fn minor(self, index: u32) -> u32 {
        match self {
            Self::Single => index,
            Self::Multi { parent } => parent * 100 + index,
        }
    }

    pub fn default_class(self) -> u32 {
        match self {
            Self::Single => SINGLE_DEFAULT_CLASS,
            Self::Multi { .. } => MULTI_DEFAULT_CLASS,
        }
    }

    /// `1:minor`
    pub fn class_id(self, index: u32) -> String {
        format!("1:{}", self.minor(index))
    }

    /// 叶子队列句柄
    pub fn leaf_handle(self, index: u32) -> String {
        match self {
            Self::Single => format!("{index}0:"),
            Self::Multi { .. } => format!("{}:", self.minor(index)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SlotKind {
    /// 到某邻居的链路整形
    Peer(HostId),
    /// 测量流的 ACK 方向
    Reverse,
    /// 测量流的数据方向
    Forward,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassSlot {
    pub index: u32,
    pub kind: SlotKind,
    pub rate_mbit: f64,
}

/// 链路 netem 的参数串，例如 `limit 50 delay 10ms drop 1%`
pub(crate) fn link_netem_args(spec: &LinkSpec) -> String {
    let mut parts = Vec::new();
    if let Some(limit) = spec.limit {
        parts.push(format!("limit {limit}"));
    }
    if let Some(delay) = spec.delay {
        parts.push(format!("delay {delay}ms"));
    }
    if let Some(loss) = spec.loss {
        parts.push(format!("drop {loss}%"));
    }
    parts.join(" ")
}
