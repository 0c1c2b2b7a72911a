//! 主机角色标签
//!
//! 外部配置为每台主机指定若干角色，决定 SHAPED 阶段在它上面施加哪些 netem 参数。
//! 用位集合表示，在加载配置时即完成校验。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// 瓶颈带宽 + 队列长度
    #[serde(alias = "qlnode")]
    QueueLimit,
    /// 前向路径时延
    #[serde(alias = "fdnode")]
    ForwardDelay,
    /// 前向路径乱序
    #[serde(alias = "frnode")]
    ForwardReorder,
    /// 反向路径时延
    #[serde(alias = "rdnode")]
    ReverseDelay,
    /// 反向路径（ACK）乱序
    #[serde(alias = "rrnode")]
    ReverseReorder,
    /// ACK 丢包
    #[serde(alias = "alnode")]
    AckLoss,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::QueueLimit,
        Role::ForwardDelay,
        Role::ForwardReorder,
        Role::ReverseDelay,
        Role::ReverseReorder,
        Role::AckLoss,
    ];

    const fn bit(self) -> u8 {
        1 << self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Role::QueueLimit => "queue_limit",
            Role::ForwardDelay => "forward_delay",
            Role::ForwardReorder => "forward_reorder",
            Role::ReverseDelay => "reverse_delay",
            Role::ReverseReorder => "reverse_reorder",
            Role::AckLoss => "ack_loss",
        }
    }

    /// 配置文件里的短标签
    pub fn tag(self) -> &'static str {
        match self {
            Role::QueueLimit => "qlnode",
            Role::ForwardDelay => "fdnode",
            Role::ForwardReorder => "frnode",
            Role::ReverseDelay => "rdnode",
            Role::ReverseReorder => "rrnode",
            Role::AckLoss => "alnode",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role tag `{0}`")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.tag() == s || r.name() == s)
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

/// 角色位集合
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RoleSet(u8);

impl RoleSet {
    pub const EMPTY: RoleSet = RoleSet(0);

    pub fn insert(&mut self, role: Role) {
        self.0 |= role.bit();
    }

    pub fn with(mut self, role: Role) -> Self {
        self.insert(role);
        self
    }

    pub fn contains(self, role: Role) -> bool {
        self.0 & role.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Role> {
        Role::ALL.into_iter().filter(move |r| self.contains(*r))
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<T: IntoIterator<Item = Role>>(iter: T) -> Self {
        iter.into_iter().fold(RoleSet::EMPTY, RoleSet::with)
    }
}

impl fmt::Display for RoleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tags: Vec<&str> = self.iter().map(Role::tag).collect();
        write!(f, "{{{}}}", tags.join(","))
    }
}
