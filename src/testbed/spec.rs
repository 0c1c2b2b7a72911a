use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::net::HostId;
use crate::role::Role;

/// 从 JSON 读入的测试床描述
///
/// 主机编号是加上拓扑偏移之后的编号。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestbedSpec {
    pub hosts: Vec<HostSpec>,
    /// 测量流的收发两端，用来区分前向和反向流量
    #[serde(default)]
    pub pairs: Vec<PairSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostSpec {
    pub id: HostId,
    /// 管理地址（或主机名），命令经由它下发
    pub mip: String,
    /// 虚拟拓扑内使用的实验地址
    pub eip: Ipv4Addr,
    #[serde(default)]
    pub kind: NodeKind,
    #[serde(default)]
    pub roles: Vec<Role>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// 转发节点，建立整形层级
    #[default]
    Router,
    /// 流端点（旧配置里的 `src`/`dst`），只配路由，不整形
    #[serde(alias = "src", alias = "dst")]
    Endpoint,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PairSpec {
    pub src: HostId,
    pub dst: HostId,
}

impl TestbedSpec {
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}
