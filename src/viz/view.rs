use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::net::{HostId, LinkSpec};
use crate::role::Role;
use crate::testbed::{NodeKind, Testbed};
use crate::topo::Topology;

/// 拓扑的 JSON 视图，供离线页面渲染
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologyView {
    pub hosts: Vec<VizHost>,
    pub links: Vec<VizLink>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VizHost {
    pub id: HostId,
    pub ip_count: u32,
    /// 以下字段只有提供了测试床时才有
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<NodeKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub management: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experiment: Option<Ipv4Addr>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<Role>,
}

/// 一条有向边；未声明参数的边 `params` 为空
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VizLink {
    pub from: HostId,
    pub to: HostId,
    #[serde(default, skip_serializing_if = "LinkSpec::is_empty")]
    pub params: LinkSpec,
}

impl TopologyView {
    pub fn build(topology: &Topology, testbed: Option<&Testbed>) -> Self {
        let hosts = topology
            .hosts()
            .map(|id| {
                let entry = testbed.and_then(|t| t.host(id));
                VizHost {
                    id,
                    ip_count: topology.ip_count(id),
                    kind: entry.map(|e| e.kind),
                    management: entry.map(|e| e.management.clone()),
                    experiment: entry.map(|e| e.experiment),
                    roles: entry.map(|e| e.roles.iter().collect()).unwrap_or_default(),
                }
            })
            .collect();

        let links = topology
            .graph
            .iter()
            .flat_map(|(from, peers)| peers.iter().map(move |&to| (from, to)))
            .map(|(from, to)| VizLink {
                from,
                to,
                params: topology.link(from, to).copied().unwrap_or_default(),
            })
            .collect();

        Self { hosts, links }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
