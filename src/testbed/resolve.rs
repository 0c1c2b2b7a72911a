//! 测试床配置校验
//!
//! 配置与拓扑不一致属于致命错误：在生成任何命令之前就中止。

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use thiserror::Error;
use tracing::{debug, info};

use super::spec::{NodeKind, PairSpec, TestbedSpec};
use crate::net::HostId;
use crate::role::RoleSet;
use crate::topo::Topology;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid testbed description: {0}")]
    Json(#[from] serde_json::Error),
    #[error("host {0} is declared twice")]
    DuplicateHost(HostId),
    #[error("the number of configured hosts ({configured}) is less than the number of hosts in the topology ({required})")]
    TooFewHosts { configured: usize, required: usize },
    #[error("host {0} appears in the topology but has no testbed entry")]
    MissingHost(HostId),
    #[error("duplicate address {addr} declared for hosts {first} and {second}")]
    DuplicateAddress {
        addr: String,
        first: HostId,
        second: HostId,
    },
    #[error("flow pair references unknown host {0}")]
    UnknownPairHost(HostId),
}

/// 校验后的单台主机信息
#[derive(Debug, Clone, PartialEq)]
pub struct HostEntry {
    pub id: HostId,
    pub management: String,
    pub experiment: Ipv4Addr,
    pub kind: NodeKind,
    pub roles: RoleSet,
}

/// 一条测量流的两个端点
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowPair {
    pub src: HostId,
    pub dst: HostId,
}

impl From<PairSpec> for FlowPair {
    fn from(p: PairSpec) -> Self {
        Self { src: p.src, dst: p.dst }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Testbed {
    hosts: BTreeMap<HostId, HostEntry>,
    pairs: Vec<FlowPair>,
}

impl Testbed {
    /// 按拓扑校验配置；遇到第一个不一致即返回
    pub fn resolve(spec: &TestbedSpec, topology: &Topology) -> Result<Testbed, ConfigError> {
        let mut hosts: BTreeMap<HostId, HostEntry> = BTreeMap::new();
        for h in &spec.hosts {
            let entry = HostEntry {
                id: h.id,
                management: h.mip.clone(),
                experiment: h.eip,
                kind: h.kind,
                roles: h.roles.iter().copied().collect(),
            };
            if hosts.insert(h.id, entry).is_some() {
                return Err(ConfigError::DuplicateHost(h.id));
            }
        }

        let required = topology.graph.len();
        if hosts.len() < required {
            return Err(ConfigError::TooFewHosts {
                configured: hosts.len(),
                required,
            });
        }
        if let Some(missing) = topology.hosts().find(|h| !hosts.contains_key(h)) {
            return Err(ConfigError::MissingHost(missing));
        }

        let mut seen_mgmt: BTreeMap<&str, HostId> = BTreeMap::new();
        let mut seen_exp: BTreeMap<Ipv4Addr, HostId> = BTreeMap::new();
        for entry in hosts.values() {
            if let Some(&first) = seen_mgmt.get(entry.management.as_str()) {
                return Err(ConfigError::DuplicateAddress {
                    addr: entry.management.clone(),
                    first,
                    second: entry.id,
                });
            }
            seen_mgmt.insert(&entry.management, entry.id);
            if let Some(&first) = seen_exp.get(&entry.experiment) {
                return Err(ConfigError::DuplicateAddress {
                    addr: entry.experiment.to_string(),
                    first,
                    second: entry.id,
                });
            }
            seen_exp.insert(entry.experiment, entry.id);
        }

        let mut pairs = Vec::with_capacity(spec.pairs.len());
        for p in &spec.pairs {
            for h in [p.src, p.dst] {
                if !hosts.contains_key(&h) {
                    return Err(ConfigError::UnknownPairHost(h));
                }
            }
            pairs.push(FlowPair::from(*p));
        }

        for extra in hosts.keys().filter(|h| !topology.graph.contains(**h)) {
            debug!(host = %extra, "配置中的主机不在拓扑内");
        }
        info!(hosts = hosts.len(), pairs = pairs.len(), "测试床配置校验通过");

        Ok(Testbed { hosts, pairs })
    }

    pub fn host(&self, id: HostId) -> Option<&HostEntry> {
        self.hosts.get(&id)
    }

    pub fn hosts(&self) -> impl Iterator<Item = &HostEntry> + '_ {
        self.hosts.values()
    }

    pub fn pairs(&self) -> &[FlowPair] {
        &self.pairs
    }

    pub fn roles(&self, id: HostId) -> RoleSet {
        self.hosts.get(&id).map_or(RoleSet::EMPTY, |h| h.roles)
    }

    pub fn management(&self, id: HostId) -> Option<&str> {
        self.hosts.get(&id).map(|h| h.management.as_str())
    }

    pub fn experiment_addr(&self, id: HostId) -> Option<Ipv4Addr> {
        self.hosts.get(&id).map(|h| h.experiment)
    }

    /// 主机拥有的全部实验地址：主地址及其后 `count - 1` 个地址
    pub fn experiment_addrs(&self, id: HostId, count: u32) -> Vec<Ipv4Addr> {
        let Some(base) = self.experiment_addr(id) else {
            return Vec::new();
        };
        let base = u32::from(base);
        (0..count.max(1))
            .filter_map(|i| base.checked_add(i).map(Ipv4Addr::from))
            .collect()
    }
}
