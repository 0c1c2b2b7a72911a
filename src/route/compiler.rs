//! 静态路由编译
//!
//! 对每个（源, 目的）对求等价最短路径，按下一跳生成 `ip route replace` 命令。
//! 直连邻居不需要路由。单路径模式只用第一条路径的下一跳，度量为跳数；
//! 多路径模式写一条 ECMP 路由，并在编号表中为每个下一跳各写一条单路径路由，
//! 供按路径选路的测量使用。只有一个下一跳时也照样写编号表。

use tracing::{debug, info, warn};

use crate::net::{HostId, RouteCandidate};
use crate::tc::{CommandPlan, Stage, WarningKind};
use crate::testbed::Testbed;
use crate::topo::Topology;

/// 按路径编号的路由表从这里开始
pub const DEFAULT_TABLE_BASE: u32 = 300;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RouteMode {
    /// 每个目的一条路由，带 `metric`
    #[default]
    Single,
    /// ECMP 路由加按路径编号的策略路由表
    Multipath {
        /// 每个目的最多使用的下一跳个数，`None` 表示不限
        max_paths: Option<usize>,
    },
}

impl RouteMode {
    fn max_paths(self) -> Option<usize> {
        match self {
            RouteMode::Single => Some(1),
            RouteMode::Multipath { max_paths } => max_paths.map(|n| n.max(1)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteOptions {
    pub iface: String,
    pub mode: RouteMode,
    pub table_base: u32,
    /// 是否先关闭 ICMP 重定向并打开转发
    pub sysctl: bool,
}

impl Default for RouteOptions {
    fn default() -> Self {
        Self {
            iface: "eth0".to_string(),
            mode: RouteMode::Single,
            table_base: DEFAULT_TABLE_BASE,
            sysctl: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RoutingCompiler {
    opts: RouteOptions,
}

impl RoutingCompiler {
    pub fn new(opts: RouteOptions) -> Self {
        Self { opts }
    }

    #[tracing::instrument(skip_all, fields(iface = %self.opts.iface, mode = ?self.opts.mode))]
    pub fn compile(&self, topology: &Topology, testbed: &Testbed) -> CommandPlan {
        let mut plan = CommandPlan::default();
        let hosts: Vec<HostId> = topology.hosts().collect();
        for &src in &hosts {
            if self.opts.sysctl {
                self.push_sysctl(src, &mut plan);
            }
            for &dst in &hosts {
                if src == dst {
                    continue;
                }
                self.compile_pair(src, dst, topology, testbed, &mut plan);
            }
        }
        info!(commands = plan.len(), "路由编译完成");
        plan
    }

    fn push_sysctl(&self, host: HostId, plan: &mut CommandPlan) {
        let iface = &self.opts.iface;
        for (key, value) in [("send_redirects", 0), ("accept_redirects", 0), ("forwarding", 1)] {
            plan.push(
                host,
                Stage::Sysctl,
                format!("sysctl -w net.ipv4.conf.{iface}.{key}={value}"),
            );
        }
    }

    fn compile_pair(
        &self,
        src: HostId,
        dst: HostId,
        topology: &Topology,
        testbed: &Testbed,
        plan: &mut CommandPlan,
    ) {
        let Some(candidate) = RouteCandidate::between(&topology.graph, src, dst) else {
            warn!(%src, %dst, "不可达");
            plan.warn(src, WarningKind::Unreachable(dst));
            return;
        };
        if candidate.hops() <= 1 {
            return;
        }

        let mut next_hops = candidate.next_hops();
        if let Some(max) = self.opts.mode.max_paths() {
            next_hops.truncate(max);
        }
        let via: Vec<_> = next_hops
            .iter()
            .filter_map(|nh| testbed.experiment_addr(*nh))
            .collect();
        let Some(first) = via.first() else {
            return;
        };

        let iface = &self.opts.iface;
        for addr in testbed.experiment_addrs(dst, topology.ip_count(dst)) {
            if self.opts.mode == RouteMode::Single {
                plan.push(
                    src,
                    Stage::Route,
                    format!(
                        "ip route replace {addr} via {first} dev {iface} metric {}",
                        candidate.hops()
                    ),
                );
                continue;
            }
            let hops: Vec<String> = via
                .iter()
                .map(|nh| format!("nexthop via {nh} dev {iface}"))
                .collect();
            plan.push(
                src,
                Stage::Route,
                format!("ip route replace {addr} {}", hops.join(" ")),
            );
            for (i, nh) in via.iter().enumerate() {
                plan.push(
                    src,
                    Stage::Route,
                    format!(
                        "ip route replace {addr} via {nh} dev {iface} table {}",
                        self.opts.table_base + i as u32
                    ),
                );
            }
        }
        debug!(%src, %dst, paths = candidate.paths.len(), next_hops = via.len(), "路由已编译");
    }
}
