//! 流量控制编译器
//!
//! 每台主机维护一个层级状态：`Uninitialized -> HierarchyReady`，层级命令执行失败
//! 则进入 `Failed`。ADD 建立根队列、class、过滤器和链路叶子；CHANGE 只在已就绪
//! 的主机上修改方向 class 的带宽和 netem 叶子，从不创建根队列；RESET 删除根队列
//! 并回到 `Uninitialized`。

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::dispatch::DispatchReport;
use crate::net::{HostId, fmt_rate};
use crate::role::{
    DirectiveIssue, EmulationParams, EmulationSchedule, NetemDescriptor, RoleResolver,
};
use crate::testbed::{NodeKind, Testbed};
use crate::topo::Topology;

use super::action::Action;
use super::command::{CommandPlan, Stage, WarningKind};
use super::slot::{ClassSlot, SlotKind, TopologyMode, link_netem_args};

/// 方向 class 默认带宽（Mbit/s）
pub const DEFAULT_DIRECTION_RATE_MBIT: f64 = 1000.0;

#[derive(Debug, Error, PartialEq)]
pub enum TcError {
    #[error("unknown action `{0}`")]
    UnknownAction(String),
    #[error("host {0} already has a class hierarchy; use reset to rebuild it")]
    HierarchyExists(HostId),
    #[error("action `{0}` needs emulation parameters")]
    MissingParams(Action),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TcOptions {
    pub iface: String,
    pub mode: TopologyMode,
    /// ADD 前先删除已有的根队列
    pub reset_root: bool,
    /// 链路未给带宽时使用的默认带宽
    pub default_rate_mbit: Option<f64>,
    pub direction_rate_mbit: f64,
}

impl Default for TcOptions {
    fn default() -> Self {
        Self {
            iface: "eth0".to_string(),
            mode: TopologyMode::Single,
            reset_root: false,
            default_rate_mbit: None,
            direction_rate_mbit: DEFAULT_DIRECTION_RATE_MBIT,
        }
    }
}

/// 一次编译的输入
#[derive(Debug, Clone, Copy)]
pub struct TcRequest<'a> {
    pub topology: &'a Topology,
    pub testbed: &'a Testbed,
    /// 仅 CHANGE 需要
    pub params: Option<&'a EmulationParams>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostPhase {
    #[default]
    Uninitialized,
    HierarchyReady,
    Failed,
}

#[derive(Debug, Clone, Default)]
struct HostState {
    phase: HostPhase,
    slots: Vec<ClassSlot>,
    /// 已经创建过叶子队列的槽位
    leaves: BTreeSet<u32>,
}

impl HostState {
    fn slot(&self, kind: SlotKind) -> Option<&ClassSlot> {
        self.slots.iter().find(|s| s.kind == kind)
    }
}

#[derive(Debug, Clone)]
pub struct TrafficControlCompiler {
    opts: TcOptions,
    resolver: RoleResolver,
    hosts: BTreeMap<HostId, HostState>,
}

impl TrafficControlCompiler {
    pub fn new(opts: TcOptions, resolver: RoleResolver) -> Self {
        Self {
            opts,
            resolver,
            hosts: BTreeMap::new(),
        }
    }

    pub fn phase(&self, host: HostId) -> HostPhase {
        self.hosts.get(&host).map(|s| s.phase).unwrap_or_default()
    }

    /// 某主机的 class 槽位，未建立层级时为空
    pub fn slots(&self, host: HostId) -> &[ClassSlot] {
        self.hosts.get(&host).map_or(&[], |s| s.slots.as_slice())
    }

    /// 按动作查表分派
    pub fn run(&mut self, action: Action, req: &TcRequest<'_>) -> Result<CommandPlan, TcError> {
        (action.handler())(self, req)
    }

    #[tracing::instrument(
        skip(self, req),
        fields(iface = %self.opts.iface, reset = self.opts.reset_root)
    )]
    pub fn compile_add(&mut self, req: &TcRequest<'_>) -> Result<CommandPlan, TcError> {
        let targets = shaped_hosts(req);
        if !self.opts.reset_root {
            if let Some(h) = targets.iter().find(|h| self.phase(**h) == HostPhase::HierarchyReady) {
                return Err(TcError::HierarchyExists(*h));
            }
        }

        let mut plan = CommandPlan::default();
        if self.opts.reset_root {
            for host in req.topology.hosts() {
                plan.push_may_fail(host, Stage::Teardown, self.del_root());
                self.hosts.remove(&host);
            }
        }
        for host in targets {
            let state = self.build_hierarchy(host, req, &mut plan);
            self.hosts.insert(host, state);
        }
        info!(commands = plan.len(), "ADD 编译完成");
        Ok(plan)
    }

    #[tracing::instrument(skip(self, req), fields(iface = %self.opts.iface))]
    pub fn compile_change(&mut self, req: &TcRequest<'_>) -> Result<CommandPlan, TcError> {
        let params = req.params.ok_or(TcError::MissingParams(Action::Change))?;
        let mut plan = CommandPlan::default();

        for host in shaped_hosts(req) {
            let roles = req.testbed.roles(host);
            if roles.is_empty() {
                continue;
            }
            let Some(state) = self.hosts.get_mut(&host) else {
                warn!(%host, "主机尚未建立层级，跳过");
                plan.warn(host, WarningKind::HierarchyMissing);
                continue;
            };
            match state.phase {
                HostPhase::HierarchyReady => {}
                HostPhase::Failed => {
                    warn!(%host, "主机层级创建失败过，跳过");
                    plan.warn(host, WarningKind::HierarchyFailed);
                    continue;
                }
                HostPhase::Uninitialized => {
                    plan.warn(host, WarningKind::HierarchyMissing);
                    continue;
                }
            }
            let (Some(rev), Some(fwd)) = (
                state.slot(SlotKind::Reverse).cloned(),
                state.slot(SlotKind::Forward).cloned(),
            ) else {
                warn!(%host, "主机没有方向 class，跳过");
                plan.warn(host, WarningKind::HierarchyMissing);
                continue;
            };

            let directives = self.resolver.resolve(roles, params);
            for issue in &directives.issues {
                match *issue {
                    DirectiveIssue::MissingShapingInfo { fallback } => {
                        plan.warn(host, WarningKind::MissingShapingInfo { fallback });
                    }
                }
            }

            let iface = &self.opts.iface;
            let mode = self.opts.mode;
            if let Some(rate) = directives.bandwidth_mbit {
                for slot in [&rev, &fwd] {
                    plan.push(
                        host,
                        Stage::Class,
                        format!(
                            "tc class change dev {iface} parent 1: classid {} htb rate {}mbit",
                            mode.class_id(slot.index),
                            fmt_rate(rate)
                        ),
                    );
                }
            }

            let leaves: [(&ClassSlot, Option<NetemDescriptor>); 2] =
                [(&rev, directives.reverse), (&fwd, directives.forward)];
            for (slot, desc) in leaves {
                let Some(desc) = desc else { continue };
                let verb = if state.leaves.insert(slot.index) { "add" } else { "change" };
                plan.push(
                    host,
                    Stage::Leaf,
                    format!(
                        "tc qdisc {verb} dev {iface} parent {} handle {} netem {desc}",
                        mode.class_id(slot.index),
                        mode.leaf_handle(slot.index)
                    ),
                );
            }
            debug!(%host, %roles, "方向整形已编译");
        }
        info!(commands = plan.len(), "CHANGE 编译完成");
        Ok(plan)
    }

    /// 依次编译计划中的每一步，每步一个 CHANGE 批次。第一步创建叶子，之后的步骤修改叶子。
    pub fn compile_schedule(
        &mut self,
        req: &TcRequest<'_>,
        schedule: &EmulationSchedule,
    ) -> Result<Vec<CommandPlan>, TcError> {
        schedule
            .steps
            .iter()
            .map(|params| {
                self.compile_change(&TcRequest {
                    params: Some(params),
                    ..*req
                })
            })
            .collect()
    }

    #[tracing::instrument(skip(self, req), fields(iface = %self.opts.iface))]
    pub fn compile_reset(&mut self, req: &TcRequest<'_>) -> Result<CommandPlan, TcError> {
        let mut plan = CommandPlan::default();
        for host in req.topology.hosts() {
            plan.push_may_fail(host, Stage::Teardown, self.del_root());
            self.hosts.remove(&host);
        }
        info!(commands = plan.len(), "RESET 编译完成");
        Ok(plan)
    }

    /// 认为层级已经由之前的一次运行建好，只记录状态不产生命令
    pub fn adopt_existing(&mut self, req: &TcRequest<'_>) {
        let mut scratch = CommandPlan::default();
        for host in shaped_hosts(req) {
            let state = self.build_hierarchy(host, req, &mut scratch);
            self.hosts.insert(host, state);
        }
        debug!(hosts = self.hosts.len(), "沿用已有层级");
    }

    /// 根据执行结果更新主机状态：层级阶段（根/class/过滤器）失败的主机进入 `Failed`
    pub fn absorb_report(&mut self, report: &DispatchReport) {
        for failure in &report.failures {
            if failure.stage < Stage::Root || failure.stage > Stage::Filter {
                continue;
            }
            if let Some(state) = self.hosts.get_mut(&failure.host) {
                warn!(host = %failure.host, stage = ?failure.stage, "层级创建失败");
                state.phase = HostPhase::Failed;
            }
        }
    }

    fn del_root(&self) -> String {
        format!("tc qdisc del dev {} root", self.opts.iface)
    }

    /// 生成一台主机的根队列、class、过滤器和链路叶子
    fn build_hierarchy(
        &self,
        host: HostId,
        req: &TcRequest<'_>,
        plan: &mut CommandPlan,
    ) -> HostState {
        let iface = &self.opts.iface;
        let mode = self.opts.mode;
        let root = format!(
            "tc qdisc add dev {iface} root handle 1: htb default {}",
            mode.default_class()
        );
        if mode.is_multi() && !self.opts.reset_root {
            plan.push_may_fail(host, Stage::Root, root);
        } else {
            plan.push(host, Stage::Root, root);
        }

        let slots = self.allocate_slots(host, req, plan);
        for slot in &slots {
            plan.push(
                host,
                Stage::Class,
                format!(
                    "tc class add dev {iface} parent 1: classid {} htb rate {}mbit",
                    mode.class_id(slot.index),
                    fmt_rate(slot.rate_mbit)
                ),
            );
        }

        for slot in &slots {
            let classid = mode.class_id(slot.index);
            match slot.kind {
                SlotKind::Peer(peer) => {
                    let Some(addr) = req.testbed.experiment_addr(peer) else {
                        continue;
                    };
                    plan.push(
                        host,
                        Stage::Filter,
                        format!(
                            "tc filter add dev {iface} parent 1: protocol ip prio 16 u32 match ip dst {addr} flowid {classid}"
                        ),
                    );
                }
                SlotKind::Reverse | SlotKind::Forward => {
                    for pair in req.testbed.pairs() {
                        let end = if slot.kind == SlotKind::Forward { pair.src } else { pair.dst };
                        let Some(addr) = req.testbed.experiment_addr(end) else {
                            continue;
                        };
                        plan.push(
                            host,
                            Stage::Filter,
                            format!(
                                "tc filter add dev {iface} parent 1: protocol ip prio 1 u32 match ip src {addr} flowid {classid}"
                            ),
                        );
                    }
                }
            }
        }

        let mut leaves = BTreeSet::new();
        for slot in &slots {
            let SlotKind::Peer(peer) = slot.kind else {
                continue;
            };
            let Some(spec) = req.topology.link(host, peer).filter(|s| s.needs_netem()) else {
                continue;
            };
            plan.push(
                host,
                Stage::Leaf,
                format!(
                    "tc qdisc add dev {iface} parent {} handle {} netem {}",
                    mode.class_id(slot.index),
                    mode.leaf_handle(slot.index),
                    link_netem_args(spec)
                ),
            );
            leaves.insert(slot.index);
        }

        debug!(%host, slots = slots.len(), "层级已编译");
        HostState {
            phase: HostPhase::HierarchyReady,
            slots,
            leaves,
        }
    }

    /// 槽位从 1 开始：先是有带宽的邻居链路，再是有角色主机的反向、前向 class
    fn allocate_slots(
        &self,
        host: HostId,
        req: &TcRequest<'_>,
        plan: &mut CommandPlan,
    ) -> Vec<ClassSlot> {
        let mut slots = Vec::new();
        let mut next = 1;
        let peers = req.topology.graph.neighbors(host).into_iter().flatten();
        for &peer in peers {
            let rate = req
                .topology
                .link(host, peer)
                .and_then(|l| l.rate)
                .or(self.opts.default_rate_mbit);
            let Some(rate_mbit) = rate else {
                debug!(%host, %peer, "链路没有带宽，不整形");
                plan.warn(host, WarningKind::UnratedPeer(peer));
                continue;
            };
            slots.push(ClassSlot {
                index: next,
                kind: SlotKind::Peer(peer),
                rate_mbit,
            });
            next += 1;
        }

        if !req.testbed.roles(host).is_empty() {
            if req.testbed.pairs().is_empty() {
                plan.warn(host, WarningKind::NoFlowPairs);
            }
            for kind in [SlotKind::Reverse, SlotKind::Forward] {
                slots.push(ClassSlot {
                    index: next,
                    kind,
                    rate_mbit: self.opts.direction_rate_mbit,
                });
                next += 1;
            }
        }
        slots
    }
}

/// 需要整形的主机：拓扑中的路由节点，按编号升序
fn shaped_hosts(req: &TcRequest<'_>) -> Vec<HostId> {
    req.topology
        .hosts()
        .filter(|h| {
            req.testbed
                .host(*h)
                .is_some_and(|e| e.kind == NodeKind::Router)
        })
        .collect()
}
