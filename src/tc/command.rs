//! 编译产物：按主机分组、带阶段约束的命令序列

use std::collections::BTreeMap;

use serde::Serialize;

use crate::net::HostId;

/// 同一主机内命令的先后阶段：数值小的必须先执行。跨主机无顺序要求。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// 删除已有的根队列
    Teardown,
    /// 创建根 HTB 队列
    Root,
    Class,
    Filter,
    /// netem 叶子队列
    Leaf,
    Sysctl,
    Route,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledCommand {
    pub host: HostId,
    pub stage: Stage,
    pub command: String,
    /// 失败可以容忍（例如删除一个可能不存在的根队列）
    pub may_fail: bool,
}

/// 编译时遇到、但不影响其它主机的问题
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WarningKind {
    /// 该主机的层级创建失败过，在重新 ADD/RESET 之前不再整形
    HierarchyFailed,
    /// 该主机还没有（或没有所需的）class 层级
    HierarchyMissing,
    /// 队列节点缺少带宽/队列长度，`fallback` 为实际使用的默认带宽
    MissingShapingInfo { fallback: Option<f64> },
    /// 到该邻居的链路既无带宽也无默认带宽，未整形
    UnratedPeer(HostId),
    /// 有角色但没有配置测量流，方向 class 不会匹配到任何流量
    NoFlowPairs,
    /// 两主机间不可达，未生成路由
    Unreachable(HostId),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanWarning {
    pub host: HostId,
    pub kind: WarningKind,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandPlan {
    pub commands: Vec<CompiledCommand>,
    pub warnings: Vec<PlanWarning>,
}

impl CommandPlan {
    pub fn push(&mut self, host: HostId, stage: Stage, command: impl Into<String>) {
        self.commands.push(CompiledCommand {
            host,
            stage,
            command: command.into(),
            may_fail: false,
        });
    }

    pub fn push_may_fail(&mut self, host: HostId, stage: Stage, command: impl Into<String>) {
        self.commands.push(CompiledCommand {
            host,
            stage,
            command: command.into(),
            may_fail: true,
        });
    }

    pub fn warn(&mut self, host: HostId, kind: WarningKind) {
        self.warnings.push(PlanWarning { host, kind });
    }

    pub fn append(&mut self, mut other: CommandPlan) {
        self.commands.append(&mut other.commands);
        self.warnings.append(&mut other.warnings);
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn for_host(&self, host: HostId) -> impl Iterator<Item = &CompiledCommand> + '_ {
        self.commands.iter().filter(move |c| c.host == host)
    }

    /// 按主机分组，组内保持原有顺序
    pub fn by_host(&self) -> BTreeMap<HostId, Vec<&CompiledCommand>> {
        let mut out: BTreeMap<HostId, Vec<&CompiledCommand>> = BTreeMap::new();
        for c in &self.commands {
            out.entry(c.host).or_default().push(c);
        }
        out
    }

    /// 每台主机内部阶段是否单调不减
    pub fn is_ordered(&self) -> bool {
        self.by_host()
            .values()
            .all(|cmds| cmds.windows(2).all(|w| w[0].stage <= w[1].stage))
    }

    pub fn warnings_for(&self, host: HostId) -> impl Iterator<Item = &WarningKind> + '_ {
        self.warnings
            .iter()
            .filter(move |w| w.host == host)
            .map(|w| &w.kind)
    }
}
