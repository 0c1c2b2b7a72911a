//! 流量控制（tc）命令编译
//!
//! 把拓扑、测试床和仿真参数编译成按主机分组的 tc 命令。编译本身不执行任何命令，
//! 执行交给 [`crate::dispatch`]。

mod action;
mod command;
mod compiler;
mod slot;

pub use action::{Action, Handler};
pub use command::{CommandPlan, CompiledCommand, PlanWarning, Stage, WarningKind};
pub use compiler::{
    DEFAULT_DIRECTION_RATE_MBIT, HostPhase, TcError, TcOptions, TcRequest, TrafficControlCompiler,
};
pub use slot::{ClassSlot, SlotKind, TopologyMode};
