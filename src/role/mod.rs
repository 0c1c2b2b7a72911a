//! 角色与仿真参数
//!
//! 外部配置给出每台主机的角色，每次调用给出一组仿真参数，本模块把二者合成
//! 具体的 netem 指令。

mod params;
mod resolver;
mod tags;

pub use params::{EmulationParams, EmulationSchedule};
pub use resolver::{
    DirectiveIssue, HostDirectives, JITTER_CORRELATION_PCT, Jittered, NetemDescriptor, Quirks,
    Reorder, RoleResolver,
};
pub use tags::{Role, RoleSet, UnknownRole};
