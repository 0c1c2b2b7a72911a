//! 整形动作
//!
//! 动作名在入口处解析为类型化的 [`Action`]，之后只通过查表分派到编译函数，
//! 未知动作名在解析时就报错。

use std::fmt;
use std::str::FromStr;

use super::command::CommandPlan;
use super::compiler::{TcError, TcRequest, TrafficControlCompiler};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// 建立 class 层级
    Add,
    /// 修改已建立层级上的整形参数
    Change,
    /// 拆除根队列
    Reset,
}

/// 动作名到动作的映射，`shaped` 为 `change` 的别名
const NAMES: [(&str, Action); 4] = [
    ("add", Action::Add),
    ("change", Action::Change),
    ("shaped", Action::Change),
    ("reset", Action::Reset),
];

pub type Handler = fn(&mut TrafficControlCompiler, &TcRequest<'_>) -> Result<CommandPlan, TcError>;

impl Action {
    pub fn name(self) -> &'static str {
        match self {
            Action::Add => "add",
            Action::Change => "change",
            Action::Reset => "reset",
        }
    }

    pub fn handler(self) -> Handler {
        match self {
            Action::Add => TrafficControlCompiler::compile_add,
            Action::Change => TrafficControlCompiler::compile_change,
            Action::Reset => TrafficControlCompiler::compile_reset,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Action {
    type Err = TcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        NAMES
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, action)| *action)
            .ok_or_else(|| TcError::UnknownAction(s.to_string()))
    }
}
