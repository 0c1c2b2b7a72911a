//! 命令下发
//!
//! 编译器只产生 `(主机, 命令)` 序列，真正的执行通过 [`CommandDispatcher`] 交给外部。
//! [`dispatch_plan`] 逐台主机按顺序执行；某台主机出现不可容忍的失败时只终止
//! 该主机的剩余命令，其它主机照常执行。

use std::io::{self, Write};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::net::HostId;
use crate::tc::{CommandPlan, Stage};
use crate::testbed::Testbed;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("host {0} has no management address")]
    UnknownHost(HostId),
    #[error("{target} unreachable: {reason}")]
    Unreachable { target: String, reason: String },
    #[error("`{command}` on {target} exited with status {status}")]
    CommandFailed {
        target: String,
        command: String,
        status: i32,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// 在目标主机上执行一条命令
pub trait CommandDispatcher {
    fn execute(&mut self, host: HostId, target: &str, command: &str) -> Result<(), DispatchError>;
}

/// 只打印 `[管理地址] 命令`，不执行
#[derive(Debug)]
pub struct DryRunDispatcher<W: Write> {
    out: W,
}

impl DryRunDispatcher<io::Stdout> {
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write> DryRunDispatcher<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> CommandDispatcher for DryRunDispatcher<W> {
    fn execute(&mut self, _host: HostId, target: &str, command: &str) -> Result<(), DispatchError> {
        writeln!(self.out, "[{target}] {command}")?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct HostFailure {
    pub host: HostId,
    pub stage: Stage,
    pub command: String,
    pub error: DispatchError,
}

#[derive(Debug, Default)]
pub struct DispatchReport {
    pub executed: usize,
    /// 失败但标记为可容忍的命令数
    pub tolerated: usize,
    /// 每台主机至多一条：导致该主机批次终止的那条命令
    pub failures: Vec<HostFailure>,
}

impl DispatchReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed_hosts(&self) -> impl Iterator<Item = HostId> + '_ {
        self.failures.iter().map(|f| f.host)
    }
}

/// 按主机分批执行计划
#[tracing::instrument(skip_all, fields(commands = plan.len()))]
pub fn dispatch_plan<D: CommandDispatcher + ?Sized>(
    plan: &CommandPlan,
    testbed: &Testbed,
    dispatcher: &mut D,
) -> DispatchReport {
    let mut report = DispatchReport::default();
    for (host, batch) in plan.by_host() {
        let Some(target) = testbed.management(host) else {
            let Some(first) = batch.first() else { continue };
            warn!(%host, "没有管理地址，跳过整批命令");
            report.failures.push(HostFailure {
                host,
                stage: first.stage,
                command: first.command.clone(),
                error: DispatchError::UnknownHost(host),
            });
            continue;
        };
        for cmd in batch {
            match dispatcher.execute(host, target, &cmd.command) {
                Ok(()) => report.executed += 1,
                Err(e) if cmd.may_fail => {
                    debug!(%host, command = %cmd.command, error = %e, "可容忍的失败");
                    report.tolerated += 1;
                }
                Err(e) => {
                    warn!(%host, command = %cmd.command, error = %e, "命令失败，终止该主机剩余命令");
                    report.failures.push(HostFailure {
                        host,
                        stage: cmd.stage,
                        command: cmd.command.clone(),
                        error: e,
                    });
                    break;
                }
            }
        }
    }
    info!(
        executed = report.executed,
        tolerated = report.tolerated,
        failed_hosts = report.failures.len(),
        "下发完成"
    );
    report
}
