use crate::dispatch::{CommandDispatcher, DispatchError, DryRunDispatcher, dispatch_plan};
use crate::net::HostId;
use crate::role::{EmulationParams, RoleResolver};
use crate::tc::{
    CommandPlan, HostPhase, Stage, TcOptions, TcRequest, TrafficControlCompiler, WarningKind,
};

use super::fixtures::{LINE, LINE_TESTBED, h, plain_testbed, testbed, topology};

/// 记录执行过的命令；命令包含 `fail_on` 时返回失败
struct Scripted {
    fail_on: &'static str,
    seen: Vec<(HostId, String)>,
}

impl CommandDispatcher for Scripted {
    fn execute(&mut self, host: HostId, target: &str, command: &str) -> Result<(), DispatchError> {
        self.seen.push((host, command.to_string()));
        if command.contains(self.fail_on) {
            return Err(DispatchError::CommandFailed {
                target: target.to_string(),
                command: command.to_string(),
                status: 2,
            });
        }
        Ok(())
    }
}

#[test]
fn dry_run_prints_management_prefixed_lines() {
    let topo = topology("1: 2\n");
    let tb = plain_testbed(&[1, 2], &topo);
    let mut plan = CommandPlan::default();
    plan.push(h(2), Stage::Route, "ip route show");
    plan.push(h(1), Stage::Sysctl, "sysctl -a");

    let mut dry = DryRunDispatcher::new(Vec::new());
    let report = dispatch_plan(&plan, &tb, &mut dry);
    assert!(report.is_success());
    assert_eq!(report.executed, 2);
    let out = String::from_utf8(dry.into_inner()).expect("utf8");
    assert_eq!(out, "[m1] sysctl -a\n[m2] ip route show\n");
}

#[test]
fn hard_failure_stops_only_that_host() {
    let topo = topology("1: 2\n");
    let tb = plain_testbed(&[1, 2], &topo);
    let mut plan = CommandPlan::default();
    plan.push_may_fail(h(1), Stage::Teardown, "tc qdisc del dev eth0 root");
    plan.push(h(1), Stage::Root, "tc qdisc add dev eth0 root handle 1: htb default 100");
    plan.push(h(1), Stage::Class, "boom");
    plan.push(h(1), Stage::Filter, "never runs");
    plan.push(h(2), Stage::Root, "tc qdisc add dev eth0 root handle 1: htb default 100");

    let mut d = Scripted {
        fail_on: "del",
        seen: Vec::new(),
    };
    let report = dispatch_plan(&plan, &tb, &mut d);
    assert!(report.is_success());
    assert_eq!(report.tolerated, 1);
    assert_eq!(report.executed, 4);

    let mut d = Scripted {
        fail_on: "boom",
        seen: Vec::new(),
    };
    let report = dispatch_plan(&plan, &tb, &mut d);
    assert_eq!(report.failed_hosts().collect::<Vec<_>>(), vec![h(1)]);
    assert_eq!(report.failures[0].stage, Stage::Class);
    assert!(!d.seen.iter().any(|(_, c)| c == "never runs"));
    assert!(d.seen.iter().any(|(host, _)| *host == h(2)));
}

#[test]
fn failed_hierarchy_blocks_later_changes() {
    let topo = topology(LINE);
    let tb = testbed(LINE_TESTBED, &topo);
    let params = EmulationParams {
        delay_ms: Some(10.0),
        ..EmulationParams::default()
    };
    let req = TcRequest {
        topology: &topo,
        testbed: &tb,
        params: Some(&params),
    };
    let mut tc = TrafficControlCompiler::new(TcOptions::default(), RoleResolver::default());
    let add = tc.compile_add(&req).expect("add");

    // 两台路由器的第一条 class 命令都失败
    let mut d = Scripted {
        fail_on: "classid 1:1 htb rate 1000mbit",
        seen: Vec::new(),
    };
    let report = dispatch_plan(&add, &tb, &mut d);
    assert_eq!(report.failed_hosts().collect::<Vec<_>>(), vec![h(2), h(3)]);

    tc.absorb_report(&report);
    assert_eq!(tc.phase(h(2)), HostPhase::Failed);
    let change = tc.compile_change(&req).expect("change");
    assert!(change.is_empty());
    assert!(change
        .warnings_for(h(2))
        .any(|w| *w == WarningKind::HierarchyFailed));
}

#[test]
fn host_without_management_address_is_reported() {
    let topo = topology("1: 2\n");
    let tb = plain_testbed(&[1, 2], &topo);
    let mut plan = CommandPlan::default();
    plan.push(h(9), Stage::Route, "ip route show");
    let mut dry = DryRunDispatcher::new(Vec::new());
    let report = dispatch_plan(&plan, &tb, &mut dry);
    assert!(matches!(
        report.failures[0].error,
        DispatchError::UnknownHost(id) if id == h(9)
    ));
    assert!(dry.into_inner().is_empty());
}
