use crate::route::{RouteMode, RouteOptions, RoutingCompiler};
use crate::tc::{CommandPlan, Stage, WarningKind};

use super::fixtures::{h, plain_testbed, testbed, topology};

fn routes(plan: &CommandPlan, host: u32) -> Vec<&str> {
    plan.for_host(h(host))
        .filter(|c| c.stage == Stage::Route)
        .map(|c| c.command.as_str())
        .collect()
}

#[test]
fn sysctl_prelude_comes_first() {
    let topo = topology("1: 2\n");
    let tb = plain_testbed(&[1, 2], &topo);
    let plan = RoutingCompiler::default().compile(&topo, &tb);
    let h1: Vec<&str> = plan.for_host(h(1)).map(|c| c.command.as_str()).collect();
    assert_eq!(
        h1,
        vec![
            "sysctl -w net.ipv4.conf.eth0.send_redirects=0",
            "sysctl -w net.ipv4.conf.eth0.accept_redirects=0",
            "sysctl -w net.ipv4.conf.eth0.forwarding=1",
        ]
    );

    let quiet = RoutingCompiler::new(RouteOptions {
        sysctl: false,
        ..RouteOptions::default()
    });
    assert!(quiet.compile(&topo, &tb).is_empty());
}

#[test]
fn single_path_routes_use_hop_count_as_metric() {
    let topo = topology("1: 2\n2: 3\n3: 4\n");
    let tb = plain_testbed(&[1, 2, 3, 4], &topo);
    let plan = RoutingCompiler::default().compile(&topo, &tb);
    assert_eq!(
        routes(&plan, 1),
        vec![
            "ip route replace 10.0.0.3 via 10.0.0.2 dev eth0 metric 2",
            "ip route replace 10.0.0.4 via 10.0.0.2 dev eth0 metric 3",
        ]
    );
    assert_eq!(
        routes(&plan, 3),
        vec!["ip route replace 10.0.0.1 via 10.0.0.2 dev eth0 metric 2"]
    );
    assert!(plan.is_ordered());
}

fn multipath(max_paths: Option<usize>) -> RoutingCompiler {
    RoutingCompiler::new(RouteOptions {
        mode: RouteMode::Multipath { max_paths },
        ..RouteOptions::default()
    })
}

#[test]
fn equal_cost_paths_become_multipath_and_policy_tables() {
    let topo = topology("1: 2 4\n2: 3\n3: 4\n");
    let tb = plain_testbed(&[1, 2, 3, 4], &topo);
    assert_eq!(
        routes(&multipath(None).compile(&topo, &tb), 1),
        vec![
            "ip route replace 10.0.0.3 nexthop via 10.0.0.2 dev eth0 nexthop via 10.0.0.4 dev eth0",
            "ip route replace 10.0.0.3 via 10.0.0.2 dev eth0 table 300",
            "ip route replace 10.0.0.3 via 10.0.0.4 dev eth0 table 301",
        ]
    );
    assert_eq!(
        routes(&multipath(Some(1)).compile(&topo, &tb), 1),
        vec![
            "ip route replace 10.0.0.3 nexthop via 10.0.0.2 dev eth0",
            "ip route replace 10.0.0.3 via 10.0.0.2 dev eth0 table 300",
        ]
    );

    // 单路径模式只取第一条路径
    assert_eq!(
        routes(&RoutingCompiler::default().compile(&topo, &tb), 1),
        vec!["ip route replace 10.0.0.3 via 10.0.0.2 dev eth0 metric 2"]
    );
}

#[test]
fn multipath_mode_fills_tables_for_a_single_next_hop() {
    let topo = topology("1: 2\n2: 3\n");
    let tb = plain_testbed(&[1, 2, 3], &topo);
    let plan = multipath(None).compile(&topo, &tb);
    assert_eq!(
        routes(&plan, 1),
        vec![
            "ip route replace 10.0.0.3 nexthop via 10.0.0.2 dev eth0",
            "ip route replace 10.0.0.3 via 10.0.0.2 dev eth0 table 300",
        ]
    );
    assert_eq!(
        routes(&plan, 3),
        vec![
            "ip route replace 10.0.0.1 nexthop via 10.0.0.2 dev eth0",
            "ip route replace 10.0.0.1 via 10.0.0.2 dev eth0 table 300",
        ]
    );
    assert!(routes(&plan, 2).is_empty());
}

#[test]
fn every_address_of_a_multi_address_host_is_routed() {
    let topo = topology("1: 2\n2: 3\n3(2): 2\n");
    let tb = testbed(
        r#"{ "hosts": [
            { "id": 1, "mip": "m1", "eip": "10.0.0.10" },
            { "id": 2, "mip": "m2", "eip": "10.0.0.20" },
            { "id": 3, "mip": "m3", "eip": "10.0.0.30" }
        ] }"#,
        &topo,
    );
    let plan = RoutingCompiler::new(RouteOptions {
        iface: "eth1".to_string(),
        ..RouteOptions::default()
    })
    .compile(&topo, &tb);
    assert_eq!(
        routes(&plan, 1),
        vec![
            "ip route replace 10.0.0.30 via 10.0.0.20 dev eth1 metric 2",
            "ip route replace 10.0.0.31 via 10.0.0.20 dev eth1 metric 2",
        ]
    );
}

#[test]
fn unreachable_destinations_are_reported() {
    let topo = topology("1: 2\n3: 4\n");
    let tb = plain_testbed(&[1, 2, 3, 4], &topo);
    let plan = RoutingCompiler::default().compile(&topo, &tb);
    assert!(routes(&plan, 1).is_empty());
    let unreachable: Vec<_> = plan.warnings_for(h(1)).collect();
    assert_eq!(
        unreachable,
        vec![&WarningKind::Unreachable(h(3)), &WarningKind::Unreachable(h(4))]
    );
}
