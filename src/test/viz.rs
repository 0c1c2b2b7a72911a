use serde_json::Value;

use crate::viz::{TopologyView, to_dot};

use super::fixtures::{LINE, LINE_TESTBED, testbed, topology};

#[test]
fn dot_lists_every_directed_edge() {
    let topo = topology("1: 2[10]\n");
    assert_eq!(
        to_dot(&topo),
        "digraph G {\n  1 -> 2 [label=\"[10]\"]\n  2 -> 1\n}\n"
    );
}

#[test]
fn json_view_includes_testbed_details() {
    let topo = topology(LINE);
    let tb = testbed(LINE_TESTBED, &topo);
    let view = TopologyView::build(&topo, Some(&tb));
    assert_eq!(view.hosts.len(), 4);
    assert_eq!(view.links.len(), 6);

    let v: Value = serde_json::from_str(&view.to_json().expect("encode")).expect("decode");
    assert_eq!(v["hosts"][1]["management"], "m2");
    assert_eq!(v["hosts"][1]["roles"][0], "queue_limit");
    assert_eq!(v["hosts"][0]["kind"], "endpoint");
    assert!(v["links"][0].get("params").is_none());
}

#[test]
fn json_view_without_testbed_has_link_params_only() {
    let topo = topology("1(2): 2[1.5,20]\n");
    let view = TopologyView::build(&topo, None);
    let v: Value = serde_json::to_value(&view).expect("encode");
    assert_eq!(v["hosts"][0]["ip_count"], 2);
    assert!(v["hosts"][0].get("management").is_none());
    assert_eq!(v["links"][0]["params"]["rate"].as_f64(), Some(1.5));
    assert_eq!(v["links"][0]["params"]["limit"], 20);

    let decoded: TopologyView = serde_json::from_value(v).expect("decode");
    assert_eq!(decoded, view);
}
