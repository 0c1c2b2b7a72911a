use std::fmt::Write;

use crate::topo::Topology;

/// 输出 Graphviz 文本：`digraph G {`，每条有向边一行 `A -> B`，带参数的边附加 label
pub fn to_dot(topology: &Topology) -> String {
    let mut out = String::from("digraph G {\n");
    for (from, peers) in topology.graph.iter() {
        for &to in peers {
            match topology.link(from, to).filter(|l| !l.is_empty()) {
                Some(spec) => {
                    let _ = writeln!(out, "  {from} -> {to} [label=\"{spec}\"]");
                }
                None => {
                    let _ = writeln!(out, "  {from} -> {to}");
                }
            }
        }
    }
    out.push_str("}\n");
    out
}
