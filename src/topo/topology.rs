//! 解析后的虚拟拓扑
//!
//! 每次调用只构建一次，之后只读。

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::net::{HostId, LinkSpec, LinkTable, ReachabilityGraph};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Topology {
    /// 对称化后的可达性图
    pub graph: ReachabilityGraph,
    /// 按声明方向保存的链路参数
    pub links: LinkTable,
    /// 每个主机拥有的地址个数（默认 1）
    pub ip_counts: BTreeMap<HostId, u32>,
}

impl Topology {
    pub fn hosts(&self) -> impl Iterator<Item = HostId> + '_ {
        self.graph.hosts()
    }

    pub fn ip_count(&self, host: HostId) -> u32 {
        self.ip_counts.get(&host).copied().unwrap_or(1)
    }

    /// a -> b 方向声明的链路参数
    pub fn link(&self, from: HostId, to: HostId) -> Option<&LinkSpec> {
        self.links.get(from, to)
    }

    /// 序列化为邻接表文本，可被 `parse_topology(.., 0)` 重新读入得到相同的图
    ///
    /// 没有任何邻居的主机无法用该语法表达，会被省略。
    pub fn to_adjacency_text(&self) -> String {
        let mut out = String::new();
        for (host, reaches) in self.graph.iter() {
            if reaches.is_empty() {
                continue;
            }
            let _ = write!(out, "{host}");
            let count = self.ip_count(host);
            if count != 1 {
                let _ = write!(out, "({count})");
            }
            out.push(':');
            for &to in reaches {
                let _ = write!(out, " {to}");
                if let Some(spec) = self.link(host, to).filter(|s| !s.is_empty()) {
                    let _ = write!(out, "{spec}");
                }
            }
            out.push('\n');
        }
        out
    }
}
