//! 可达性图
//!
//! 主机 -> 可达主机集合。不变量：
//! - 对称：`b ∈ g[a]` 当且仅当 `a ∈ g[b]`
//! - 无自环
//! - 任何出现过的主机（键或可达目标）都在主机集合中

use std::collections::{BTreeMap, BTreeSet};

use super::id::HostId;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReachabilityGraph {
    adj: BTreeMap<HostId, BTreeSet<HostId>>,
}

impl ReachabilityGraph {
    /// 由逐行声明的（非对称）关系计算对称闭包
    pub fn from_declared<'a, I>(declared: I) -> Self
    where
        I: IntoIterator<Item = (HostId, &'a BTreeSet<HostId>)>,
    {
        let mut g = ReachabilityGraph::default();
        for (host, reaches) in declared {
            g.adj.entry(host).or_default();
            for &r in reaches {
                g.connect(host, r);
            }
        }
        g
    }

    /// 添加一条无向边；自环被忽略
    pub fn connect(&mut self, a: HostId, b: HostId) {
        if a == b {
            return;
        }
        self.adj.entry(a).or_default().insert(b);
        self.adj.entry(b).or_default().insert(a);
    }

    pub fn contains(&self, host: HostId) -> bool {
        self.adj.contains_key(&host)
    }

    /// 邻居集合（升序）。该顺序即路径搜索的“发现顺序”。
    pub fn neighbors(&self, host: HostId) -> Option<&BTreeSet<HostId>> {
        self.adj.get(&host)
    }

    pub fn reaches(&self, a: HostId, b: HostId) -> bool {
        self.adj.get(&a).is_some_and(|s| s.contains(&b))
    }

    /// 所有主机（升序）
    pub fn hosts(&self) -> impl Iterator<Item = HostId> + '_ {
        self.adj.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (HostId, &BTreeSet<HostId>)> + '_ {
        self.adj.iter().map(|(h, s)| (*h, s))
    }

    pub fn len(&self) -> usize {
        self.adj.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adj.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.adj.values().map(BTreeSet::len).sum::<usize>() / 2
    }

    /// 检查对称性与无自环
    pub fn is_consistent(&self) -> bool {
        self.adj.iter().all(|(a, set)| {
            !set.contains(a) && set.iter().all(|b| self.reaches(*b, *a))
        })
    }
}
