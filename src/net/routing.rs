//! 路径查询（含 ECMP 等价路径）
//!
//! 所有查询都基于简单路径（不重复经过同一主机）。邻居按主机编号升序遍历，
//! 这个顺序就是“发现顺序”：`shortest_path` 返回按该顺序做 DFS 时第一条
//! 最短路径，`equal_cost_paths` 按同一顺序返回全部等长最短路径。
//!
//! 复杂度：枚举简单路径在最坏情况下是指数级的，对几十个节点的测试床足够。
//! 这里先用 BFS 求出最短跳数，再做限深 DFS 剪枝；如果图变大，可以整体换成
//! BFS 前驱图 / Dijkstra，只要保持上面的返回结果和顺序不变。

use std::collections::{BTreeMap, VecDeque};

use super::graph::ReachabilityGraph;
use super::id::HostId;

/// BFS 求 start -> end 的最短跳数；不可达返回 None
pub fn hop_distance(graph: &ReachabilityGraph, start: HostId, end: HostId) -> Option<usize> {
    if start == end {
        return Some(0);
    }
    if !graph.contains(start) {
        return None;
    }

    let mut dist: BTreeMap<HostId, usize> = BTreeMap::new();
    let mut q: VecDeque<HostId> = VecDeque::new();
    dist.insert(start, 0);
    q.push_back(start);

    while let Some(v) = q.pop_front() {
        let dv = dist[&v];
        for &nb in graph.neighbors(v).into_iter().flatten() {
            if dist.contains_key(&nb) {
                continue;
            }
            if nb == end {
                return Some(dv + 1);
            }
            dist.insert(nb, dv + 1);
            q.push_back(nb);
        }
    }
    None
}

/// 第一条最短路径（包含两端点）。`start == end` 时为 `[start]`。
pub fn shortest_path(graph: &ReachabilityGraph, start: HostId, end: HostId) -> Option<Vec<HostId>> {
    if start == end {
        return Some(vec![start]);
    }
    let hops = hop_distance(graph, start, end)?;
    let mut found = Vec::new();
    let mut path = vec![start];
    walk(graph, end, hops, &mut path, &mut found, true);
    found.into_iter().next()
}

/// 所有并列最短的简单路径（包含两端点），按发现顺序排列
///
/// 每次调用都分配新的结果容器。
pub fn equal_cost_paths(graph: &ReachabilityGraph, start: HostId, end: HostId) -> Vec<Vec<HostId>> {
    if start == end {
        return vec![vec![start]];
    }
    let Some(hops) = hop_distance(graph, start, end) else {
        return Vec::new();
    };
    let mut found = Vec::new();
    let mut path = vec![start];
    walk(graph, end, hops, &mut path, &mut found, false);
    found
}

/// 限深 DFS：只保留恰好 `hops` 跳到达 end 的路径
fn walk(
    graph: &ReachabilityGraph,
    end: HostId,
    hops: usize,
    path: &mut Vec<HostId>,
    found: &mut Vec<Vec<HostId>>,
    first_only: bool,
) {
    let Some(&cur) = path.last() else {
        return;
    };
    if cur == end {
        found.push(path.clone());
        return;
    }
    // 已用跳数 = path.len() - 1
    if path.len() > hops {
        return;
    }
    for &nb in graph.neighbors(cur).into_iter().flatten() {
        if path.contains(&nb) {
            continue;
        }
        path.push(nb);
        walk(graph, end, hops, path, found, first_only);
        path.pop();
        if first_only && !found.is_empty() {
            return;
        }
    }
}

/// 一对有序 (source, destination) 的等价路由候选
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteCandidate {
    pub source: HostId,
    pub destination: HostId,
    /// 等长最短路径，均以 source 开头、destination 结尾
    pub paths: Vec<Vec<HostId>>,
    /// 路径节点数（含两端点）
    pub distance: usize,
}

impl RouteCandidate {
    /// 计算候选；不可达或 source == destination 时返回 None
    pub fn between(graph: &ReachabilityGraph, source: HostId, destination: HostId) -> Option<Self> {
        if source == destination {
            return None;
        }
        let paths = equal_cost_paths(graph, source, destination);
        let distance = paths.first()?.len();
        Some(Self {
            source,
            destination,
            paths,
            distance,
        })
    }

    /// 跳数（= 节点数 - 1），用作路由 metric
    pub fn hops(&self) -> usize {
        self.distance.saturating_sub(1)
    }

    /// 去重后的下一跳，保持发现顺序
    pub fn next_hops(&self) -> Vec<HostId> {
        let mut out: Vec<HostId> = Vec::new();
        for p in &self.paths {
            if let Some(&nh) = p.get(1) {
                if !out.contains(&nh) {
                    out.push(nh);
                }
            }
        }
        out
    }
}
