//! 链路参数
//!
//! 记录拓扑文件中每条（有向）链路声明的仿真参数。

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::id::HostId;

/// 单向链路参数 `[rate, limit, delay, loss]`
///
/// 字段缺失表示“未指定”，而不是 0。
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LinkSpec {
    /// 带宽（Mbit/s）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
    /// 队列长度（packets）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    /// 时延（ms）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<u32>,
    /// 丢包率（百分比）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loss: Option<u32>,
}

impl LinkSpec {
    pub fn is_empty(&self) -> bool {
        self.rate.is_none() && self.limit.is_none() && self.delay.is_none() && self.loss.is_none()
    }

    /// 是否需要在该链路上挂 netem 叶子队列
    pub fn needs_netem(&self) -> bool {
        self.limit.is_some() || self.delay.is_some() || self.loss.is_some()
    }
}

/// 以拓扑文件中的括号语法输出，省略末尾的空字段
impl fmt::Display for LinkSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = [
            self.rate.map(fmt_rate),
            self.limit.map(|v| v.to_string()),
            self.delay.map(|v| v.to_string()),
            self.loss.map(|v| v.to_string()),
        ];
        let used = fields.iter().rposition(Option::is_some).map_or(0, |i| i + 1);
        let body: Vec<&str> = fields[..used]
            .iter()
            .map(|v| v.as_deref().unwrap_or(""))
            .collect();
        write!(f, "[{}]", body.join(","))
    }
}

/// 带宽按 tc 习惯输出：整数值不带小数点（`10`），否则保留原样（`1.5`）
pub fn fmt_rate(rate: f64) -> String {
    format!("{rate}")
}

/// 有向链路参数表：`links[a][b]` 为 a 那一行对 b 声明的参数
///
/// 参数只作用于声明方向，不做对称化。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkTable {
    links: BTreeMap<HostId, BTreeMap<HostId, LinkSpec>>,
}

impl LinkTable {
    pub fn insert(&mut self, from: HostId, to: HostId, spec: LinkSpec) {
        self.links.entry(from).or_default().insert(to, spec);
    }

    pub fn get(&self, from: HostId, to: HostId) -> Option<&LinkSpec> {
        self.links.get(&from).and_then(|m| m.get(&to))
    }

    pub fn iter(&self) -> impl Iterator<Item = (HostId, HostId, &LinkSpec)> + '_ {
        self.links
            .iter()
            .flat_map(|(from, m)| m.iter().map(move |(to, spec)| (*from, *to, spec)))
    }

    pub fn len(&self) -> usize {
        self.links.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
