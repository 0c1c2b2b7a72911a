//! 拓扑描述解析
//!
//! 语法（每行一条，`#` 开头为注释，空行忽略）：
//!
//! ```text
//! LINE  = HOST [ "(" COUNT ")" ] ":" REACH { " " REACH }
//! REACH = N [ "-" M ] [ "[" RATE? { "," FIELD? } "]" ]     // 最多 4 个字段
//! ```
//!
//! 例如 `1: 2[10,,,100] 3 5-6[0.74,20,,10]`。括号内为 `[rate, limit, delay, loss]`，
//! 只约束本行主机指向这些目标的方向。除 `-` 两侧外，其余位置允许空格。
//!
//! 不合语法的行会被记录为 [`ParseError`] 并跳过，解析继续进行。

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;
use tracing::{debug, warn};

use super::topology::Topology;
use crate::net::{HostId, LinkSpec, LinkTable, ReachabilityGraph};

/// 解析期错误（均可恢复）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("line {line}: syntax error ({reason}): `{text}`")]
    Syntax {
        line: usize,
        text: String,
        reason: &'static str,
    },
    #[error("line {line}: descending range {first}-{last}")]
    DescendingRange { line: usize, first: u32, last: u32 },
    #[error("line {line}: host ids must be positive")]
    ZeroHost { line: usize },
    #[error("line {line}: host {host} cannot reach itself, edge dropped")]
    SelfLoop { line: usize, host: HostId },
}

impl ParseError {
    pub fn line(&self) -> usize {
        match self {
            ParseError::Syntax { line, .. }
            | ParseError::DescendingRange { line, .. }
            | ParseError::ZeroHost { line }
            | ParseError::SelfLoop { line, .. } => *line,
        }
    }
}

/// 解析结果：拓扑 + 被跳过/修正的行
#[derive(Debug, Clone, Default)]
pub struct ParsedTopology {
    pub topology: Topology,
    pub errors: Vec<ParseError>,
}

impl ParsedTopology {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
struct ReachDecl {
    first: u32,
    last: u32,
    spec: LinkSpec,
}

#[derive(Debug, Clone, PartialEq)]
struct LineDecl {
    host: u32,
    count: Option<u32>,
    reaches: Vec<ReachDecl>,
}

/// 解析拓扑文本，所有主机编号加上 `offset`
///
/// 如果文本中有 `[TOPOLOGY]` 段，只解析该段（到下一个 `[...]` 段头为止）。
pub fn parse_topology(text: &str, offset: u32) -> ParsedTopology {
    let mut errors = Vec::new();
    let mut asym: BTreeMap<HostId, BTreeSet<HostId>> = BTreeMap::new();
    let mut links = LinkTable::default();
    let mut ip_counts: BTreeMap<HostId, u32> = BTreeMap::new();

    for (line_no, raw) in topology_lines(text) {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let decl = match parse_line(line) {
            Ok(decl) => decl,
            Err(reason) => {
                warn!(line = line_no, text = line, reason, "拓扑行语法错误，跳过");
                errors.push(ParseError::Syntax {
                    line: line_no,
                    text: line.to_string(),
                    reason,
                });
                continue;
            }
        };

        let Some((host, count, edges)) = apply_line(line_no, line, &decl, offset, &mut errors)
        else {
            continue;
        };
        // 同一主机出现多行时取并集
        let reaches = asym.entry(host).or_default();
        for (to, spec) in edges {
            reaches.insert(to);
            links.insert(host, to, spec);
        }
        ip_counts.insert(host, count);
    }

    let graph = ReachabilityGraph::from_declared(asym.iter().map(|(h, s)| (*h, s)));
    for host in graph.hosts() {
        ip_counts.entry(host).or_insert(1);
    }
    debug!(
        hosts = graph.len(),
        edges = graph.edge_count(),
        errors = errors.len(),
        "拓扑解析完成"
    );

    ParsedTopology {
        topology: Topology {
            graph,
            links,
            ip_counts,
        },
        errors,
    }
}

/// 校验一行并展开范围；整行被拒绝时返回 None
fn apply_line(
    line_no: usize,
    line: &str,
    decl: &LineDecl,
    offset: u32,
    errors: &mut Vec<ParseError>,
) -> Option<(HostId, u32, Vec<(HostId, LinkSpec)>)> {
    if decl.host == 0 || decl.reaches.iter().any(|r| r.first == 0) {
        errors.push(ParseError::ZeroHost { line: line_no });
        return None;
    }
    if let Some(r) = decl.reaches.iter().find(|r| r.last < r.first) {
        warn!(line = line_no, first = r.first, last = r.last, "范围递减，跳过该行");
        errors.push(ParseError::DescendingRange {
            line: line_no,
            first: r.first,
            last: r.last,
        });
        return None;
    }

    let overflow = || ParseError::Syntax {
        line: line_no,
        text: line.to_string(),
        reason: "host id overflows with offset",
    };
    let Some(host) = HostId::with_offset(decl.host, offset) else {
        errors.push(overflow());
        return None;
    };

    let mut edges = Vec::new();
    for r in &decl.reaches {
        for raw in r.first..=r.last {
            let Some(to) = HostId::with_offset(raw, offset) else {
                errors.push(overflow());
                return None;
            };
            if to == host {
                errors.push(ParseError::SelfLoop { line: line_no, host });
                continue;
            }
            edges.push((to, r.spec));
        }
    }

    let count = decl.count.filter(|&c| c >= 1).unwrap_or(1);
    Some((host, count, edges))
}

/// 选出需要解析的行（带 1 起始的行号）
fn topology_lines(text: &str) -> Vec<(usize, &str)> {
    let numbered: Vec<(usize, &str)> = text.lines().enumerate().map(|(i, l)| (i + 1, l)).collect();
    let Some(start) = numbered.iter().position(|(_, l)| l.trim() == "[TOPOLOGY]") else {
        return numbered;
    };
    numbered[start + 1..]
        .iter()
        .copied()
        .take_while(|(_, l)| !is_section_header(l))
        .collect()
}

fn is_section_header(line: &str) -> bool {
    let t = line.trim();
    t.starts_with('[') && t.ends_with(']')
}

struct Cursor<'a> {
    s: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(s: &'a str) -> Self {
        Self { s: s.as_bytes(), pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.s.get(self.pos).copied()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.s.len()
    }

    fn eat(&mut self, b: u8) -> bool {
        if self.peek() == Some(b) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// 跳过空格，返回跳过的个数
    fn spaces(&mut self) -> usize {
        let start = self.pos;
        while self.peek() == Some(b' ') {
            self.pos += 1;
        }
        self.pos - start
    }

    fn digits(&mut self) -> Option<&'a str> {
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.pos == start {
            return None;
        }
        std::str::from_utf8(&self.s[start..self.pos]).ok()
    }

    fn int(&mut self) -> Result<Option<u32>, &'static str> {
        match self.digits() {
            None => Ok(None),
            Some(d) => d.parse().map(Some).map_err(|_| "integer out of range"),
        }
    }

    /// `INT [ "." INT ]`
    fn float(&mut self) -> Result<Option<f64>, &'static str> {
        let start = self.pos;
        if self.digits().is_none() {
            return Ok(None);
        }
        if self.eat(b'.') && self.digits().is_none() {
            return Err("expected digits after decimal point");
        }
        std::str::from_utf8(&self.s[start..self.pos])
            .ok()
            .and_then(|t| t.parse().ok())
            .map(Some)
            .ok_or("invalid rate")
    }
}

fn parse_line(line: &str) -> Result<LineDecl, &'static str> {
    let mut c = Cursor::new(line);

    let host = c.int()?.ok_or("expected host number")?;
    c.spaces();
    let count = if c.eat(b'(') {
        let n = c.int()?;
        if !c.eat(b')') {
            return Err("unterminated ip count");
        }
        c.spaces();
        n
    } else {
        None
    };
    if !c.eat(b':') {
        return Err("expected `:` after host");
    }
    c.spaces();

    let mut reaches = Vec::new();
    loop {
        reaches.push(parse_reach(&mut c)?);
        let sep = c.spaces();
        if c.at_end() {
            break;
        }
        if sep == 0 {
            return Err("reach entries must be separated by spaces");
        }
    }

    Ok(LineDecl {
        host,
        count,
        reaches,
    })
}

fn parse_reach(c: &mut Cursor<'_>) -> Result<ReachDecl, &'static str> {
    let first = c.int()?.ok_or("expected reachable host")?;
    let last = if c.eat(b'-') {
        c.int()?.ok_or("expected range end after `-`")?
    } else {
        first
    };

    let mut spec = LinkSpec::default();
    if c.eat(b'[') {
        spec.rate = c.float()?;
        let mut fields = [None; 3];
        for field in fields.iter_mut() {
            if !c.eat(b',') {
                break;
            }
            *field = c.int()?;
        }
        if !c.eat(b']') {
            return Err("malformed link parameters");
        }
        let [limit, delay, loss] = fields;
        spec.limit = limit;
        spec.delay = delay;
        spec.loss = loss;
    }

    Ok(ReachDecl { first, last, spec })
}
