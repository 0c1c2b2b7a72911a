//! 角色解析
//!
//! 把主机的角色集合与本次调用的仿真参数结合起来，决定该主机前向/反向各挂
//! 什么 netem 参数，以及是否需要修改瓶颈带宽。同一方向的多个指令累加到同一个
//! 描述符里，每台主机每次调用最多产生一个前向描述符和一个反向描述符。

use std::fmt;

use tracing::{debug, warn};

use super::params::EmulationParams;
use super::tags::{Role, RoleSet};

/// 时延抖动的相关系数（百分比）
pub const JITTER_CORRELATION_PCT: u32 = 20;

/// `X ms ± 10%`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Jittered {
    pub ms: u32,
    pub jitter_ms: u32,
}

impl Jittered {
    /// 整数部分截断，抖动取 10% 后截断
    pub fn from_ms(ms: f64) -> Self {
        Self {
            ms: ms.max(0.0) as u32,
            jitter_ms: (ms.max(0.0) * 0.1) as u32,
        }
    }
}

impl fmt::Display for Jittered {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms {}ms {}%", self.ms, self.jitter_ms, JITTER_CORRELATION_PCT)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reorder {
    pub pct: u32,
    /// 0% 时不带 reorderdelay
    pub delay: Option<Jittered>,
}

impl Reorder {
    /// `base_ms` 为乱序包的额外时延，抖动按 `jitter_base_ms` 的 10% 计算
    fn new(pct: u32, base_ms: f64, jitter_base_ms: f64) -> Self {
        if pct == 0 {
            return Self { pct, delay: None };
        }
        Self {
            pct,
            delay: Some(Jittered {
                ms: base_ms.max(0.0) as u32,
                jitter_ms: (jitter_base_ms.max(0.0) * 0.1) as u32,
            }),
        }
    }
}

/// 一个 netem 叶子队列的参数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetemDescriptor {
    pub limit: Option<u32>,
    pub delay: Option<Jittered>,
    pub reorder: Option<Reorder>,
    pub drop_pct: Option<u32>,
}

impl NetemDescriptor {
    pub fn is_empty(&self) -> bool {
        self.limit.is_none()
            && self.delay.is_none()
            && self.reorder.is_none()
            && self.drop_pct.is_none()
    }
}

/// 渲染为 `netem` 之后的参数串，例如 `limit 50 delay 20ms 2ms 20% drop 1%`
impl fmt::Display for NetemDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::new();
        if let Some(limit) = self.limit {
            parts.push(format!("limit {limit}"));
        }
        if let Some(delay) = self.delay {
            parts.push(format!("delay {delay}"));
        }
        if let Some(r) = self.reorder {
            match r.delay {
                Some(d) => parts.push(format!("reorder {}% reorderdelay {d}", r.pct)),
                None => parts.push(format!("reorder {}%", r.pct)),
            }
        }
        if let Some(p) = self.drop_pct {
            parts.push(format!("drop {p}%"));
        }
        f.write_str(&parts.join(" "))
    }
}

/// 为兼容旧脚本行为保留的开关
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quirks {
    /// 时延带小数时，反向路径比前向多 1ms（前向截断、反向进位）
    pub reverse_delay_round_up: bool,
    /// ACK 丢包指令覆盖整个反向描述符，而不是追加
    pub ack_loss_overwrites_reverse: bool,
}

impl Default for Quirks {
    fn default() -> Self {
        Self {
            reverse_delay_round_up: true,
            ack_loss_overwrites_reverse: false,
        }
    }
}

/// 生成指令时遇到的可恢复问题
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DirectiveIssue {
    /// 队列节点既没有带宽也没有队列长度；`fallback` 为实际采用的默认带宽
    MissingShapingInfo { fallback: Option<f64> },
}

/// 单台主机在一次调用中的全部指令
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostDirectives {
    /// 两个方向 class 的新带宽（Mbit/s）
    pub bandwidth_mbit: Option<f64>,
    pub forward: Option<NetemDescriptor>,
    pub reverse: Option<NetemDescriptor>,
    pub issues: Vec<DirectiveIssue>,
}

impl HostDirectives {
    pub fn is_empty(&self) -> bool {
        self.bandwidth_mbit.is_none() && self.forward.is_none() && self.reverse.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RoleResolver {
    quirks: Quirks,
    fallback_rate_mbit: Option<f64>,
}

impl RoleResolver {
    pub fn new(quirks: Quirks) -> Self {
        Self {
            quirks,
            fallback_rate_mbit: None,
        }
    }

    /// 队列节点缺少带宽/队列信息时使用的默认带宽
    pub fn with_fallback_rate(mut self, mbit: Option<f64>) -> Self {
        self.fallback_rate_mbit = mbit;
        self
    }

    pub fn resolve(&self, roles: RoleSet, params: &EmulationParams) -> HostDirectives {
        let mut out = HostDirectives::default();
        let mut fwd = NetemDescriptor::default();
        let mut rev = NetemDescriptor::default();

        let delay = params.delay_ms;
        let rdelay = f64::from(params.reorder_delay_ms.unwrap_or(0));

        if roles.contains(Role::QueueLimit) {
            if params.queue_limit.is_none() && params.bottleneck_mbit.is_none() {
                warn!(%roles, fallback = ?self.fallback_rate_mbit, "队列节点缺少带宽/队列长度");
                out.issues.push(DirectiveIssue::MissingShapingInfo {
                    fallback: self.fallback_rate_mbit,
                });
                out.bandwidth_mbit = self.fallback_rate_mbit;
            } else {
                out.bandwidth_mbit = params.bottleneck_mbit;
                fwd.limit = params.queue_limit;
                rev.limit = params.queue_limit;
            }
        }

        if let (true, Some(d)) = (roles.contains(Role::ForwardDelay), delay) {
            fwd.delay = Some(Jittered::from_ms(d));
        }

        if let (true, Some(pct)) = (roles.contains(Role::ForwardReorder), params.reorder_pct) {
            fwd.reorder = Some(Reorder::new(pct, rdelay, rdelay));
        }

        if let (true, Some(d)) = (roles.contains(Role::ReverseDelay), delay) {
            let d = if self.quirks.reverse_delay_round_up && d.fract() != 0.0 {
                d + 1.0
            } else {
                d
            };
            rev.delay = Some(Jittered::from_ms(d));
        }

        if let (true, Some(pct)) = (roles.contains(Role::ReverseReorder), params.ack_reorder_pct) {
            let base = rdelay + delay.unwrap_or(0.0);
            rev.reorder = Some(Reorder::new(pct, base, rdelay));
        }

        if let (true, Some(pct)) = (roles.contains(Role::AckLoss), params.ack_loss_pct) {
            if self.quirks.ack_loss_overwrites_reverse {
                rev = NetemDescriptor {
                    drop_pct: Some(pct),
                    ..NetemDescriptor::default()
                };
            } else {
                rev.drop_pct = Some(pct);
            }
        }

        out.forward = (!fwd.is_empty()).then_some(fwd);
        out.reverse = (!rev.is_empty()).then_some(rev);
        debug!(%roles, forward = ?out.forward, reverse = ?out.reverse, "角色解析完成");
        out
    }
}
