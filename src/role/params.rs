use serde::{Deserialize, Serialize};

/// 单次调用的仿真参数
///
/// 不属于静态拓扑，同一张图会用不同的值反复整形。`None` 表示不动这一项，
/// 百分比取 `Some(0)` 表示显式关闭。
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EmulationParams {
    /// 前向乱序（%）
    #[serde(default)]
    pub reorder_pct: Option<u32>,
    /// 反向（ACK）乱序（%）
    #[serde(default)]
    pub ack_reorder_pct: Option<u32>,
    /// 乱序包的额外时延（ms）
    #[serde(default)]
    pub reorder_delay_ms: Option<u32>,
    /// 单向时延（ms），可以是小数，例如 `20.5`
    #[serde(default)]
    pub delay_ms: Option<f64>,
    /// 反向丢包（%）
    #[serde(default)]
    pub ack_loss_pct: Option<u32>,
    /// 队列上限（包）
    #[serde(default)]
    pub queue_limit: Option<u32>,
    /// 瓶颈带宽（Mbit/s）
    #[serde(default)]
    pub bottleneck_mbit: Option<f64>,
}

/// 依次应用的参数序列：先 ADD 一次，之后逐步 CHANGE
///
/// 何时应用下一步由调用方决定，`interval_secs` 只是随配置带上。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmulationSchedule {
    #[serde(default)]
    pub interval_secs: Option<u64>,
    pub steps: Vec<EmulationParams>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ScheduleFile {
    Steps(Vec<EmulationParams>),
    // 必须排在 Single 之前：EmulationParams 的字段全部可选
    Full(EmulationSchedule),
    Single(EmulationParams),
}

impl EmulationSchedule {
    /// 接受完整对象、裸步骤数组或单个参数对象
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        Ok(match serde_json::from_str::<ScheduleFile>(raw)? {
            ScheduleFile::Full(s) => s,
            ScheduleFile::Steps(steps) => EmulationSchedule {
                interval_secs: None,
                steps,
            },
            ScheduleFile::Single(p) => EmulationSchedule {
                interval_secs: None,
                steps: vec![p],
            },
        })
    }
}
