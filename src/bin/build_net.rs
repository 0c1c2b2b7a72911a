//! build_net：把拓扑文件和测试床配置编译成 tc / ip route 命令
//!
//! 默认只打印命令（`[管理地址] 命令`），不连接任何主机。

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use vmnet_rs::dispatch::{DryRunDispatcher, dispatch_plan};
use vmnet_rs::role::{EmulationParams, EmulationSchedule, Quirks, RoleResolver};
use vmnet_rs::route::{RouteMode, RouteOptions, RoutingCompiler};
use vmnet_rs::tc::{
    Action, CommandPlan, Stage, TcError, TcOptions, TcRequest, TopologyMode, TrafficControlCompiler,
};
use vmnet_rs::testbed::{ConfigError, Testbed, TestbedSpec};
use vmnet_rs::topo::{Topology, parse_topology};
use vmnet_rs::viz::{TopologyView, to_dot};

#[derive(Debug, Parser)]
#[command(
    name = "build_net",
    about = "Compile a virtual network topology into tc and ip route commands"
)]
struct Args {
    /// 邻接表文件（可以是带 [TOPOLOGY] 段的配置文件）
    #[arg(long)]
    topology: PathBuf,

    /// 测试床 JSON：主机地址、角色、测量流
    #[arg(long)]
    testbed: Option<PathBuf>,

    #[arg(short, long, default_value = "eth0")]
    interface: String,

    /// 拓扑文件中的主机编号整体加上该偏移
    #[arg(short, long, default_value_t = 0)]
    offset: u32,

    /// 链路未指定带宽时使用的默认带宽（Mbit/s）
    #[arg(short = 'R', long)]
    rate: Option<f64>,

    /// 只编译流量整形
    #[arg(short, long)]
    traffic_shape: bool,

    /// 只编译静态路由
    #[arg(short, long)]
    static_routes: bool,

    /// 启用等价多路径；可选参数为每个目的最多使用的路径数
    #[arg(short = 'p', long, num_args = 0..=1, value_name = "NUM")]
    multipath: Option<Option<usize>>,

    /// 在已有的多拓扑根队列上追加本拓扑
    #[arg(short = 'e', long, conflicts_with = "multiple_topology_reset")]
    multiple_topology: bool,

    /// 删除根队列后按多拓扑编号重建
    #[arg(short = 'E', long)]
    multiple_topology_reset: bool,

    /// add | change | reset（shaped 等同于 change）
    #[arg(long, default_value = "add")]
    action: String,

    /// 仿真参数 JSON，change 时必需
    #[arg(long)]
    params: Option<PathBuf>,

    /// 仿真参数序列 JSON，ADD 之后逐步编译为 CHANGE 批次
    #[arg(long)]
    schedule: Option<PathBuf>,

    /// 只解析和校验，打印 DOT
    #[arg(short = 'y', long)]
    dry_run: bool,

    /// 同时打印 DOT
    #[arg(long)]
    dot: bool,

    /// 以 JSON 数组输出命令
    #[arg(long)]
    json: bool,

    /// 输出拓扑 JSON 视图
    #[arg(long)]
    viz_json: Option<PathBuf>,

    #[arg(long)]
    no_reverse_delay_round_up: bool,

    #[arg(long)]
    ack_loss_overwrites: bool,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("--testbed is required unless --dry-run is given")]
    MissingTestbed,
    #[error("interface `{0}` has no numeric suffix for multi-topology numbering")]
    InterfaceNumber(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Tc(#[from] TcError),
    #[error("encode output: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct JsonCommand<'a> {
    batch: usize,
    host: u32,
    target: &'a str,
    stage: Stage,
    command: &'a str,
    may_fail: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn read(path: &Path) -> Result<String, CliError> {
    fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn load_topology(args: &Args) -> Result<Topology, CliError> {
    let parsed = parse_topology(&read(&args.topology)?, args.offset);
    // 坏行只报告，其余行照常使用
    for e in &parsed.errors {
        warn!(line = e.line(), error = %e, "拓扑行被跳过");
        eprintln!("{}: {e}", args.topology.display());
    }
    info!(
        hosts = parsed.topology.graph.len(),
        edges = parsed.topology.graph.edge_count(),
        skipped = parsed.errors.len(),
        "拓扑已加载"
    );
    Ok(parsed.topology)
}

fn load_testbed(path: &Path, topology: &Topology) -> Result<Testbed, CliError> {
    let spec = TestbedSpec::from_json(&read(path)?).map_err(|source| CliError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Testbed::resolve(&spec, topology)?)
}

fn load_schedule(args: &Args) -> Result<Option<EmulationSchedule>, CliError> {
    let (path, single) = match (&args.schedule, &args.params) {
        (Some(p), _) => (p, false),
        (None, Some(p)) => (p, true),
        (None, None) => return Ok(None),
    };
    let raw = read(path)?;
    let json_err = |source: serde_json::Error| CliError::Json {
        path: path.clone(),
        source,
    };
    let schedule = if single {
        let params: EmulationParams = serde_json::from_str(&raw).map_err(json_err)?;
        EmulationSchedule {
            interval_secs: None,
            steps: vec![params],
        }
    } else {
        EmulationSchedule::from_json(&raw).map_err(json_err)?
    };
    Ok(Some(schedule))
}

fn tc_options(args: &Args) -> Result<TcOptions, CliError> {
    let multi = args.multiple_topology || args.multiple_topology_reset;
    let mode = if multi {
        TopologyMode::multi_for_iface(&args.interface)
            .ok_or_else(|| CliError::InterfaceNumber(args.interface.clone()))?
    } else {
        TopologyMode::Single
    };
    Ok(TcOptions {
        iface: args.interface.clone(),
        mode,
        // 单拓扑每次都重建根队列；多拓扑只有显式要求时才删除
        reset_root: !args.multiple_topology,
        default_rate_mbit: args.rate,
        ..TcOptions::default()
    })
}

fn compile(
    args: &Args,
    topology: &Topology,
    testbed: &Testbed,
) -> Result<Vec<CommandPlan>, CliError> {
    let action: Action = args.action.parse()?;
    let both = !args.traffic_shape && !args.static_routes;
    let schedule = load_schedule(args)?;
    let mut batches = Vec::new();

    if args.traffic_shape || both {
        let quirks = Quirks {
            reverse_delay_round_up: !args.no_reverse_delay_round_up,
            ack_loss_overwrites_reverse: args.ack_loss_overwrites,
        };
        let resolver = RoleResolver::new(quirks).with_fallback_rate(args.rate);
        let mut tc = TrafficControlCompiler::new(tc_options(args)?, resolver);
        let req = TcRequest {
            topology,
            testbed,
            params: None,
        };
        match action {
            Action::Add => batches.push(tc.run(Action::Add, &req)?),
            Action::Change => tc.adopt_existing(&req),
            Action::Reset => batches.push(tc.run(Action::Reset, &req)?),
        }
        if action != Action::Reset {
            match &schedule {
                Some(schedule) => batches.extend(tc.compile_schedule(&req, schedule)?),
                None if action == Action::Change => {
                    return Err(TcError::MissingParams(Action::Change).into());
                }
                None => {}
            }
        }
    }

    if (args.static_routes || both) && action == Action::Add {
        let routes = RoutingCompiler::new(RouteOptions {
            iface: args.interface.clone(),
            mode: match args.multipath {
                Some(max_paths) => RouteMode::Multipath { max_paths },
                None => RouteMode::Single,
            },
            ..RouteOptions::default()
        })
        .compile(topology, testbed);
        match batches.first_mut() {
            Some(first) => first.append(routes),
            None => batches.push(routes),
        }
    }
    Ok(batches)
}

fn print_json(batches: &[CommandPlan], testbed: &Testbed) -> Result<(), CliError> {
    let mut out = Vec::new();
    for (batch, plan) in batches.iter().enumerate() {
        for (host, cmds) in plan.by_host() {
            let target = testbed.management(host).unwrap_or_default();
            out.extend(cmds.into_iter().map(|c| JsonCommand {
                batch,
                host: host.0,
                target,
                stage: c.stage,
                command: &c.command,
                may_fail: c.may_fail,
            }));
        }
    }
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn run(args: &Args) -> Result<(), CliError> {
    let topology = load_topology(args)?;
    let testbed = match &args.testbed {
        Some(path) => Some(load_testbed(path, &topology)?),
        None if args.dry_run => None,
        None => return Err(CliError::MissingTestbed),
    };

    if let Some(path) = &args.viz_json {
        let json = TopologyView::build(&topology, testbed.as_ref()).to_json()?;
        fs::write(path, json).map_err(|source| CliError::Write {
            path: path.clone(),
            source,
        })?;
        info!(path = %path.display(), "拓扑视图已写出");
    }

    if args.dry_run || args.dot {
        print!("{}", to_dot(&topology));
    }
    let Some(testbed) = testbed.filter(|_| !args.dry_run) else {
        return Ok(());
    };

    let batches = compile(args, &topology, &testbed)?;
    for plan in &batches {
        for w in &plan.warnings {
            warn!(host = %w.host, kind = ?w.kind, "编译警告");
        }
    }

    if args.json {
        return print_json(&batches, &testbed);
    }
    let mut printer = DryRunDispatcher::stdout();
    for (i, plan) in batches.iter().enumerate() {
        if batches.len() > 1 {
            println!("# batch {i}");
        }
        let report = dispatch_plan(plan, &testbed, &mut printer);
        if !report.is_success() {
            warn!(failed = report.failures.len(), "部分主机未能输出");
        }
    }
    Ok(())
}
