use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!(
        "vmnet-rs-{prefix}-{}-{nanos}",
        std::process::id()
    ));
    fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn write_file(dir: &PathBuf, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).expect("write temp file");
    path
}

const TOPOLOGY: &str = "\
# dumbbell with two routers
1: 2
2: 3[10,50]
3: 4
";

const TESTBED: &str = r#"
{
    "hosts": [
        { "id": 1, "mip": "mgmt1", "eip": "10.0.0.1", "kind": "src" },
        { "id": 2, "mip": "mgmt2", "eip": "10.0.0.2", "roles": ["qlnode"] },
        { "id": 3, "mip": "mgmt3", "eip": "10.0.0.3", "roles": ["rdnode", "fdnode"] },
        { "id": 4, "mip": "mgmt4", "eip": "10.0.0.4", "kind": "dst" }
    ],
    "pairs": [ { "src": 1, "dst": 4 } ]
}
"#;

fn build_net(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_build_net"))
        .args(args)
        .output()
        .expect("run build_net")
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "stdout:\n{}\nstderr:\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn add_prints_commands_prefixed_by_management_address() {
    let dir = unique_temp_dir("add");
    let topo = write_file(&dir, "topology.txt", TOPOLOGY);
    let testbed = write_file(&dir, "testbed.json", TESTBED);

    let output = build_net(&[
        "--topology",
        topo.to_str().unwrap(),
        "--testbed",
        testbed.to_str().unwrap(),
    ]);
    assert_success(&output);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(stdout.contains("[mgmt2] tc qdisc del dev eth0 root"));
    assert!(stdout.contains("[mgmt2] tc class add dev eth0 parent 1: classid 1:1 htb rate 10mbit"));
    assert!(stdout.contains("[mgmt2] tc qdisc add dev eth0 parent 1:1 handle 10: netem limit 50"));
    assert!(stdout.contains("[mgmt1] sysctl -w net.ipv4.conf.eth0.forwarding=1"));
    assert!(stdout.contains("[mgmt1] ip route replace 10.0.0.4 via 10.0.0.2 dev eth0 metric 3"));
    assert!(stdout.lines().all(|l| l.starts_with("[mgmt")));
}

#[test]
fn multipath_flag_writes_policy_tables() {
    let dir = unique_temp_dir("multipath");
    let topo = write_file(&dir, "topology.txt", TOPOLOGY);
    let testbed = write_file(&dir, "testbed.json", TESTBED);

    let output = build_net(&[
        "--topology",
        topo.to_str().unwrap(),
        "--testbed",
        testbed.to_str().unwrap(),
        "--static-routes",
        "--multipath",
    ]);
    assert_success(&output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[mgmt1] ip route replace 10.0.0.4 nexthop via 10.0.0.2 dev eth0\n"));
    assert!(stdout.contains("[mgmt1] ip route replace 10.0.0.4 via 10.0.0.2 dev eth0 table 300\n"));
    assert!(!stdout.contains("metric"));
    assert!(!stdout.contains("tc "));
}

#[test]
fn json_output_with_schedule_has_one_batch_per_step() {
    let dir = unique_temp_dir("schedule");
    let topo = write_file(&dir, "topology.txt", TOPOLOGY);
    let testbed = write_file(&dir, "testbed.json", TESTBED);
    let schedule = write_file(
        &dir,
        "schedule.json",
        r#"{ "interval_secs": 10, "steps": [ { "delay_ms": 20.5 }, { "delay_ms": 40 } ] }"#,
    );

    let output = build_net(&[
        "--topology",
        topo.to_str().unwrap(),
        "--testbed",
        testbed.to_str().unwrap(),
        "--traffic-shape",
        "--schedule",
        schedule.to_str().unwrap(),
        "--json",
    ]);
    assert_success(&output);
    let v: Value = serde_json::from_slice(&output.stdout).expect("parse json output");
    let cmds = v.as_array().expect("array");
    assert!(!cmds.is_empty());
    assert!(cmds.iter().all(|c| c["stage"] != "route"));

    let step = |batch: u64, host: u64| -> Vec<String> {
        cmds.iter()
            .filter(|c| c["batch"] == batch && c["host"] == host)
            .filter_map(|c| c["command"].as_str().map(str::to_string))
            .collect()
    };
    assert_eq!(
        step(1, 3),
        vec![
            "tc qdisc add dev eth0 parent 1:1 handle 10: netem delay 21ms 2ms 20%",
            "tc qdisc add dev eth0 parent 1:2 handle 20: netem delay 20ms 2ms 20%",
        ]
    );
    assert_eq!(
        step(2, 3),
        vec![
            "tc qdisc change dev eth0 parent 1:1 handle 10: netem delay 40ms 4ms 20%",
            "tc qdisc change dev eth0 parent 1:2 handle 20: netem delay 40ms 4ms 20%",
        ]
    );
    let first = &cmds[0];
    assert_eq!(first["target"], "mgmt1");
    assert_eq!(first["may_fail"], true);
}

#[test]
fn dry_run_prints_dot_and_writes_viz_json() {
    let dir = unique_temp_dir("dry-run");
    let topo = write_file(&dir, "topology.txt", TOPOLOGY);
    let viz = dir.join("viz.json");

    let output = build_net(&[
        "--topology",
        topo.to_str().unwrap(),
        "--dry-run",
        "--viz-json",
        viz.to_str().unwrap(),
    ]);
    assert_success(&output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("digraph G {"));
    assert!(stdout.contains("2 -> 3 [label=\"[10,50]\"]"));
    assert!(!stdout.contains("tc "));

    let raw = fs::read_to_string(&viz).expect("read viz json");
    let v: Value = serde_json::from_str(&raw).expect("parse viz json");
    assert_eq!(v["hosts"].as_array().map(Vec::len), Some(4));
    assert_eq!(v["links"].as_array().map(Vec::len), Some(6));
}

#[test]
fn inconsistent_testbed_fails() {
    let dir = unique_temp_dir("too-few");
    let topo = write_file(&dir, "topology.txt", TOPOLOGY);
    let testbed = write_file(
        &dir,
        "testbed.json",
        r#"{ "hosts": [ { "id": 1, "mip": "mgmt1", "eip": "10.0.0.1" } ] }"#,
    );

    let output = build_net(&[
        "--topology",
        topo.to_str().unwrap(),
        "--testbed",
        testbed.to_str().unwrap(),
    ]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("less than the number of hosts"), "stderr: {stderr}");
    assert!(output.stdout.is_empty());
}

#[test]
fn unknown_action_fails() {
    let dir = unique_temp_dir("bad-action");
    let topo = write_file(&dir, "topology.txt", TOPOLOGY);
    let testbed = write_file(&dir, "testbed.json", TESTBED);
    let output = build_net(&[
        "--topology",
        topo.to_str().unwrap(),
        "--testbed",
        testbed.to_str().unwrap(),
        "--action",
        "explode",
    ]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown action"));
}

#[test]
fn bad_topology_lines_are_reported_and_skipped() {
    let dir = unique_temp_dir("bad-lines");
    let broken = write_file(&dir, "broken.txt", "1: 2\n2: 3\n3: 5-4\nthis is garbage\n");
    let output = build_net(&["--topology", broken.to_str().unwrap(), "--dry-run"]);
    assert_success(&output);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("descending range"), "stderr: {stderr}");
    assert!(stderr.contains("line 4"), "stderr: {stderr}");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("  1 -> 2\n"));
    assert!(stdout.contains("  2 -> 3\n"));
    assert!(!stdout.contains("-> 5"));
}

#[test]
fn change_without_params_is_rejected() {
    let dir = unique_temp_dir("change");
    let topo = write_file(&dir, "topology.txt", TOPOLOGY);
    let testbed = write_file(&dir, "testbed.json", TESTBED);
    let output = build_net(&[
        "--topology",
        topo.to_str().unwrap(),
        "--testbed",
        testbed.to_str().unwrap(),
        "--action",
        "change",
    ]);
    assert!(!output.status.success());

    let params = write_file(
        &dir,
        "params.json",
        r#"{ "bottleneck_mbit": 20, "queue_limit": 100 }"#,
    );
    let output = build_net(&[
        "--topology",
        topo.to_str().unwrap(),
        "--testbed",
        testbed.to_str().unwrap(),
        "--action",
        "shaped",
        "--params",
        params.to_str().unwrap(),
    ]);
    assert_success(&output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!stdout.contains("root"));
    assert!(
        stdout.contains("[mgmt2] tc class change dev eth0 parent 1: classid 1:2 htb rate 20mbit")
    );
    assert!(stdout.contains("[mgmt2] tc qdisc add dev eth0 parent 1:2 handle 20: netem limit 100"));
}
