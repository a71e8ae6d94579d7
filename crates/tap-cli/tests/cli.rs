use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// Braess network: 10x on 1->2 and 3->4, 50+x on 1->3 and 2->4, 10+x on 2->3
const BRAESS_NET: &str = "\
<NUMBER OF ZONES> 4
<NUMBER OF NODES> 4
<FIRST THRU NODE> 1
<NUMBER OF LINKS> 5
<END OF METADATA>

~ init term cap length fftt b power speed toll type ;
\t1\t2\t1\t0\t1e-9\t1e10\t1\t0\t0\t1\t;
\t1\t3\t1\t0\t50\t0.02\t1\t0\t0\t1\t;
\t2\t4\t1\t0\t50\t0.02\t1\t0\t0\t1\t;
\t3\t4\t1\t0\t1e-9\t1e10\t1\t0\t0\t1\t;
\t2\t3\t1\t0\t10\t0.1\t1\t0\t0\t1\t;
";

const BRAESS_TRIPS: &str = "\
<NUMBER OF ZONES> 4
<TOTAL OD FLOW> 6.0
<END OF METADATA>

Origin 1
    4 :      6.0;
";

fn fixture() -> (TempDir, PathBuf, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let net = dir.path().join("braess_net.tntp");
    let trips = dir.path().join("braess_trips.tntp");
    fs::write(&net, BRAESS_NET).unwrap();
    fs::write(&trips, BRAESS_TRIPS).unwrap();
    (dir, net, trips)
}

/// Parse the `flow` column of TSV output.
fn flows(tsv: &str) -> Vec<f64> {
    let mut lines = tsv.lines();
    assert_eq!(lines.next(), Some("from\tto\tflow\tcost"));
    lines
        .map(|line| line.split('\t').nth(2).unwrap().parse().unwrap())
        .collect()
}

fn assert_braess_equilibrium(flows: &[f64]) {
    let expected = [4.0, 2.0, 2.0, 4.0, 2.0];
    assert_eq!(flows.len(), expected.len());
    for (got, want) in flows.iter().zip(expected) {
        assert!((got - want).abs() < 1e-3, "flows {flows:?}");
    }
}

fn solve(args: &[&str], net: &Path, trips: &Path) -> String {
    let output = cargo_bin_cmd!("tap")
        .arg(net)
        .arg(trips)
        .args(["--convergence-gap", "1e-10"])
        .args(args)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    String::from_utf8(output.stdout).unwrap()
}

#[test]
fn solves_braess_to_stdout() {
    let (_dir, net, trips) = fixture();
    let stdout = solve(&[], &net, &trips);
    assert_braess_equilibrium(&flows(&stdout));
}

#[test]
fn jacobi_sweep_reaches_same_flows() {
    let (_dir, net, trips) = fixture();
    let stdout = solve(&["--sweep", "jacobi", "--threads", "2"], &net, &trips);
    assert_braess_equilibrium(&flows(&stdout));
}

#[test]
fn writes_flows_to_file() {
    let (dir, net, trips) = fixture();
    let out = dir.path().join("flows.tsv");
    let stdout = solve(&["--out", out.to_str().unwrap()], &net, &trips);
    assert!(stdout.is_empty());
    assert_braess_equilibrium(&flows(&fs::read_to_string(&out).unwrap()));
}

#[test]
fn unwritable_output_path_is_reported() {
    let (dir, net, trips) = fixture();
    for format in ["tsv", "table"] {
        let out = dir.path().join("no_such_dir").join("flows.tsv");
        cargo_bin_cmd!("tap")
            .arg(&net)
            .arg(&trips)
            .args(["--format", format, "--out", out.to_str().unwrap()])
            .assert()
            .failure()
            .code(1)
            .stderr(predicate::str::contains("no_such_dir"));
    }
}

#[test]
fn table_written_to_file() {
    let (dir, net, trips) = fixture();
    let out = dir.path().join("flows.txt");
    solve(&["--format", "table", "--out", out.to_str().unwrap()], &net, &trips);
    let text = fs::read_to_string(&out).unwrap();
    assert!(text.starts_with("FROM"));
    assert_eq!(text.lines().count(), 6);
}

#[test]
fn logs_graph_summary_after_repair() {
    let (_dir, net, trips) = fixture();
    cargo_bin_cmd!("tap")
        .arg(&net)
        .arg(&trips)
        .assert()
        .success()
        .stderr(predicate::str::contains("graph ready for assignment"))
        .stderr(predicate::str::contains("components=1"));
}

#[test]
fn table_format_aligns_columns() {
    let (_dir, net, trips) = fixture();
    let stdout = solve(&["--format", "table"], &net, &trips);
    assert!(stdout.starts_with("FROM"));
    assert_eq!(stdout.lines().count(), 6);
    assert!(stdout.contains("4.000000"));
}

#[test]
fn config_file_sets_solver_options() {
    let (dir, net, trips) = fixture();
    let config = dir.path().join("run.toml");
    fs::write(&config, "[solver]\nmax_iterations = 0\n").unwrap();
    let stdout = solve(&["--config", config.to_str().unwrap()], &net, &trips);
    // No iterations: everything stays on the free-flow shortest path 1-2-3-4
    let flows = flows(&stdout);
    assert_eq!(flows.len(), 5);
    for (got, want) in flows.iter().zip([6.0, 0.0, 0.0, 6.0, 6.0]) {
        assert!((got - want).abs() < 1e-9, "flows {flows:?}");
    }
}

#[test]
fn missing_argument_prints_usage() {
    let (_dir, net, _trips) = fixture();
    cargo_bin_cmd!("tap")
        .arg(&net)
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn unreadable_network_fails() {
    let (dir, _net, trips) = fixture();
    cargo_bin_cmd!("tap")
        .arg(dir.path().join("missing.tntp"))
        .arg(&trips)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("missing.tntp"));
}

#[test]
fn negative_demand_is_fatal() {
    let (dir, net, _trips) = fixture();
    let trips = dir.path().join("bad_trips.tntp");
    fs::write(&trips, "<NUMBER OF ZONES> 4\n<END OF METADATA>\nOrigin 1\n 4 : -2.0;\n").unwrap();
    cargo_bin_cmd!("tap")
        .arg(&net)
        .arg(&trips)
        .assert()
        .failure()
        .code(1);
}

#[test]
fn invalid_solver_option_is_rejected() {
    let (_dir, net, trips) = fixture();
    cargo_bin_cmd!("tap")
        .arg(&net)
        .arg(&trips)
        .args(["--inner-iterations", "0"])
        .assert()
        .failure()
        .code(1);
}
