use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn crossbench() -> Command {
    let mut cmd = Command::cargo_bin("crossbench").unwrap();
    cmd.env_remove("RUST_LOG");
    cmd
}

fn stdout_json(output: &std::process::Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_list_shows_backends_and_operations() {
    let output = crossbench().arg("list").output().unwrap();
    assert!(output.status.success());

    let listing = stdout_json(&output);
    assert_eq!(listing["backends"], serde_json::json!(["memory"]));
    let operations = listing["operations"].as_array().unwrap();
    assert_eq!(operations.len(), 9);
    assert!(operations.contains(&serde_json::json!("ledger-query")));
}

#[test]
fn test_run_parallel_reads_against_seeded_memory() {
    let output = crossbench()
        .args([
            "run",
            "--operation",
            "read-parallel",
            "--param",
            "itemCount=20",
            "--param",
            "concurrency=4",
            "--param",
            "db.seedCount=20",
        ])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let response = stdout_json(&output);
    assert_eq!(response["success"], true);
    assert_eq!(response["itemsProcessed"], 20);
    assert_eq!(response["backend"], "memory");
    assert_eq!(response["metrics"]["operationCount"], 20);
    assert_eq!(response["metrics"]["errorCount"], 0);
    assert!(response["metrics"]["p50"].is_u64());
}

#[test]
fn test_run_failure_exits_nonzero() {
    crossbench()
        .args(["run", "--operation", "read", "--param", "itemCount=3"])
        .assert()
        .code(10)
        .stdout(predicate::str::contains("\"success\": false"))
        .stdout(predicate::str::contains("Operation execution failed"));
}

#[test]
fn test_unknown_operation_reported() {
    crossbench()
        .args(["run", "--operation", "scan"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Failed to create operation strategy"));
}

#[test]
fn test_malformed_param_rejected() {
    crossbench()
        .args(["run", "--operation", "read", "--param", "itemCount"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Invalid Parameter"));
}

#[test]
fn test_run_prometheus_output() {
    crossbench()
        .args([
            "run",
            "--operation",
            "write-batch",
            "--param",
            "itemCount=30",
            "--param",
            "batchSize=10",
            "--prometheus",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("crossbench_run_operations"))
        .stdout(predicate::str::contains("backend=\"memory\""));
}

#[test]
fn test_table_format() {
    crossbench()
        .args([
            "--format",
            "table",
            "run",
            "--operation",
            "write",
            "--param",
            "itemCount=5",
        ])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("BENCHMARK"))
        .stdout(predicate::str::contains("write"));
}

#[test]
fn test_sample_config_then_plan() {
    let dir = TempDir::new().unwrap();
    let plan = dir.path().join("plan.toml");

    crossbench()
        .args(["sample-config", "--output"])
        .arg(&plan)
        .assert()
        .success();
    assert!(plan.exists());

    let output = crossbench()
        .arg("plan")
        .arg(&plan)
        .args(["--repetitions", "2"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let results = stdout_json(&output);
    let results = results.as_array().unwrap();
    assert_eq!(results.len(), 8);
    assert!(results.iter().all(|r| r["success"] == true));
    assert_eq!(results[0]["benchmark"], "sequential reads");
    assert_eq!(results[0]["repetition"], 1);
    assert_eq!(results[7]["repetition"], 2);
}

#[test]
fn test_plan_repetitions_from_environment() {
    let dir = TempDir::new().unwrap();
    let plan = dir.path().join("plan.toml");
    std::fs::write(
        &plan,
        r#"
[[benchmarks]]
operation = "ledger-write"

[benchmarks.parameters]
numTransactions = 3
"#,
    )
    .unwrap();

    let output = crossbench()
        .env("CROSSBENCH_REPETITIONS", "3")
        .arg("plan")
        .arg(&plan)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(stdout_json(&output).as_array().unwrap().len(), 3);
}

#[test]
fn test_plan_validation_errors() {
    let dir = TempDir::new().unwrap();
    let plan = dir.path().join("empty.toml");
    std::fs::write(&plan, "[settings]\nrepetitions = 1\n").unwrap();

    crossbench()
        .arg("plan")
        .arg(&plan)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("plan lists no benchmarks"));

    crossbench()
        .arg("plan")
        .arg(dir.path().join("missing.toml"))
        .assert()
        .code(5)
        .stderr(predicate::str::contains("Plan File Not Found"));
}

#[test]
fn test_plan_timeout_applies_to_each_request() {
    let dir = TempDir::new().unwrap();
    let plan = dir.path().join("slow.toml");
    // each write takes ~0.75s, so the two together outlast one timeout
    std::fs::write(
        &plan,
        r#"
[settings]
timeout_secs = 1

[[benchmarks]]
name = "first"
operation = "write"

[benchmarks.parameters]
itemCount = 5
"db.latencyMs" = 150

[[benchmarks]]
name = "second"
operation = "write"

[benchmarks.parameters]
itemCount = 5
"db.latencyMs" = 150
"#,
    )
    .unwrap();

    let output = crossbench().arg("plan").arg(&plan).output().unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let results = stdout_json(&output);
    let results = results.as_array().unwrap();
    assert_eq!(results.len(), 2);
    for result in results {
        assert_eq!(result["success"], true);
        assert_eq!(result["itemsProcessed"], 5, "{}", result["benchmark"]);
    }
}

#[test]
fn test_non_finite_latency_reported_not_panicking() {
    let output = crossbench()
        .args([
            "run",
            "--backend",
            "memory",
            "--operation",
            "write",
            "--param",
            "db.latencyMs=NaN",
        ])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(10));
    let response = stdout_json(&output);
    assert_eq!(response["success"], false);
    assert!(response["errorMessage"]
        .as_str()
        .unwrap()
        .starts_with("Failed to create database adapter"));
}
