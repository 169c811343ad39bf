#![allow(deprecated)] // TODO: cargo_bin → cargo_bin_cmd! へ移行

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;

const CREATE_EVENT: &str = r#"{
    "RequestType": "Create",
    "RequestId": "b1c2d3e4",
    "StackId": "arn:aws:cloudformation:us-west-2:123456789012:stack/my-app-test-job/guid",
    "LogicalResourceId": "EnvControllerAction",
    "ResourceProperties": {
        "Workload": "job",
        "EnvStack": "my-app-test",
        "EnvVersion": "v1.42.0",
        "Parameters": ["NATWorkloads", "EFSWorkloads"]
    }
}"#;

fn controller(state_root: &Path) -> Command {
    let mut cmd = Command::cargo_bin("stackflow-env-controller").unwrap();
    cmd.env_remove("STACKFLOW_STATE_ROOT")
        .env("RUST_LOG", "warn")
        .arg("--state-root")
        .arg(state_root);
    cmd
}

fn register(state_root: &Path) {
    controller(state_root)
        .args(["register", "my-app-test"])
        .args(["--output", "ClusterId=my-app-test-Cluster"])
        .args(["--output", "ManagedFileSystemID=fs-0123"])
        .assert()
        .success();
}

#[test]
fn test_handle_from_stdin_updates_parameters() {
    let temp_dir = tempfile::tempdir().unwrap();
    register(temp_dir.path());

    let output = controller(temp_dir.path())
        .arg("handle")
        .write_stdin(CREATE_EVENT)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let response: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(response["Status"], "SUCCESS");
    assert_eq!(response["PhysicalResourceId"], "envcontroller/my-app-test/job");
    assert_eq!(response["Data"]["ManagedFileSystemID"], "fs-0123");

    let output = controller(temp_dir.path())
        .args(["params", "my-app-test"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let params: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(params["NATWorkloads"], "job");
    assert_eq!(params["EFSWorkloads"], "job");
    assert_eq!(params["ALBWorkloads"], "");
}

#[test]
fn test_handle_from_file_reports_failure_in_response() {
    let temp_dir = tempfile::tempdir().unwrap();
    let request = temp_dir.path().join("create.json");
    std::fs::write(&request, CREATE_EVENT).unwrap();

    // unregistered environment
    controller(temp_dir.path())
        .arg("handle")
        .arg(&request)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"Status\":\"FAILED\""))
        .stdout(predicate::str::contains("my-app-test"));
}

#[test]
fn test_malformed_request_exits_with_error() {
    let temp_dir = tempfile::tempdir().unwrap();
    controller(temp_dir.path())
        .arg("handle")
        .write_stdin("{not json")
        .assert()
        .failure();
}

#[test]
fn test_register_rejects_bad_output() {
    let temp_dir = tempfile::tempdir().unwrap();
    controller(temp_dir.path())
        .args(["register", "my-app-test", "--output", "ClusterId"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("KEY=VALUE"));
}
