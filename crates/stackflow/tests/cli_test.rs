#![allow(deprecated)] // TODO: cargo_bin → cargo_bin_cmd! へ移行

mod common;

use assert_cmd::Command;
use common::TestWorkspace;
use predicates::prelude::*;

const JOB_MANIFEST: &str = r#"
name: report
type: Scheduled Job
image:
  build: ./Dockerfile
on:
  schedule: "@daily"
variables:
  LOG_LEVEL: info
environments:
  test:
    variables:
      LOG_LEVEL: debug
  prod:
    network:
      vpc:
        placement: private
"#;

const SERVICE_MANIFEST: &str = r#"
name: api
type: Backend Service
image:
  location: public.ecr.aws/nginx/nginx:1.25
  port: 80
count: 2
"#;

const QUEUE_ADDON: &str = r#"
Parameters:
  App:
    Type: String
  Env:
    Type: String
  Name:
    Type: String
Resources:
  JobsQueue:
    Type: AWS::SQS::Queue
Outputs:
  JobsQueueUrl:
    Value: !Ref JobsQueue
"#;

const REGISTRY: &str = "123456789012.dkr.ecr.us-west-2.amazonaws.com";

fn stackflow(workspace: &TestWorkspace) -> Command {
    let mut cmd = Command::cargo_bin("stackflow").unwrap();
    cmd.current_dir(workspace.path())
        .env_remove("STACKFLOW_WORKSPACE_ROOT")
        .env_remove("STACKFLOW_ENV")
        .env_remove("STACKFLOW_APP")
        .env_remove("RUST_LOG")
        .env("XDG_CONFIG_HOME", workspace.path())
        .env(
            "STACKFLOW_CONFIG_PATH",
            workspace.path().join("stackflow.yml"),
        );
    cmd
}

fn package_args<'a>(name: &'a str, env: &'a str) -> Vec<&'a str> {
    vec![
        "package",
        name,
        "--env",
        env,
        "--app",
        "my-app",
        "--sd-endpoint",
        "test.my-app.local",
        "--env-version",
        "v1.42.0",
    ]
}

/// CLIヘルプが正しく表示されることを確認
#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("stackflow").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("package"))
        .stdout(predicate::str::contains("validate"));
}

#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("stackflow").unwrap();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("stackflow"));
}

#[test]
fn test_package_help() {
    let mut cmd = Command::cargo_bin("stackflow").unwrap();
    cmd.arg("package")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--env-version"))
        .stdout(predicate::str::contains("--addons-url"));
}

#[test]
fn test_outside_workspace_fails() {
    let workspace = TestWorkspace::new();
    let outside = tempfile::tempdir().unwrap();
    let mut cmd = stackflow(&workspace);
    cmd.current_dir(outside.path())
        .args(["validate", "report", "--env", "test"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ワークスペースが見つかりません"));
}

#[test]
fn test_package_writes_template_and_parameters() {
    let workspace = TestWorkspace::new();
    workspace.write_manifest("report", JOB_MANIFEST);
    workspace.write_settings(&format!("registry: {REGISTRY}\nimage_tag: v7\n"));

    stackflow(&workspace)
        .args(package_args("report", "test"))
        .args(["--output-dir", "out"])
        .assert()
        .success()
        .stdout(predicate::str::contains("report-test.stack.yml"));

    let params: serde_json::Value =
        serde_json::from_str(&workspace.read("out/report-test.params.json")).unwrap();
    assert_eq!(
        params["Parameters"]["ContainerImage"],
        format!("{REGISTRY}/my-app/report:v7")
    );
    assert_eq!(params["Parameters"]["EnvName"], "test");
    assert_eq!(params["Parameters"]["Schedule"], "cron(0 0 * * ? *)");

    let template: serde_yaml::Value =
        serde_yaml::from_str(&workspace.read("out/report-test.stack.yml")).unwrap();
    assert!(template["Resources"].get("TaskDefinition").is_some());
    assert!(!workspace.path().join("out/report-test.addons.stack.yml").exists());
}

#[test]
fn test_tag_flag_overrides_settings() {
    let workspace = TestWorkspace::new();
    workspace.write_manifest("report", JOB_MANIFEST);
    workspace.write_settings(&format!("registry: {REGISTRY}\nimage_tag: v7\n"));

    stackflow(&workspace)
        .args(package_args("report", "test"))
        .args(["--tag", "abc123"])
        .assert()
        .success();

    let params: serde_json::Value =
        serde_json::from_str(&workspace.read("report-test.params.json")).unwrap();
    assert_eq!(
        params["Parameters"]["ContainerImage"],
        format!("{REGISTRY}/my-app/report:abc123")
    );
}

#[test]
fn test_build_image_requires_registry() {
    let workspace = TestWorkspace::new();
    workspace.write_manifest("report", JOB_MANIFEST);

    stackflow(&workspace)
        .args(package_args("report", "test"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("--registry"));
}

#[test]
fn test_private_placement_requests_nat() {
    let workspace = TestWorkspace::new();
    workspace.write_manifest("report", JOB_MANIFEST);

    stackflow(&workspace)
        .args(package_args("report", "prod"))
        .args(["--registry", REGISTRY])
        .assert()
        .success()
        .stdout(predicate::str::contains("NATWorkloads"));

    let template = workspace.read("report-prod.stack.yml");
    assert!(template.contains("EnvControllerAction"));
}

#[test]
fn test_addon_requires_url() {
    let workspace = TestWorkspace::new();
    workspace.write_manifest("api", SERVICE_MANIFEST);
    workspace.write_addon("api", "queue.yml", QUEUE_ADDON);

    stackflow(&workspace)
        .args(package_args("api", "test"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("--addons-url"));

    stackflow(&workspace)
        .args(package_args("api", "test"))
        .args(["--addons-url", "https://example-bucket.s3.amazonaws.com/api.yml"])
        .assert()
        .success();

    let params: serde_json::Value =
        serde_json::from_str(&workspace.read("api-test.params.json")).unwrap();
    assert_eq!(params["Parameters"]["TaskCount"], "2");
    assert_eq!(
        params["Parameters"]["AddonsTemplateURL"],
        "https://example-bucket.s3.amazonaws.com/api.yml"
    );
    let nested: serde_yaml::Value =
        serde_yaml::from_str(&workspace.read("api-test.addons.stack.yml")).unwrap();
    assert!(nested["Resources"].get("JobsQueue").is_some());
}

#[test]
fn test_validate_reports_undeclared_environment() {
    let workspace = TestWorkspace::new();
    workspace.write_manifest("report", JOB_MANIFEST);

    stackflow(&workspace)
        .args(["validate", "report", "--env", "test"])
        .assert()
        .success()
        .stdout(predicate::str::contains("マニフェストは正常です"));

    stackflow(&workspace)
        .args(["validate", "report", "--env", "staging"])
        .assert()
        .failure();
}

#[test]
fn test_list_workloads() {
    let workspace = TestWorkspace::new();
    workspace.write_manifest("report", JOB_MANIFEST);
    workspace.write_manifest("api", SERVICE_MANIFEST);

    stackflow(&workspace)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("api"))
        .stdout(predicate::str::contains("report"));
}
