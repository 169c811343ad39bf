//! マニフェストからスタックを生成するまでの統合テスト

use pretty_assertions::assert_eq;
use stackflow_core::{
    AddonError, FlowError, ResolvedManifest, RuntimeContext, Session, Stage, Workload,
    WorkloadStack, Workspace, addon,
};
use std::fs;
use tempfile::TempDir;

const JOB_MANIFEST: &str = include_str!("fixtures/job-manifest.yml");
const JOB_TEST_STACK: &str = include_str!("fixtures/job-test.stack.yml");
const JOB_TEST_PARAMS: &str = include_str!("fixtures/job-test.params.json");
const API_MANIFEST: &str = include_str!("fixtures/api-manifest.yml");

struct EcrSession;

impl Session for EcrSession {
    fn repository_uri(&self, workload: &str) -> stackflow_core::Result<String> {
        Ok(format!(
            "123456789012.dkr.ecr.us-west-2.amazonaws.com/my-app/{workload}"
        ))
    }
}

fn runtime(env: &str) -> RuntimeContext {
    RuntimeContext::new("my-app", env, format!("{env}.my-app.local"), "v1.42.0")
}

fn resolve(manifest: &str, env: &str) -> ResolvedManifest {
    let mut resolved = Workload::from_yaml(manifest)
        .unwrap()
        .apply_env(env)
        .unwrap();
    resolved.validate().unwrap();
    resolved.load(&EcrSession).unwrap();
    resolved
}

/// stackflow/<name>/manifest.yml と addons/ を持つワークスペース
fn workspace_with(name: &str, manifest: &str, addons: &[(&str, &str)]) -> (TempDir, Workspace) {
    let temp = tempfile::tempdir().unwrap();
    let dir = temp.path().join("stackflow").join(name);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("manifest.yml"), manifest).unwrap();
    if !addons.is_empty() {
        fs::create_dir_all(dir.join("addons")).unwrap();
        for (file, content) in addons {
            fs::write(dir.join("addons").join(file), content).unwrap();
        }
    }
    let workspace = Workspace::open(temp.path()).unwrap();
    (temp, workspace)
}

fn yaml(content: &str) -> serde_yaml::Value {
    serde_yaml::from_str(content).unwrap()
}

#[test]
fn test_scheduled_job_matches_fixtures() {
    let (_temp, workspace) = workspace_with("job", JOB_MANIFEST, &[]);
    let workload = workspace.read_manifest("job").unwrap();

    let mut manifest = workload.apply_env("test").unwrap();
    manifest.validate().unwrap();
    manifest.load(&EcrSession).unwrap();
    assert_eq!(manifest.stage(), Stage::Loaded);

    let err = addon::parse("job", &workspace).unwrap_err();
    assert!(err.is_not_found());

    let stack = WorkloadStack::new(
        manifest,
        RuntimeContext::new("my-app", "test", "test.my-app.local", "v1.42.0"),
    )
    .unwrap();

    let template = stack.template().unwrap();
    assert_eq!(yaml(&template), yaml(JOB_TEST_STACK));

    let params = stack.serialized_parameters().unwrap();
    assert_eq!(params, JOB_TEST_PARAMS.trim_end());
}

#[test]
fn test_synthesis_is_deterministic() {
    let first = WorkloadStack::new(resolve(JOB_MANIFEST, "test"), runtime("test")).unwrap();
    let second = WorkloadStack::new(resolve(JOB_MANIFEST, "test"), runtime("test")).unwrap();

    assert_eq!(first.template().unwrap(), second.template().unwrap());
    assert_eq!(
        first.serialized_parameters().unwrap(),
        second.serialized_parameters().unwrap()
    );
}

#[test]
fn test_every_declared_parameter_has_a_value() {
    for (manifest, env) in [
        (JOB_MANIFEST, "test"),
        (JOB_MANIFEST, "prod"),
        (API_MANIFEST, "test"),
        (API_MANIFEST, "prod"),
    ] {
        let stack = WorkloadStack::new(resolve(manifest, env), runtime(env)).unwrap();
        let declared = stackflow_core::stack::declared_parameters(&stack.template().unwrap())
            .unwrap();
        let provided: Vec<String> = stack.parameters().unwrap().into_keys().collect();
        assert_eq!(declared.into_iter().collect::<Vec<_>>(), provided);
    }
}

#[test]
fn test_environment_override_wins() {
    let stack = WorkloadStack::new(resolve(JOB_MANIFEST, "prod"), runtime("prod")).unwrap();
    let parameters = stack.parameters().unwrap();
    assert_eq!(parameters["TaskCPU"], "1024");
    assert_eq!(parameters["TaskMemory"], "2048");

    let template = yaml(&stack.template().unwrap());
    // private 配置では NAT ゲートウェイを環境コントローラーに要求する
    let action = &template["Resources"]["EnvControllerAction"];
    assert_eq!(action["Properties"]["Parameters"][0].as_str(), Some("NATWorkloads"));
    let code = &template["Resources"]["EnvControllerFunction"]["Properties"]["Code"];
    assert_eq!(code["S3Key"].as_str(), Some("env-controller/v1.42.0/bootstrap.zip"));

    // 基本設定の変数は prod でもそのまま残る
    let environment = &template["Resources"]["TaskDefinition"]["Properties"]
        ["ContainerDefinitions"][0]["Environment"];
    assert_eq!(environment[0]["Name"].as_str(), Some("LOG_LEVEL"));
    assert_eq!(environment[0]["Value"].as_str(), Some("info"));
}

#[test]
fn test_undeclared_environment_is_rejected() {
    let workload = Workload::from_yaml(JOB_MANIFEST).unwrap();
    let err = workload.apply_env("staging").unwrap_err();
    assert!(matches!(err, FlowError::EnvironmentNotFound { ref env, .. } if env == "staging"));
}

#[test]
fn test_unloaded_manifest_is_rejected() {
    let mut manifest = Workload::from_yaml(JOB_MANIFEST)
        .unwrap()
        .apply_env("test")
        .unwrap();
    let err = manifest.load(&EcrSession).unwrap_err();
    assert!(matches!(err, FlowError::Validation { .. }));

    manifest.validate().unwrap();
    let err = WorkloadStack::new(manifest, runtime("test")).unwrap_err();
    assert!(matches!(err, FlowError::Template { .. }));
}

const BUCKET_ADDON: &str = r#"
Parameters:
  App:
    Type: String
  Env:
    Type: String
  Name:
    Type: String
Resources:
  ReportsBucket:
    Type: AWS::S3::Bucket
  ReportsAccessPolicy:
    Type: AWS::IAM::ManagedPolicy
    Properties:
      PolicyDocument:
        Version: "2012-10-17"
        Statement:
          - Effect: Allow
            Action: s3:*
            Resource: !GetAtt ReportsBucket.Arn
Outputs:
  ReportsBucketName:
    Value: !Ref ReportsBucket
  ReportsAccessPolicyArn:
    Value: !Ref ReportsAccessPolicy
"#;

#[test]
fn test_addon_is_wired_into_template_and_parameters() {
    let (_temp, workspace) =
        workspace_with("job", JOB_MANIFEST, &[("bucket.yml", BUCKET_ADDON)]);
    let fragment = addon::parse("job", &workspace).unwrap();

    let stack = WorkloadStack::new(
        resolve(JOB_MANIFEST, "test"),
        runtime("test").with_addons_template_url("https://example-bucket.s3.amazonaws.com/job.yml"),
    )
    .unwrap()
    .with_addon(fragment);

    let template = yaml(&stack.template().unwrap());
    let addons = &template["Resources"]["AddonsStack"];
    assert_eq!(addons["Type"].as_str(), Some("AWS::CloudFormation::Stack"));
    assert!(template["Parameters"].get("AddonsTemplateURL").is_some());

    let environment: Vec<&str> = template["Resources"]["TaskDefinition"]["Properties"]
        ["ContainerDefinitions"][0]["Environment"]
        .as_sequence()
        .unwrap()
        .iter()
        .filter_map(|v| v["Name"].as_str())
        .collect();
    assert!(environment.contains(&"REPORTS_BUCKET_NAME"));
    // マネージドポリシーは環境変数ではなくタスクロールに付与される
    assert!(!environment.contains(&"REPORTS_ACCESS_POLICY_ARN"));
    let policies = &template["Resources"]["TaskRole"]["Properties"]["ManagedPolicyArns"];
    assert_eq!(policies.as_sequence().map(Vec::len), Some(1));

    let params: serde_json::Value =
        serde_json::from_str(&stack.serialized_parameters().unwrap()).unwrap();
    assert_eq!(
        params["Parameters"]["AddonsTemplateURL"],
        "https://example-bucket.s3.amazonaws.com/job.yml"
    );

    let nested = yaml(&stack.addon_template().unwrap().unwrap());
    assert!(nested["Resources"].get("ReportsBucket").is_some());
}

#[test]
fn test_addon_resource_collision_is_rejected() {
    let colliding = r#"
Parameters:
  App: {Type: String}
  Env: {Type: String}
  Name: {Type: String}
Resources:
  TaskRole:
    Type: AWS::IAM::Role
"#;
    let (_temp, workspace) = workspace_with("job", JOB_MANIFEST, &[("role.yml", colliding)]);
    let fragment = addon::parse("job", &workspace).unwrap();

    let stack = WorkloadStack::new(
        resolve(JOB_MANIFEST, "test"),
        runtime("test").with_addons_template_url("https://example-bucket.s3.amazonaws.com/job.yml"),
    )
    .unwrap()
    .with_addon(fragment);

    assert!(matches!(stack.template(), Err(FlowError::AddonMerge(_))));
}

#[test]
fn test_conflicting_addon_files_are_rejected() {
    let first = "Parameters:\n  App: {Type: String}\n  Env: {Type: String}\n  Name: {Type: String}\nResources:\n  Queue:\n    Type: AWS::SQS::Queue\n";
    let second = "Resources:\n  Queue:\n    Type: AWS::SNS::Topic\n";
    let (_temp, workspace) = workspace_with(
        "job",
        JOB_MANIFEST,
        &[("a.yml", first), ("b.yaml", second)],
    );

    let err = addon::parse("job", &workspace).unwrap_err();
    assert!(matches!(err, AddonError::Conflict { ref key, .. } if key == "Queue"));
}

#[test]
fn test_backend_service_stack() {
    let stack = WorkloadStack::new(resolve(API_MANIFEST, "test"), runtime("test")).unwrap();

    let parameters = stack.parameters().unwrap();
    assert_eq!(parameters["TaskCount"], "1");
    assert_eq!(parameters["ContainerPort"], "8080");
    assert_eq!(
        parameters["ContainerImage"],
        "123456789012.dkr.ecr.us-west-2.amazonaws.com/my-app/api:latest"
    );

    let template = yaml(&stack.template().unwrap());
    let resources = template["Resources"].as_mapping().unwrap();
    for id in ["Service", "TargetGroup", "ListenerRule", "TaskDefinition"] {
        assert!(resources.contains_key(id), "missing {id}");
    }
    assert!(!resources.contains_key("Rule"));

    let priority = &template["Resources"]["ListenerRule"]["Properties"]["Priority"];
    assert_eq!(
        priority.as_u64(),
        Some(u64::from(stackflow_core::stack::listener_rule_priority(
            "my-app", "test", "api"
        )))
    );
}

#[test]
fn test_workspace_lists_workloads() {
    let (temp, workspace) = workspace_with("job", JOB_MANIFEST, &[]);
    let api_dir = temp.path().join("stackflow").join("api");
    fs::create_dir_all(&api_dir).unwrap();
    fs::write(api_dir.join("manifest.yml"), API_MANIFEST).unwrap();
    fs::create_dir_all(temp.path().join("stackflow").join("empty")).unwrap();

    assert_eq!(workspace.workload_names().unwrap(), vec!["api", "job"]);
    assert!(workspace.manifest_path("api").is_file());
}
