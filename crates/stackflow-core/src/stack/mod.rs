//! ワークロードスタックの生成
//!
//! 読み込み済みのマニフェストとランタイムコンテキスト、任意のアドオンから
//! CloudFormation テンプレートとスタックパラメータを生成する。

mod job;
mod params;
mod service;

pub use params::{Parameters, declared_parameters};
pub use service::listener_rule_priority;

use crate::addon::AddonFragment;
use crate::error::{FlowError, Result};
use crate::model::{EfsConfig, RESERVED_VARIABLE_PREFIX, Workload, WorkloadKind};
use crate::resolve::ResolvedManifest;
use crate::runtime::RuntimeContext;
use crate::template::{BACKEND_SERVICE_TEMPLATE, SCHEDULED_JOB_TEMPLATE, TemplateRenderer};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

/// ネストスタックの論理 ID
pub const ADDONS_STACK: &str = "AddonsStack";

/// 自動で注入される環境変数
const BUILTIN_VARIABLES: [(&str, &str); 4] = [
    ("APPLICATION_NAME", "AppName"),
    ("ENVIRONMENT_NAME", "EnvName"),
    ("SERVICE_NAME", "WorkloadName"),
    ("SERVICE_DISCOVERY_ENDPOINT", "ServiceDiscoveryEndpoint"),
];

/// 1つのワークロードのスタック
#[derive(Debug, Clone)]
pub struct WorkloadStack {
    manifest: ResolvedManifest,
    context: RuntimeContext,
    addon: Option<AddonFragment>,
}

#[derive(Debug, Serialize)]
struct RenderContext {
    has_addons: bool,
    addon_policies: Vec<String>,
    environment: Vec<EnvironmentVariable>,
    secrets: Vec<SecretRef>,
    command: Vec<String>,
    entrypoint: Vec<String>,
    port: Option<u16>,
    volumes: Vec<VolumeMount>,
    network: NetworkPlacement,
    env_controller: Option<EnvControllerInvocation>,
    job: Option<job::JobContext>,
    service: Option<service::ServiceContext>,
}

#[derive(Debug, Serialize)]
struct EnvironmentVariable {
    name: String,
    /// YAML としてそのまま出力できる値
    value: String,
}

#[derive(Debug, Serialize)]
struct SecretRef {
    name: String,
    value_from: String,
}

#[derive(Debug, Serialize)]
struct VolumeMount {
    name: String,
    path: String,
    read_only: bool,
    efs: bool,
    managed: bool,
    filesystem_id: Option<String>,
    root_dir: Option<String>,
}

#[derive(Debug, Serialize)]
struct NetworkPlacement {
    subnets_export: &'static str,
    assign_public_ip: &'static str,
    security_groups: Vec<String>,
}

#[derive(Debug, Serialize)]
struct EnvControllerInvocation {
    /// 環境スタックのパラメータ名
    parameters: Vec<&'static str>,
    bucket: String,
    key: String,
}

impl WorkloadStack {
    /// スタックを作成
    ///
    /// マニフェストは `validate` と `load` が完了している必要がある。
    #[instrument(skip_all, fields(workload = %manifest.name(), env = %manifest.env()))]
    pub fn new(manifest: ResolvedManifest, context: RuntimeContext) -> Result<Self> {
        manifest.ensure_loaded()?;
        context.validate()?;
        if manifest.env() != context.env_name {
            return Err(FlowError::validation(
                manifest.name(),
                format!(
                    "マニフェストの環境 '{}' とランタイムコンテキストの環境 '{}' が一致しません",
                    manifest.env(),
                    context.env_name
                ),
            ));
        }
        Ok(Self {
            manifest,
            context,
            addon: None,
        })
    }

    /// アドオンを組み込む
    pub fn with_addon(mut self, addon: AddonFragment) -> Self {
        self.addon = Some(addon);
        self
    }

    pub fn manifest(&self) -> &ResolvedManifest {
        &self.manifest
    }

    pub fn context(&self) -> &RuntimeContext {
        &self.context
    }

    pub fn addon(&self) -> Option<&AddonFragment> {
        self.addon.as_ref()
    }

    fn template_name(&self) -> &'static str {
        match self.manifest.kind() {
            WorkloadKind::ScheduledJob => SCHEDULED_JOB_TEMPLATE,
            WorkloadKind::BackendService => BACKEND_SERVICE_TEMPLATE,
        }
    }

    /// CloudFormation テンプレートを生成
    #[instrument(skip(self), fields(workload = %self.manifest.name(), env = %self.manifest.env()))]
    pub fn template(&self) -> Result<String> {
        let values = self.render_context()?;
        let renderer = TemplateRenderer::new()?;
        let rendered = renderer.render(self.template_name(), &values)?;

        let document = parse_rendered(&rendered)?;
        self.check_addon_collisions(&document)?;

        info!(bytes = rendered.len(), "Rendered stack template");
        Ok(rendered)
    }

    /// アドオンのネストスタック用テンプレート（アドオンが無ければ None）
    pub fn addon_template(&self) -> Result<Option<String>> {
        self.addon.as_ref().map(AddonFragment::template).transpose()
    }

    fn render_context(&self) -> Result<RenderContext> {
        let task = self.manifest.task();
        let image_uri = self.manifest.ensure_loaded()?;
        debug!(image = %image_uri, "Building render context");

        let (job, service, port) = match self.manifest.workload() {
            Workload::ScheduledJob(job) => (Some(job::context(&job.config)?), None, None),
            Workload::BackendService(svc) => {
                let context = service::context(
                    &svc.config,
                    &self.context.app_name,
                    &self.context.env_name,
                    self.manifest.name(),
                )?;
                (None, Some(context), svc.config.port())
            }
        };

        let addon_outputs = self.addon.as_ref().map(AddonFragment::outputs);
        let addon_policies = addon_outputs
            .iter()
            .flatten()
            .filter(|o| o.managed_policy)
            .map(|o| o.name.clone())
            .collect();

        Ok(RenderContext {
            has_addons: self.addon.is_some(),
            addon_policies,
            environment: self.environment(addon_outputs.as_deref().unwrap_or_default())?,
            secrets: task
                .secrets
                .iter()
                .map(|(name, value_from)| SecretRef {
                    name: name.clone(),
                    value_from: value_from.clone(),
                })
                .collect(),
            command: task.command.map(|c| c.to_args()).unwrap_or_default(),
            entrypoint: task.entrypoint.map(|c| c.to_args()).unwrap_or_default(),
            port,
            volumes: self.volumes()?,
            network: NetworkPlacement {
                subnets_export: task.placement.subnets_export(),
                assign_public_ip: task.placement.assign_public_ip(),
                security_groups: task.security_groups.to_vec(),
            },
            env_controller: self.env_controller()?,
            job,
            service,
        })
    }

    /// コンテナの環境変数（名前順）
    fn environment(
        &self,
        addon_outputs: &[crate::addon::AddonOutput],
    ) -> Result<Vec<EnvironmentVariable>> {
        let task = self.manifest.task();
        let mut values: BTreeMap<String, String> = BTreeMap::new();

        for (suffix, parameter) in BUILTIN_VARIABLES {
            values.insert(
                format!("{RESERVED_VARIABLE_PREFIX}{suffix}"),
                format!("!Ref {parameter}"),
            );
        }
        for (name, value) in task.variables {
            values.insert(name.clone(), serde_json::to_string(value)?);
        }

        for output in addon_outputs.iter().filter(|o| !o.managed_policy) {
            let name = output.env_name();
            if values.contains_key(&name) || task.secrets.contains_key(&name) {
                return Err(FlowError::AddonMerge(format!(
                    "アドオンの出力 {} の環境変数 {name} が既存の環境変数と衝突しています",
                    output.name
                )));
            }
            values.insert(name, format!("!GetAtt {ADDONS_STACK}.Outputs.{}", output.name));
        }

        Ok(values
            .into_iter()
            .map(|(name, value)| EnvironmentVariable { name, value })
            .collect())
    }

    fn volumes(&self) -> Result<Vec<VolumeMount>> {
        let Some(volumes) = self.manifest.task().storage.and_then(|s| s.volumes.as_ref()) else {
            return Ok(Vec::new());
        };

        let mut mounts = Vec::with_capacity(volumes.len());
        for (name, volume) in volumes {
            let path = volume.path.clone().ok_or_else(|| {
                FlowError::template("TaskDefinition", format!("volume '{name}' に path がありません"))
            })?;
            let efs = volume.efs.as_ref().ok_or_else(|| {
                FlowError::template("TaskDefinition", format!("volume '{name}' に efs がありません"))
            })?;
            let (enabled, filesystem_id, root_dir) = match efs {
                EfsConfig::Managed(enabled) => (*enabled, None, None),
                EfsConfig::Existing { id, root_dir } => (true, Some(id.clone()), root_dir.clone()),
            };
            mounts.push(VolumeMount {
                name: name.clone(),
                path,
                read_only: volume.read_only,
                efs: enabled,
                managed: efs.is_managed(),
                filesystem_id,
                root_dir,
            });
        }
        Ok(mounts)
    }

    fn env_controller(&self) -> Result<Option<EnvControllerInvocation>> {
        let actions = self.manifest.requested_actions();
        if actions.is_empty() {
            return Ok(None);
        }
        let location = self.context.agent_location()?;
        debug!(actions = ?actions, location = %location, "Workload requests environment controller");
        Ok(Some(EnvControllerInvocation {
            parameters: actions.iter().map(|a| a.env_parameter()).collect(),
            bucket: location.bucket,
            key: location.key,
        }))
    }

    fn check_addon_collisions(&self, document: &serde_yaml::Value) -> Result<()> {
        let Some(addon) = &self.addon else {
            return Ok(());
        };
        let resources = document
            .get("Resources")
            .and_then(serde_yaml::Value::as_mapping)
            .ok_or_else(|| FlowError::template("Resources", "Resources が生成されていません"))?;

        let collisions: Vec<&str> = addon
            .resource_ids()
            .filter(|id| resources.contains_key(*id))
            .collect();
        if !collisions.is_empty() {
            return Err(FlowError::AddonMerge(format!(
                "アドオンのリソース名がワークロードのリソース名と衝突しています: {}",
                collisions.join(", ")
            )));
        }
        Ok(())
    }
}

fn parse_rendered(rendered: &str) -> Result<serde_yaml::Value> {
    serde_yaml::from_str(rendered)
        .map_err(|e| FlowError::template("template", format!("生成結果が YAML として不正です: {e}")))
}
