//! スタックパラメータのシリアライズ

use super::WorkloadStack;
use super::job;
use super::service::DEFAULT_TASK_COUNT;
use crate::error::{FlowError, Result};
use crate::model::Workload;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, instrument};

/// キー順に並んだパラメータ
pub type Parameters = BTreeMap<String, String>;

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ParameterFile<'a> {
    parameters: &'a Parameters,
}

impl WorkloadStack {
    /// スタックパラメータ
    ///
    /// 値はすべて文字列。未設定の任意項目は含めない。
    pub fn parameters(&self) -> Result<Parameters> {
        let image = self
            .manifest
            .ensure_loaded()
            .map_err(|e| FlowError::Serialization(e.to_string()))?;
        let task = self.manifest.task();
        let context = &self.context;

        let mut parameters = Parameters::new();
        let mut put = |key: &str, value: String| -> Result<()> {
            if parameters.insert(key.to_string(), value).is_some() {
                return Err(FlowError::Serialization(format!(
                    "パラメータ {key} が重複しています"
                )));
            }
            Ok(())
        };

        put("AppName", context.app_name.clone())?;
        put("EnvName", context.env_name.clone())?;
        put("EnvVersion", context.env_version.clone())?;
        put(
            "ServiceDiscoveryEndpoint",
            context.service_discovery_endpoint.clone(),
        )?;
        put("WorkloadName", self.manifest.name().to_string())?;
        put("ContainerImage", image.to_string())?;
        put("TaskCPU", task.cpu.to_string())?;
        put("TaskMemory", task.memory.to_string())?;
        put("LogRetention", task.log_retention.to_string())?;

        match self.manifest.workload() {
            Workload::ScheduledJob(job) => {
                let schedule = job::schedule(&job.config)
                    .map_err(|e| FlowError::Serialization(e.to_string()))?;
                put("Schedule", schedule)?;
            }
            Workload::BackendService(svc) => {
                put(
                    "TaskCount",
                    svc.config.count.unwrap_or(DEFAULT_TASK_COUNT).to_string(),
                )?;
                if let Some(port) = svc.config.port() {
                    put("ContainerPort", port.to_string())?;
                }
            }
        }

        if self.addon.is_some() {
            let url = context.addons_template_url.clone().ok_or_else(|| {
                FlowError::Serialization(
                    "アドオンがありますが addons_template_url が指定されていません".to_string(),
                )
            })?;
            put("AddonsTemplateURL", url)?;
        }

        Ok(parameters)
    }

    /// パラメータを JSON にシリアライズ
    ///
    /// 生成したテンプレートが宣言するパラメータと完全に一致しない場合はエラー。
    #[instrument(skip(self), fields(workload = %self.manifest.name(), env = %self.manifest.env()))]
    pub fn serialized_parameters(&self) -> Result<String> {
        let parameters = self.parameters()?;
        let declared = declared_parameters(&self.template()?)?;

        let provided: BTreeSet<String> = parameters.keys().cloned().collect();
        let missing: Vec<&str> = declared.difference(&provided).map(String::as_str).collect();
        let orphaned: Vec<&str> = provided.difference(&declared).map(String::as_str).collect();
        if !missing.is_empty() || !orphaned.is_empty() {
            return Err(FlowError::Serialization(format!(
                "テンプレートとパラメータが一致しません（値の無いパラメータ: [{}], 未宣言のパラメータ: [{}]）",
                missing.join(", "),
                orphaned.join(", ")
            )));
        }

        debug!(count = parameters.len(), "Serialized stack parameters");
        Ok(serde_json::to_string_pretty(&ParameterFile {
            parameters: &parameters,
        })?)
    }
}

/// テンプレートの Parameters セクションのキー
pub fn declared_parameters(template: &str) -> Result<BTreeSet<String>> {
    let document: serde_yaml::Value = serde_yaml::from_str(template)?;
    let Some(parameters) = document.get("Parameters") else {
        return Ok(BTreeSet::new());
    };
    let mapping = parameters.as_mapping().ok_or_else(|| {
        FlowError::Serialization("テンプレートの Parameters がマッピングではありません".to_string())
    })?;

    mapping
        .keys()
        .map(|key| {
            key.as_str().map(str::to_string).ok_or_else(|| {
                FlowError::Serialization(format!("パラメータ名が文字列ではありません: {key:?}"))
            })
        })
        .collect()
}
