//! ワークロードマニフェスト

use super::job::ScheduledJob;
use super::overlay::Overlay;
use super::service::BackendService;
use crate::error::{FlowError, Result};
use crate::resolve::ResolvedManifest;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, instrument};

/// ワークロードマニフェスト
///
/// `type` フィールドで種別を判別する。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Workload {
    #[serde(rename = "Scheduled Job")]
    ScheduledJob(ScheduledJob),
    #[serde(rename = "Backend Service")]
    BackendService(BackendService),
}

/// ワークロード種別
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadKind {
    ScheduledJob,
    BackendService,
}

impl WorkloadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScheduledJob => "Scheduled Job",
            Self::BackendService => "Backend Service",
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Workload {
    /// YAML からマニフェストを読み込む
    pub fn from_yaml(content: &str) -> Result<Self> {
        let workload: Workload = serde_yaml::from_str(content)?;
        if workload.name().trim().is_empty() {
            return Err(FlowError::validation("", "name が指定されていません"));
        }
        Ok(workload)
    }

    pub fn name(&self) -> &str {
        match self {
            Self::ScheduledJob(job) => &job.name,
            Self::BackendService(svc) => &svc.name,
        }
    }

    pub fn kind(&self) -> WorkloadKind {
        match self {
            Self::ScheduledJob(_) => WorkloadKind::ScheduledJob,
            Self::BackendService(_) => WorkloadKind::BackendService,
        }
    }

    /// オーバーライドが定義されている環境名
    pub fn environments(&self) -> Vec<&str> {
        match self {
            Self::ScheduledJob(job) => job.environments.keys().map(String::as_str).collect(),
            Self::BackendService(svc) => svc.environments.keys().map(String::as_str).collect(),
        }
    }

    /// 環境オーバーライドを適用して環境に束縛されたマニフェストを生成
    ///
    /// オーバーライドが1つも定義されていない場合は恒等変換。
    /// 定義されているのに `env` が含まれない場合はエラー。
    #[instrument(skip(self), fields(workload = %self.name()))]
    pub fn apply_env(&self, env: &str) -> Result<ResolvedManifest> {
        let declared = self.environments();
        if !declared.is_empty() && !declared.contains(&env) {
            return Err(FlowError::EnvironmentNotFound {
                workload: self.name().to_string(),
                env: env.to_string(),
            });
        }

        let resolved = match self {
            Self::ScheduledJob(job) => {
                let mut config = job.config.clone();
                if let Some(overrides) = job.environments.get(env) {
                    config.overlay(overrides.clone());
                }
                Self::ScheduledJob(ScheduledJob {
                    name: job.name.clone(),
                    config,
                    environments: Default::default(),
                })
            }
            Self::BackendService(svc) => {
                let mut config = svc.config.clone();
                if let Some(overrides) = svc.environments.get(env) {
                    config.overlay(overrides.clone());
                }
                Self::BackendService(BackendService {
                    name: svc.name.clone(),
                    config,
                    environments: Default::default(),
                })
            }
        };

        debug!(env = %env, kind = %self.kind(), "Applied environment overrides");
        Ok(ResolvedManifest::new(env, resolved))
    }
}
