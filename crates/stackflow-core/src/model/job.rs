//! Scheduled Job 定義

use super::action::ControllerAction;
use super::common::{
    CommandOverride, ImageConfig, LoggingConfig, NetworkConfig, Placement, StorageConfig,
};
use super::overlay::{Overlay, extend, merge, replace};
use super::schedule::{aws_schedule_expression, parse_duration};
use super::validate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// 最大リトライ回数
pub const MAX_JOB_RETRIES: u32 = 10;

/// スケジュール実行されるジョブ
///
/// YAML形式：
/// ```yaml
/// name: mailer
/// type: Scheduled Job
/// image:
///   build: mailer/Dockerfile
/// on:
///   schedule: "@hourly"
/// retries: 3
/// environments:
///   test:
///     cpu: 512
///     memory: 1024
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub name: String,
    #[serde(flatten)]
    pub config: JobConfig,
    /// 環境ごとのオーバーライド
    #[serde(default)]
    pub environments: BTreeMap<String, JobConfig>,
}

/// ジョブの設定（環境オーバーライドも同じ形）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    pub image: Option<ImageConfig>,
    pub on: Option<JobTrigger>,
    pub cpu: Option<u32>,
    pub memory: Option<u32>,
    /// 加算的: 環境オーバーライドとキー単位でマージ
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    /// 加算的: 環境オーバーライドとキー単位でマージ
    #[serde(default)]
    pub secrets: BTreeMap<String, String>,
    pub command: Option<CommandOverride>,
    pub entrypoint: Option<CommandOverride>,
    /// 失敗時のリトライ回数
    pub retries: Option<u32>,
    /// 実行タイムアウト（例: 1h30m）
    pub timeout: Option<String>,
    pub network: Option<NetworkConfig>,
    pub storage: Option<StorageConfig>,
    pub logging: Option<LoggingConfig>,
}

/// ジョブのトリガー
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobTrigger {
    pub schedule: Option<String>,
}

impl Overlay for JobTrigger {
    fn overlay(&mut self, other: Self) {
        replace(&mut self.schedule, other.schedule);
    }
}

impl Overlay for JobConfig {
    fn overlay(&mut self, other: Self) {
        merge(&mut self.image, other.image);
        merge(&mut self.on, other.on);
        replace(&mut self.cpu, other.cpu);
        replace(&mut self.memory, other.memory);
        extend(&mut self.variables, other.variables);
        extend(&mut self.secrets, other.secrets);
        replace(&mut self.command, other.command);
        replace(&mut self.entrypoint, other.entrypoint);
        replace(&mut self.retries, other.retries);
        replace(&mut self.timeout, other.timeout);
        merge(&mut self.network, other.network);
        merge(&mut self.storage, other.storage);
        merge(&mut self.logging, other.logging);
    }
}

impl JobConfig {
    /// 設定されたスケジュールを AWS 形式で取得
    pub fn schedule_expression(&self) -> Result<String, String> {
        let schedule = self
            .on
            .as_ref()
            .and_then(|on| on.schedule.as_deref())
            .ok_or("on.schedule が指定されていません")?;
        aws_schedule_expression(schedule)
    }

    /// タイムアウト（秒）。未設定なら None
    pub fn timeout_seconds(&self) -> Result<Option<u64>, String> {
        self.timeout
            .as_deref()
            .map(|t| parse_duration(t).map(|d| d.as_secs()))
            .transpose()
    }

    pub fn placement(&self) -> Placement {
        self.network
            .as_ref()
            .map(NetworkConfig::placement)
            .unwrap_or_default()
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        validate::image(self.image.as_ref())?;
        if self.image.as_ref().and_then(|i| i.port).is_some() {
            return Err("Scheduled Job では image.port を指定できません".into());
        }
        self.schedule_expression()?;
        validate::task_size(self.cpu, self.memory)?;
        validate::variables(&self.variables, &self.secrets)?;
        if let Some(retries) = self.retries
            && retries > MAX_JOB_RETRIES
        {
            return Err(format!(
                "retries は0〜{MAX_JOB_RETRIES}の範囲で指定してください: {retries}"
            ));
        }
        self.timeout_seconds()?;
        if self.command.as_ref().is_some_and(CommandOverride::is_empty) {
            return Err("command が空です".into());
        }
        if self.entrypoint.as_ref().is_some_and(CommandOverride::is_empty) {
            return Err("entrypoint が空です".into());
        }
        if self
            .network
            .as_ref()
            .and_then(|n| n.service_discovery)
            .unwrap_or(false)
        {
            return Err("Scheduled Job ではサービスディスカバリを使用できません".into());
        }
        validate::storage(self.storage.as_ref())?;
        validate::logging(self.logging.as_ref())?;
        Ok(())
    }

    /// 環境コントローラーに要求するアクション
    pub fn requested_actions(&self) -> BTreeSet<ControllerAction> {
        let mut actions = BTreeSet::new();
        if self.placement() == Placement::Private {
            actions.insert(ControllerAction::NatGateway);
        }
        if uses_managed_filesystem(self.storage.as_ref()) {
            actions.insert(ControllerAction::SharedFilesystem);
        }
        actions
    }
}

pub(crate) fn uses_managed_filesystem(storage: Option<&StorageConfig>) -> bool {
    storage
        .and_then(|s| s.volumes.as_ref())
        .is_some_and(|volumes| {
            volumes
                .values()
                .any(|v| v.efs.as_ref().is_some_and(|efs| efs.is_managed()))
        })
}
