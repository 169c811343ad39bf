//! 環境に束縛されたマニフェスト
//!
//! `Workload::apply_env` で生成され、`validate` → `load` の順に
//! ステージを進めてからテンプレート生成に渡す。

use crate::error::{FlowError, Result};
use crate::model::{
    CommandOverride, ControllerAction, DEFAULT_CPU, DEFAULT_LOG_RETENTION, DEFAULT_MEMORY,
    ImageConfig, Placement, StorageConfig, Workload, WorkloadKind,
};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, info, instrument};

/// イメージタグの既定値
pub const DEFAULT_IMAGE_TAG: &str = "latest";

/// マニフェストのライフサイクル
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    /// オーバーライド適用済み
    Resolved,
    /// 検証済み
    Validated,
    /// 計算値の読み込み済み（テンプレート生成可能）
    Loaded,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolved => write!(f, "resolved"),
            Self::Validated => write!(f, "validated"),
            Self::Loaded => write!(f, "loaded"),
        }
    }
}

/// `load` で使う外部への問い合わせ手段
///
/// 認証やセッションの初期化は呼び出し側の責務。
pub trait Session {
    /// `build` でビルドされるイメージのリポジトリ URI
    fn repository_uri(&self, workload: &str) -> Result<String>;

    /// プッシュ済みイメージのタグ
    fn image_tag(&self) -> Option<String> {
        None
    }
}

/// 環境オーバーライド適用後のマニフェスト
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedManifest {
    env: String,
    workload: Workload,
    stage: Stage,
    image_uri: Option<String>,
}

/// 種別に依らないタスク設定のビュー
#[derive(Debug, Clone, Copy)]
pub struct TaskSettings<'a> {
    pub cpu: u32,
    pub memory: u32,
    pub variables: &'a BTreeMap<String, String>,
    pub secrets: &'a BTreeMap<String, String>,
    pub command: Option<&'a CommandOverride>,
    pub entrypoint: Option<&'a CommandOverride>,
    pub storage: Option<&'a StorageConfig>,
    pub log_retention: u32,
    pub placement: Placement,
    pub security_groups: &'a [String],
}

impl ResolvedManifest {
    pub(crate) fn new(env: &str, workload: Workload) -> Self {
        Self {
            env: env.to_string(),
            workload,
            stage: Stage::Resolved,
            image_uri: None,
        }
    }

    pub fn env(&self) -> &str {
        &self.env
    }

    pub fn name(&self) -> &str {
        self.workload.name()
    }

    pub fn kind(&self) -> WorkloadKind {
        self.workload.kind()
    }

    pub fn workload(&self) -> &Workload {
        &self.workload
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// `load` で確定したコンテナイメージ
    pub fn image_uri(&self) -> Option<&str> {
        self.image_uri.as_deref()
    }

    fn image(&self) -> Option<&ImageConfig> {
        match &self.workload {
            Workload::ScheduledJob(job) => job.config.image.as_ref(),
            Workload::BackendService(svc) => svc.config.image.as_ref(),
        }
    }

    pub fn task(&self) -> TaskSettings<'_> {
        macro_rules! settings {
            ($config:expr) => {{
                let config = $config;
                let vpc = config.network.as_ref().and_then(|n| n.vpc.as_ref());
                TaskSettings {
                    cpu: config.cpu.unwrap_or(DEFAULT_CPU),
                    memory: config.memory.unwrap_or(DEFAULT_MEMORY),
                    variables: &config.variables,
                    secrets: &config.secrets,
                    command: config.command.as_ref(),
                    entrypoint: config.entrypoint.as_ref(),
                    storage: config.storage.as_ref(),
                    log_retention: config
                        .logging
                        .as_ref()
                        .and_then(|l| l.retention)
                        .unwrap_or(DEFAULT_LOG_RETENTION),
                    placement: config.placement(),
                    security_groups: vpc
                        .and_then(|v| v.security_groups.as_deref())
                        .unwrap_or_default(),
                }
            }};
        }

        match &self.workload {
            Workload::ScheduledJob(job) => settings!(&job.config),
            Workload::BackendService(svc) => settings!(&svc.config),
        }
    }

    /// 環境コントローラーに要求するアクション（列挙順）
    pub fn requested_actions(&self) -> BTreeSet<ControllerAction> {
        match &self.workload {
            Workload::ScheduledJob(job) => job.config.requested_actions(),
            Workload::BackendService(svc) => svc.config.requested_actions(),
        }
    }

    /// 構造的な不変条件を検証
    #[instrument(skip(self), fields(workload = %self.name(), env = %self.env))]
    pub fn validate(&mut self) -> Result<()> {
        let name = self.name().to_string();
        if name.trim().is_empty() {
            return Err(FlowError::validation(name, "name が指定されていません"));
        }

        let checked = match &self.workload {
            Workload::ScheduledJob(job) => job.config.validate(),
            Workload::BackendService(svc) => svc.config.validate(),
        };
        checked.map_err(|message| FlowError::validation(&name, message))?;

        if self.stage < Stage::Validated {
            self.stage = Stage::Validated;
        }
        debug!("Manifest validated");
        Ok(())
    }

    /// 計算値（コンテナイメージ URI）を読み込む
    ///
    /// `validate` 済みである必要がある。2回目以降の呼び出しは何もしない。
    #[instrument(skip(self, session), fields(workload = %self.name(), env = %self.env))]
    pub fn load(&mut self, session: &dyn Session) -> Result<()> {
        match self.stage {
            Stage::Resolved => {
                return Err(FlowError::validation(
                    self.name(),
                    "load の前に validate を実行してください",
                ));
            }
            Stage::Loaded => {
                debug!("Manifest already loaded");
                return Ok(());
            }
            Stage::Validated => {}
        }

        let image = self
            .image()
            .ok_or_else(|| FlowError::validation(self.name(), "image が指定されていません"))?;

        let uri = match (&image.location, &image.build) {
            (Some(location), _) => location.clone(),
            (None, Some(_)) => {
                let repository = session.repository_uri(self.name())?;
                let tag = session
                    .image_tag()
                    .unwrap_or_else(|| DEFAULT_IMAGE_TAG.to_string());
                format!("{repository}:{tag}")
            }
            (None, None) => {
                return Err(FlowError::validation(
                    self.name(),
                    "image.location または image.build のどちらかが必要です",
                ));
            }
        };

        info!(image = %uri, "Resolved container image");
        self.image_uri = Some(uri);
        self.stage = Stage::Loaded;
        Ok(())
    }

    /// テンプレート生成前の確認
    pub(crate) fn ensure_loaded(&self) -> Result<&str> {
        match (self.stage, self.image_uri.as_deref()) {
            (Stage::Loaded, Some(uri)) => Ok(uri),
            (stage, _) => Err(FlowError::template(
                "TaskDefinition",
                format!(
                    "'{}' のイメージが確定していません。validate と load を先に実行してください（現在: {stage}）",
                    self.name()
                ),
            )),
        }
    }
}
