//! Backend Service 定義

use super::action::ControllerAction;
use super::common::{
    CommandOverride, ImageConfig, LoggingConfig, NetworkConfig, Placement, StorageConfig,
};
use super::job::uses_managed_filesystem;
use super::overlay::{Overlay, extend, merge, replace};
use super::validate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// 最大タスク数
pub const MAX_TASK_COUNT: u32 = 100;

/// リスナールール優先度の上限
pub const MAX_LISTENER_PRIORITY: u32 = 50_000;

/// 環境内部からのみアクセスされる常駐サービス
///
/// YAML形式：
/// ```yaml
/// name: api
/// type: Backend Service
/// image:
///   build: api/Dockerfile
///   port: 8080
/// http:
///   path: /api
///   healthcheck: /healthz
/// network:
///   service_discovery: true
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendService {
    pub name: String,
    #[serde(flatten)]
    pub config: ServiceConfig,
    /// 環境ごとのオーバーライド
    #[serde(default)]
    pub environments: BTreeMap<String, ServiceConfig>,
}

/// サービスの設定（環境オーバーライドも同じ形）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub image: Option<ImageConfig>,
    pub cpu: Option<u32>,
    pub memory: Option<u32>,
    /// 起動するタスク数
    pub count: Option<u32>,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    #[serde(default)]
    pub secrets: BTreeMap<String, String>,
    pub command: Option<CommandOverride>,
    pub entrypoint: Option<CommandOverride>,
    /// 内部ロードバランサー経由の HTTP ルーティング
    pub http: Option<HttpConfig>,
    pub network: Option<NetworkConfig>,
    pub storage: Option<StorageConfig>,
    pub logging: Option<LoggingConfig>,
}

/// 内部ロードバランサーの設定
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// ルーティングするパス（例: /api）
    pub path: Option<String>,
    /// ヘルスチェックのパス
    pub healthcheck: Option<String>,
    /// リスナールールの優先度（1〜50000）
    ///
    /// 省略時はアプリ名・環境名・ワークロード名のハッシュから決まる。
    /// 同じ環境のサービス同士で値が衝突するとデプロイに失敗するため、
    /// その場合はここで明示する。
    pub priority: Option<u32>,
}

impl Overlay for HttpConfig {
    fn overlay(&mut self, other: Self) {
        replace(&mut self.path, other.path);
        replace(&mut self.healthcheck, other.healthcheck);
        replace(&mut self.priority, other.priority);
    }
}

impl HttpConfig {
    pub fn healthcheck_path(&self) -> &str {
        self.healthcheck.as_deref().unwrap_or("/")
    }

    /// リスナールールのパスパターン
    pub fn path_patterns(&self) -> Vec<String> {
        let path = self.path.as_deref().unwrap_or("/").trim_end_matches('/');
        if path.is_empty() {
            vec!["/*".to_string()]
        } else {
            vec![path.to_string(), format!("{path}/*")]
        }
    }
}

impl Overlay for ServiceConfig {
    fn overlay(&mut self, other: Self) {
        merge(&mut self.image, other.image);
        replace(&mut self.cpu, other.cpu);
        replace(&mut self.memory, other.memory);
        replace(&mut self.count, other.count);
        extend(&mut self.variables, other.variables);
        extend(&mut self.secrets, other.secrets);
        replace(&mut self.command, other.command);
        replace(&mut self.entrypoint, other.entrypoint);
        merge(&mut self.http, other.http);
        merge(&mut self.network, other.network);
        merge(&mut self.storage, other.storage);
        merge(&mut self.logging, other.logging);
    }
}

impl ServiceConfig {
    pub fn port(&self) -> Option<u16> {
        self.image.as_ref().and_then(|i| i.port)
    }

    pub fn service_discovery(&self) -> bool {
        self.network
            .as_ref()
            .and_then(|n| n.service_discovery)
            .unwrap_or(false)
    }

    pub fn placement(&self) -> Placement {
        self.network
            .as_ref()
            .map(NetworkConfig::placement)
            .unwrap_or_default()
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        validate::image(self.image.as_ref())?;
        if self.port() == Some(0) {
            return Err("image.port は1以上である必要があります".into());
        }
        validate::task_size(self.cpu, self.memory)?;
        if let Some(count) = self.count
            && count > MAX_TASK_COUNT
        {
            return Err(format!(
                "count は0〜{MAX_TASK_COUNT}の範囲で指定してください: {count}"
            ));
        }
        validate::variables(&self.variables, &self.secrets)?;
        if self.command.as_ref().is_some_and(CommandOverride::is_empty) {
            return Err("command が空です".into());
        }
        if self.entrypoint.as_ref().is_some_and(CommandOverride::is_empty) {
            return Err("entrypoint が空です".into());
        }
        if let Some(http) = &self.http {
            if self.port().is_none() {
                return Err("http を使用するには image.port が必要です".into());
            }
            for path in [http.path.as_deref(), http.healthcheck.as_deref()]
                .into_iter()
                .flatten()
            {
                if !path.starts_with('/') {
                    return Err(format!("http のパスは '/' で始まる必要があります: {path}"));
                }
            }
            if let Some(priority) = http.priority
                && !(1..=MAX_LISTENER_PRIORITY).contains(&priority)
            {
                return Err(format!(
                    "http.priority は1〜{MAX_LISTENER_PRIORITY}の範囲で指定してください: {priority}"
                ));
            }
        }
        if self.service_discovery() && self.port().is_none() {
            return Err("サービスディスカバリを使用するには image.port が必要です".into());
        }
        validate::storage(self.storage.as_ref())?;
        validate::logging(self.logging.as_ref())?;
        Ok(())
    }

    /// 環境コントローラーに要求するアクション
    pub fn requested_actions(&self) -> BTreeSet<ControllerAction> {
        let mut actions = BTreeSet::new();
        if self.http.is_some() {
            actions.insert(ControllerAction::InternalLoadBalancer);
        }
        if self.placement() == Placement::Private {
            actions.insert(ControllerAction::NatGateway);
        }
        if uses_managed_filesystem(self.storage.as_ref()) {
            actions.insert(ControllerAction::SharedFilesystem);
        }
        if self.service_discovery() {
            actions.insert(ControllerAction::ServiceDiscovery);
        }
        actions
    }
}
