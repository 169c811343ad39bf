//! ワークロード種別に共通の設定

use super::overlay::{Overlay, merge, replace};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// コンテナイメージ設定
///
/// YAML形式：
/// ```yaml
/// image:
///   build: ./mailer/Dockerfile
///   port: 8080
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageConfig {
    /// 既存イメージの場所（例: public.ecr.aws/nginx/nginx:latest）
    pub location: Option<String>,
    /// ビルド設定
    pub build: Option<BuildConfig>,
    /// コンテナが公開するポート
    pub port: Option<u16>,
}

impl Overlay for ImageConfig {
    fn overlay(&mut self, other: Self) {
        // location と build は排他なので、片方が上書きされたらもう片方は消す
        if other.location.is_some() {
            self.build = None;
        }
        if other.build.is_some() {
            self.location = None;
        }
        replace(&mut self.location, other.location);
        replace(&mut self.build, other.build);
        replace(&mut self.port, other.port);
    }
}

/// ビルド設定
///
/// 文字列（Dockerfileのパス）または詳細設定のどちらでも記述できる。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BuildConfig {
    Dockerfile(PathBuf),
    Detailed(BuildArgs),
}

/// ビルドの詳細設定
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildArgs {
    pub dockerfile: Option<PathBuf>,
    pub context: Option<PathBuf>,
    pub target: Option<String>,
    #[serde(default)]
    pub args: BTreeMap<String, String>,
}

/// command / entrypoint の上書き
///
/// 文字列の場合は空白で分割する。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandOverride {
    Shell(String),
    Args(Vec<String>),
}

impl CommandOverride {
    pub fn to_args(&self) -> Vec<String> {
        match self {
            Self::Shell(s) => s.split_whitespace().map(str::to_string).collect(),
            Self::Args(args) => args.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Shell(s) => s.trim().is_empty(),
            Self::Args(args) => args.is_empty(),
        }
    }
}

/// ネットワーク設定
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub vpc: Option<VpcConfig>,
    /// サービスディスカバリに登録するか（Backend Service のみ）
    pub service_discovery: Option<bool>,
}

impl Overlay for NetworkConfig {
    fn overlay(&mut self, other: Self) {
        merge(&mut self.vpc, other.vpc);
        replace(&mut self.service_discovery, other.service_discovery);
    }
}

impl NetworkConfig {
    pub fn placement(&self) -> Placement {
        self.vpc
            .as_ref()
            .and_then(|vpc| vpc.placement)
            .unwrap_or_default()
    }
}

/// VPC 設定
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VpcConfig {
    pub placement: Option<Placement>,
    pub security_groups: Option<Vec<String>>,
}

impl Overlay for VpcConfig {
    fn overlay(&mut self, other: Self) {
        replace(&mut self.placement, other.placement);
        replace(&mut self.security_groups, other.security_groups);
    }
}

/// タスクを配置するサブネット
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    #[default]
    Public,
    Private,
}

impl Placement {
    /// 環境スタックがエクスポートしているサブネット一覧の名前
    pub fn subnets_export(&self) -> &'static str {
        match self {
            Self::Public => "PublicSubnets",
            Self::Private => "PrivateSubnets",
        }
    }

    pub fn assign_public_ip(&self) -> &'static str {
        match self {
            Self::Public => "ENABLED",
            Self::Private => "DISABLED",
        }
    }
}

/// ストレージ設定
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// ボリューム定義（環境オーバーライドでは丸ごと置き換え）
    pub volumes: Option<BTreeMap<String, Volume>>,
}

impl Overlay for StorageConfig {
    fn overlay(&mut self, other: Self) {
        replace(&mut self.volumes, other.volumes);
    }
}

/// ボリューム定義
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    /// コンテナ内のマウント先
    pub path: Option<String>,
    #[serde(default)]
    pub read_only: bool,
    pub efs: Option<EfsConfig>,
}

/// EFS ボリューム設定
///
/// `efs: true` は環境が管理する共有ファイルシステムを使う。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EfsConfig {
    Managed(bool),
    Existing {
        id: String,
        root_dir: Option<String>,
    },
}

impl EfsConfig {
    pub fn is_managed(&self) -> bool {
        matches!(self, Self::Managed(true))
    }
}

/// ログ設定
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// ログの保持期間（日）
    pub retention: Option<u32>,
}

impl Overlay for LoggingConfig {
    fn overlay(&mut self, other: Self) {
        replace(&mut self.retention, other.retention);
    }
}
