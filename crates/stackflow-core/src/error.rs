use crate::addon::AddonError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("マニフェストのパースエラー: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON 変換エラー: {0}")]
    Json(#[from] serde_json::Error),

    #[error("ファイル読み込みエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO エラー: {path}\n理由: {message}")]
    IoError { path: PathBuf, message: String },

    #[error("マニフェスト '{workload}' の検証エラー: {message}")]
    Validation { workload: String, message: String },

    #[error(
        "環境が見つかりません: {env}\nヒント: マニフェスト '{workload}' の environments に '{env}' を定義してください"
    )]
    EnvironmentNotFound { workload: String, env: String },

    #[error("テンプレートエラー: {resource}\n理由: {message}")]
    Template { resource: String, message: String },

    #[error("テンプレート展開エラー: {0}")]
    TemplateRender(String),

    #[error("アドオンのマージエラー: {0}")]
    AddonMerge(String),

    #[error("アドオンエラー: {0}")]
    Addon(#[from] AddonError),

    #[error("パラメータのシリアライズエラー: {0}")]
    Serialization(String),

    #[error("セッションエラー: {0}")]
    Session(String),

    #[error(
        "ワークスペースが見つかりません\n探索開始位置: {0}\nヒント: stackflow/ ディレクトリを含むディレクトリで実行してください"
    )]
    WorkspaceNotFound(PathBuf),

    #[error("ワークロードが見つかりません: {0}")]
    WorkloadNotFound(String),
}

impl FlowError {
    pub(crate) fn validation(workload: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            workload: workload.into(),
            message: message.into(),
        }
    }

    pub(crate) fn template(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Template {
            resource: resource.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FlowError>;
