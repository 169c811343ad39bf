//! ワークスペース探索
//!
//! `stackflow/` ディレクトリを持つディレクトリをワークスペースのルートとし、
//! 規約に従ってマニフェストとアドオンを探す。

use crate::addon::AddonError;
use crate::error::{FlowError, Result};
use crate::model::Workload;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// ワークスペースのルートを上書きする環境変数
pub const WORKSPACE_ROOT_ENV: &str = "STACKFLOW_WORKSPACE_ROOT";

/// ワークスペース内のディレクトリ名
pub const WORKSPACE_DIR: &str = "stackflow";

const MANIFEST_FILE: &str = "manifest.yml";
const ADDONS_DIR: &str = "addons";

/// ワークロード定義を含むワークスペース
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// 指定ディレクトリをルートとして開く
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.join(WORKSPACE_DIR).is_dir() {
            return Err(FlowError::WorkspaceNotFound(root));
        }
        Ok(Self { root })
    }

    /// ワークスペースを探索
    ///
    /// 以下の優先順位で検索:
    /// 1. 環境変数 STACKFLOW_WORKSPACE_ROOT
    /// 2. カレントディレクトリから上に向かって stackflow/ を探す
    #[tracing::instrument]
    pub fn discover() -> Result<Self> {
        if let Ok(root) = std::env::var(WORKSPACE_ROOT_ENV) {
            debug!(env_root = %root, "Checking STACKFLOW_WORKSPACE_ROOT");
            let workspace = Self::open(&root);
            if workspace.is_ok() {
                info!(workspace_root = %root, "Found workspace from environment variable");
            }
            return workspace;
        }

        let start_dir = std::env::current_dir()?;
        Self::discover_from(&start_dir)
    }

    /// 指定ディレクトリから上に向かって探索
    pub fn discover_from(start_dir: &Path) -> Result<Self> {
        let mut current = start_dir.to_path_buf();
        loop {
            debug!(checking = %current.display(), "Looking for stackflow/");
            if current.join(WORKSPACE_DIR).is_dir() {
                info!(workspace_root = %current.display(), "Found workspace");
                return Ok(Self { root: current });
            }
            if !current.pop() {
                break;
            }
        }

        warn!(start_dir = %start_dir.display(), "Workspace not found");
        Err(FlowError::WorkspaceNotFound(start_dir.to_path_buf()))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn workload_dir(&self, name: &str) -> PathBuf {
        self.root.join(WORKSPACE_DIR).join(name)
    }

    pub fn manifest_path(&self, name: &str) -> PathBuf {
        self.workload_dir(name).join(MANIFEST_FILE)
    }

    /// ワークロード名の一覧（アルファベット順）
    pub fn workload_names(&self) -> Result<Vec<String>> {
        let dir = self.root.join(WORKSPACE_DIR);
        let entries = std::fs::read_dir(&dir).map_err(|e| FlowError::IoError {
            path: dir.clone(),
            message: format!("ディレクトリの読み込みに失敗: {e}"),
        })?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| FlowError::IoError {
                path: dir.clone(),
                message: format!("ディレクトリエントリの読み込みに失敗: {e}"),
            })?;
            let path = entry.path();
            if path.join(MANIFEST_FILE).is_file()
                && let Some(name) = path.file_name().and_then(|n| n.to_str())
            {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// マニフェストを読み込んでパース
    #[tracing::instrument(skip(self))]
    pub fn read_manifest(&self, name: &str) -> Result<Workload> {
        let path = self.manifest_path(name);
        if !path.is_file() {
            return Err(FlowError::WorkloadNotFound(name.to_string()));
        }
        let content = std::fs::read_to_string(&path).map_err(|e| FlowError::IoError {
            path: path.clone(),
            message: e.to_string(),
        })?;
        let workload = Workload::from_yaml(&content)?;
        if workload.name() != name {
            warn!(
                directory = %name,
                manifest_name = %workload.name(),
                "Manifest name differs from its directory"
            );
        }
        Ok(workload)
    }

    /// アドオンファイル（*.yml / *.yaml）をパス順に列挙
    ///
    /// ディレクトリが無い場合は空。
    pub fn addon_files(&self, name: &str) -> std::result::Result<Vec<PathBuf>, AddonError> {
        let dir = self.workload_dir(name).join(ADDONS_DIR);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for extension in ["yml", "yaml"] {
            let pattern = dir.join(format!("*.{extension}"));
            let pattern = pattern.to_string_lossy();
            let paths = glob::glob(&pattern).map_err(|e| AddonError::Malformed {
                path: dir.clone(),
                message: e.to_string(),
            })?;
            for entry in paths {
                let path = entry.map_err(|e| AddonError::Io {
                    path: e.path().to_path_buf(),
                    source: e.into_error(),
                })?;
                if path.is_file() {
                    files.push(path);
                }
            }
        }

        files.sort();
        debug!(count = files.len(), dir = %dir.display(), "Discovered addon files");
        Ok(files)
    }
}
