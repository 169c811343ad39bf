//! StackFlow のユーザー・プロジェクト設定

pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 設定ファイルのパスを直接指定する環境変数
pub const CONFIG_PATH_ENV: &str = "STACKFLOW_CONFIG_PATH";

const PROJECT_CONFIG: &str = "stackflow.yml";
const PROJECT_CONFIG_DIR: &str = ".stackflow";
const CONFIG_FILE: &str = "config.yml";

/// 設定内容
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// `build` イメージのリポジトリプレフィックス (例: `123456789012.dkr.ecr.us-west-2.amazonaws.com`)
    #[serde(default)]
    pub registry: Option<String>,

    /// `build` イメージのタグ
    #[serde(default)]
    pub image_tag: Option<String>,

    /// 環境コントローラーの配置場所 (`s3://bucket/key`)
    #[serde(default)]
    pub env_controller_location: Option<String>,
}

impl Settings {
    /// ファイルから読み込む
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        // 空ファイルはデフォルト設定として扱う
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 設定ファイルを探して読み込む
    ///
    /// どこにも設定ファイルがなければデフォルト設定を返す。
    pub fn load() -> Result<Self> {
        match find_config_file() {
            Ok(path) => {
                tracing::debug!(path = %path.display(), "設定ファイルを読み込みます");
                Self::from_file(&path)
            }
            Err(ConfigError::ConfigFileNotFound) => {
                tracing::debug!("設定ファイルがないためデフォルト設定を使用します");
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }
}

/// StackFlow のグローバル設定ディレクトリ
pub fn get_config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("stackflow"))
        .ok_or(ConfigError::ConfigDirNotFound)
}

/// 設定ファイルを探す
///
/// 以下の優先順位で検索:
/// 1. 環境変数 STACKFLOW_CONFIG_PATH (直接パス指定)
/// 2. カレントディレクトリ: stackflow.yml
/// 3. ./.stackflow/config.yml
/// 4. ~/.config/stackflow/config.yml (グローバル設定)
pub fn find_config_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
        tracing::warn!(path = %path.display(), "{CONFIG_PATH_ENV} のファイルが存在しません");
    }

    let current_dir = std::env::current_dir()?;
    let candidates = [
        current_dir.join(PROJECT_CONFIG),
        current_dir.join(PROJECT_CONFIG_DIR).join(CONFIG_FILE),
    ];
    if let Some(path) = candidates.into_iter().find(|path| path.is_file()) {
        return Ok(path);
    }

    if let Ok(config_dir) = get_config_dir() {
        let global_config = config_dir.join(CONFIG_FILE);
        if global_config.is_file() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::ConfigFileNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    /// 一時ディレクトリを cwd にしてテストを実行する
    fn in_dir<R>(dir: &Path, f: impl FnOnce() -> R) -> R {
        let original_dir = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir).unwrap();
        let result = f();
        std::env::set_current_dir(original_dir).unwrap();
        result
    }

    #[test]
    fn test_get_config_dir() {
        let config_dir = get_config_dir().unwrap();
        assert!(config_dir.ends_with("stackflow"));
    }

    #[test]
    #[serial]
    fn test_find_config_in_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("stackflow.yml"), "image_tag: v1\n").unwrap();

        let found = temp_env::with_var_unset(CONFIG_PATH_ENV, || {
            in_dir(temp_dir.path(), find_config_file)
        })
        .unwrap();
        assert!(found.ends_with("stackflow.yml"));
    }

    #[test]
    #[serial]
    fn test_project_file_wins_over_dot_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dot_dir = temp_dir.path().join(".stackflow");
        fs::create_dir(&dot_dir).unwrap();
        fs::write(dot_dir.join("config.yml"), "image_tag: hidden\n").unwrap();

        let found = temp_env::with_var_unset(CONFIG_PATH_ENV, || {
            in_dir(temp_dir.path(), find_config_file)
        })
        .unwrap();
        assert!(found.ends_with(".stackflow/config.yml"));

        fs::write(temp_dir.path().join("stackflow.yml"), "image_tag: visible\n").unwrap();
        let settings = temp_env::with_var_unset(CONFIG_PATH_ENV, || {
            in_dir(temp_dir.path(), Settings::load)
        })
        .unwrap();
        assert_eq!(settings.image_tag.as_deref(), Some("visible"));
    }

    #[test]
    #[serial]
    fn test_env_var_takes_priority() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("custom.yml");
        fs::write(
            &config_path,
            "registry: 123456789012.dkr.ecr.us-west-2.amazonaws.com\n\
             env_controller_location: s3://my-bucket/agents/env-controller.zip\n",
        )
        .unwrap();

        let settings =
            temp_env::with_var(CONFIG_PATH_ENV, Some(&config_path), Settings::load).unwrap();
        assert_eq!(
            settings.registry.as_deref(),
            Some("123456789012.dkr.ecr.us-west-2.amazonaws.com")
        );
        assert_eq!(settings.image_tag, None);
        assert_eq!(
            settings.env_controller_location.as_deref(),
            Some("s3://my-bucket/agents/env-controller.zip")
        );
    }

    #[test]
    #[serial]
    fn test_missing_config_uses_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let vars = [
            (CONFIG_PATH_ENV, None),
            ("XDG_CONFIG_HOME", Some(temp_dir.path().as_os_str())),
        ];

        let result =
            temp_env::with_vars(vars, || in_dir(temp_dir.path(), find_config_file));
        assert!(matches!(result, Err(ConfigError::ConfigFileNotFound)));

        let settings =
            temp_env::with_vars(vars, || in_dir(temp_dir.path(), Settings::load)).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("stackflow.yml");
        fs::write(&path, "registy: typo\n").unwrap();

        let err = Settings::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("stackflow.yml"));
    }

    #[test]
    fn test_empty_file_is_default() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("stackflow.yml");
        fs::write(&path, "\n").unwrap();

        assert_eq!(Settings::from_file(&path).unwrap(), Settings::default());
    }
}
