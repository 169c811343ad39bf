//! 種別共通のバリデーション

use super::common::{ImageConfig, LoggingConfig, StorageConfig};
use std::collections::BTreeMap;

/// ワークロードに自動で注入される環境変数のプレフィックス
pub const RESERVED_VARIABLE_PREFIX: &str = "STACKFLOW_";

pub(crate) const DEFAULT_CPU: u32 = 256;
pub(crate) const DEFAULT_MEMORY: u32 = 512;
pub(crate) const DEFAULT_LOG_RETENTION: u32 = 30;

/// CloudWatch Logs が受け付ける保持期間（日）
const LOG_RETENTION_DAYS: &[u32] = &[
    1, 3, 5, 7, 14, 30, 60, 90, 120, 150, 180, 365, 400, 545, 731, 1096, 1827, 2192, 2557, 2922,
    3288, 3653,
];

pub(crate) fn image(image: Option<&ImageConfig>) -> Result<(), String> {
    let image = image.ok_or("image が指定されていません")?;
    match (&image.location, &image.build) {
        (Some(_), Some(_)) => Err("image.location と image.build は同時に指定できません".into()),
        (None, None) => Err("image.location または image.build のどちらかが必要です".into()),
        (Some(location), None) if location.trim().is_empty() => {
            Err("image.location が空です".into())
        }
        _ => Ok(()),
    }
}

/// Fargate で許可されている CPU / メモリの組み合わせか確認
pub(crate) fn task_size(cpu: Option<u32>, memory: Option<u32>) -> Result<(), String> {
    let cpu = cpu.unwrap_or(DEFAULT_CPU);
    let memory = memory.unwrap_or(DEFAULT_MEMORY);

    let allowed = match cpu {
        256 => [512, 1024, 2048].contains(&memory),
        512 => (1024..=4096).contains(&memory) && memory % 1024 == 0,
        1024 => (2048..=8192).contains(&memory) && memory % 1024 == 0,
        2048 => (4096..=16384).contains(&memory) && memory % 1024 == 0,
        4096 => (8192..=30720).contains(&memory) && memory % 1024 == 0,
        _ => return Err(format!("cpu の値が不正です: {cpu}（256, 512, 1024, 2048, 4096）")),
    };
    if allowed {
        Ok(())
    } else {
        Err(format!(
            "cpu={cpu} と memory={memory} の組み合わせはサポートされていません"
        ))
    }
}

pub(crate) fn variables(
    variables: &BTreeMap<String, String>,
    secrets: &BTreeMap<String, String>,
) -> Result<(), String> {
    for key in variables.keys().chain(secrets.keys()) {
        if key.is_empty() {
            return Err("環境変数名が空です".into());
        }
        if key.starts_with(RESERVED_VARIABLE_PREFIX) {
            return Err(format!(
                "{RESERVED_VARIABLE_PREFIX} で始まる環境変数名は予約されています: {key}"
            ));
        }
    }
    if let Some(key) = variables.keys().find(|k| secrets.contains_key(*k)) {
        return Err(format!(
            "'{key}' が variables と secrets の両方に定義されています"
        ));
    }
    if let Some((key, _)) = secrets.iter().find(|(_, v)| v.trim().is_empty()) {
        return Err(format!("secret '{key}' の参照先が空です"));
    }
    Ok(())
}

pub(crate) fn storage(storage: Option<&StorageConfig>) -> Result<(), String> {
    let Some(volumes) = storage.and_then(|s| s.volumes.as_ref()) else {
        return Ok(());
    };
    for (name, volume) in volumes {
        let path = volume
            .path
            .as_deref()
            .ok_or_else(|| format!("volume '{name}' に path が指定されていません"))?;
        if !path.starts_with('/') {
            return Err(format!(
                "volume '{name}' の path は絶対パスである必要があります: {path}"
            ));
        }
        if volume.efs.is_none() {
            return Err(format!("volume '{name}' に efs が指定されていません"));
        }
    }
    Ok(())
}

pub(crate) fn logging(logging: Option<&LoggingConfig>) -> Result<(), String> {
    match logging.and_then(|l| l.retention) {
        Some(days) if !LOG_RETENTION_DAYS.contains(&days) => Err(format!(
            "logging.retention の値が不正です: {days}（CloudWatch Logs の保持期間を指定してください）"
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EfsConfig, Volume};

    #[test]
    fn test_image_requires_exactly_one_source() {
        assert!(image(None).is_err());
        assert!(image(Some(&ImageConfig::default())).is_err());
        assert!(
            image(Some(&ImageConfig {
                location: Some("nginx".to_string()),
                ..Default::default()
            }))
            .is_ok()
        );
    }

    #[test]
    fn test_task_size_combinations() {
        assert!(task_size(None, None).is_ok());
        assert!(task_size(Some(1024), Some(2048)).is_ok());
        assert!(task_size(Some(256), Some(4096)).is_err());
        assert!(task_size(Some(300), Some(512)).is_err());
        assert!(task_size(Some(512), Some(1500)).is_err());
    }

    #[test]
    fn test_reserved_variable_prefix() {
        let vars = BTreeMap::from([("STACKFLOW_APP".to_string(), "x".to_string())]);
        assert!(variables(&vars, &BTreeMap::new()).is_err());

        let vars = BTreeMap::from([("DB".to_string(), "x".to_string())]);
        let secrets = BTreeMap::from([("DB".to_string(), "/db/password".to_string())]);
        assert!(variables(&vars, &secrets).is_err());
    }

    #[test]
    fn test_storage_requires_absolute_path() {
        let storage_config = StorageConfig {
            volumes: Some(BTreeMap::from([(
                "data".to_string(),
                Volume {
                    path: Some("data".to_string()),
                    read_only: false,
                    efs: Some(EfsConfig::Managed(true)),
                },
            )])),
        };
        assert!(storage(Some(&storage_config)).is_err());
    }

    #[test]
    fn test_log_retention() {
        assert!(logging(Some(&LoggingConfig { retention: Some(30) })).is_ok());
        assert!(logging(Some(&LoggingConfig { retention: Some(31) })).is_err());
    }
}
