//! ローカル設定から組み立てるセッション

use stackflow_core::{FlowError, Session};

/// `{registry}/{app}/{workload}` 形式のリポジトリを返すセッション
#[derive(Debug, Clone)]
pub struct LocalSession {
    registry: Option<String>,
    app: String,
    tag: Option<String>,
}

impl LocalSession {
    pub fn new(registry: Option<String>, app: impl Into<String>, tag: Option<String>) -> Self {
        Self {
            registry: registry.map(|r| r.trim_end_matches('/').to_string()),
            app: app.into(),
            tag,
        }
    }
}

impl Session for LocalSession {
    fn repository_uri(&self, workload: &str) -> stackflow_core::Result<String> {
        let registry = self.registry.as_deref().ok_or_else(|| {
            FlowError::Session(format!(
                "'{workload}' は image.build を使用していますが、レジストリが設定されていません。\
                 --registry または設定ファイルの registry を指定してください"
            ))
        })?;
        Ok(format!("{registry}/{}/{workload}", self.app))
    }

    fn image_tag(&self) -> Option<String> {
        self.tag.clone()
    }
}
