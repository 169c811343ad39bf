//! デプロイ時に呼び出し側から渡される値

use crate::error::{FlowError, Result};
use std::fmt;
use std::str::FromStr;

/// 環境コントローラーの既定の配布先バケット
pub const DEFAULT_AGENT_BUCKET: &str = "stackflow-artifacts";

/// デプロイ時のコンテキスト
///
/// マニフェストからは導出できない値の束。合成呼び出しごとに渡す。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeContext {
    pub app_name: String,
    pub env_name: String,
    /// サービスディスカバリの DNS サフィックス（例: test.my-app.local）
    pub service_discovery_endpoint: String,
    /// 環境スタックのバージョン（例: v1.42.0）
    pub env_version: String,
    /// アップロード済みアドオンテンプレートの URL
    pub addons_template_url: Option<String>,
    /// 環境コントローラーの配布先（s3://bucket/key）
    pub env_controller_location: Option<String>,
}

impl RuntimeContext {
    pub fn new(
        app_name: impl Into<String>,
        env_name: impl Into<String>,
        service_discovery_endpoint: impl Into<String>,
        env_version: impl Into<String>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            env_name: env_name.into(),
            service_discovery_endpoint: service_discovery_endpoint.into(),
            env_version: env_version.into(),
            addons_template_url: None,
            env_controller_location: None,
        }
    }

    pub fn with_addons_template_url(mut self, url: impl Into<String>) -> Self {
        self.addons_template_url = Some(url.into());
        self
    }

    pub fn with_env_controller_location(mut self, location: impl Into<String>) -> Self {
        self.env_controller_location = Some(location.into());
        self
    }

    /// 環境コントローラーの配布先
    ///
    /// 未指定の場合は `env_version` ごとの既定の場所を使う。
    pub fn agent_location(&self) -> Result<AgentLocation> {
        match &self.env_controller_location {
            Some(location) => location.parse(),
            None => Ok(AgentLocation::versioned(&self.env_version)),
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let required = [
            ("app_name", &self.app_name),
            ("env_name", &self.env_name),
            ("service_discovery_endpoint", &self.service_discovery_endpoint),
            ("env_version", &self.env_version),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(FlowError::validation(
                    "",
                    format!("ランタイムコンテキストの {field} が空です"),
                ));
            }
        }
        self.agent_location()?;
        Ok(())
    }
}

/// パッケージ済みエージェントの配置場所
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentLocation {
    pub bucket: String,
    pub key: String,
}

impl AgentLocation {
    pub fn versioned(env_version: &str) -> Self {
        Self {
            bucket: DEFAULT_AGENT_BUCKET.to_string(),
            key: format!("env-controller/{env_version}/bootstrap.zip"),
        }
    }
}

impl FromStr for AgentLocation {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || {
            FlowError::validation(
                "",
                format!("環境コントローラーの場所は s3://bucket/key 形式で指定してください: {s}"),
            )
        };
        let rest = s.strip_prefix("s3://").ok_or_else(invalid)?;
        let (bucket, key) = rest.split_once('/').ok_or_else(invalid)?;
        if bucket.is_empty() || key.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }
}

impl fmt::Display for AgentLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_location_parse() {
        let location: AgentLocation = "s3://my-bucket/agents/env-controller.zip".parse().unwrap();
        assert_eq!(location.bucket, "my-bucket");
        assert_eq!(location.key, "agents/env-controller.zip");
        assert_eq!(
            location.to_string(),
            "s3://my-bucket/agents/env-controller.zip"
        );
    }

    #[test]
    fn test_agent_location_invalid() {
        assert!("https://example.com/a.zip".parse::<AgentLocation>().is_err());
        assert!("s3://bucket-only".parse::<AgentLocation>().is_err());
        assert!("s3:///key".parse::<AgentLocation>().is_err());
    }

    #[test]
    fn test_agent_location_default_is_versioned() {
        let context = RuntimeContext::new("my-app", "test", "test.my-app.local", "v1.42.0");
        let location = context.agent_location().unwrap();
        assert_eq!(location.bucket, DEFAULT_AGENT_BUCKET);
        assert_eq!(location.key, "env-controller/v1.42.0/bootstrap.zip");
    }

    #[test]
    fn test_context_validate() {
        let context = RuntimeContext::new("my-app", "test", "test.my-app.local", "v1.42.0");
        assert!(context.validate().is_ok());

        let context = RuntimeContext::new("my-app", "", "test.my-app.local", "v1.42.0");
        assert!(context.validate().is_err());

        let context = RuntimeContext::new("my-app", "test", "test.my-app.local", "v1.42.0")
            .with_env_controller_location("bucket/key");
        assert!(context.validate().is_err());
    }
}
