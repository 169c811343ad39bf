//! Backend Service 固有の値

use crate::error::{FlowError, Result};
use crate::model::{MAX_LISTENER_PRIORITY, ServiceConfig};
use serde::Serialize;

/// ハッシュから決める優先度の下限（それ未満は手動指定用に空けておく）
const PRIORITY_MIN: u32 = 1_000;
const PRIORITY_SPAN: u32 = MAX_LISTENER_PRIORITY - PRIORITY_MIN;

/// タスク数の既定値
pub(super) const DEFAULT_TASK_COUNT: u32 = 1;

#[derive(Debug, Serialize)]
pub(super) struct ServiceContext {
    pub service_discovery: bool,
    pub http: Option<HttpRoute>,
}

#[derive(Debug, Serialize)]
pub(super) struct HttpRoute {
    pub healthcheck: String,
    pub path_patterns: Vec<String>,
    pub priority: u32,
}

pub(super) fn context(
    config: &ServiceConfig,
    app: &str,
    env: &str,
    name: &str,
) -> Result<ServiceContext> {
    let service_discovery = config.service_discovery();
    if service_discovery && config.port().is_none() {
        return Err(FlowError::template(
            "DiscoveryService",
            "image.port が指定されていません",
        ));
    }

    let http = match &config.http {
        Some(http) => {
            if config.port().is_none() {
                return Err(FlowError::template(
                    "TargetGroup",
                    "image.port が指定されていません",
                ));
            }
            Some(HttpRoute {
                healthcheck: http.healthcheck_path().to_string(),
                path_patterns: http.path_patterns(),
                priority: http
                    .priority
                    .unwrap_or_else(|| listener_rule_priority(app, env, name)),
            })
        }
        None => None,
    };

    Ok(ServiceContext {
        service_discovery,
        http,
    })
}

/// 内部ロードバランサーのリスナールール優先度
///
/// 同じアプリ・環境・ワークロード名からは常に同じ値になる（FNV-1a）。
/// 取りうる値は49000通りしかなく、同じ環境のサービス間で衝突しうる。
/// 衝突した場合はマニフェストの `http.priority` で上書きする。
pub fn listener_rule_priority(app: &str, env: &str, name: &str) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;

    let key = format!("{app}/{env}/{name}");
    let hash = key.bytes().fold(OFFSET_BASIS, |hash, byte| {
        (hash ^ u32::from(byte)).wrapping_mul(PRIME)
    });
    PRIORITY_MIN + hash % PRIORITY_SPAN
}
