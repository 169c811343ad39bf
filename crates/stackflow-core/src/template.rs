//! テンプレート展開機能
//!
//! Teraを使用して、バイナリに埋め込んだテンプレートから
//! CloudFormation テンプレートを展開します。

use crate::error::{FlowError, Result};
use serde::Serialize;
use std::collections::HashMap;
use tera::{Context, Tera, Value};
use tracing::debug;

/// Scheduled Job のテンプレート名
pub const SCHEDULED_JOB_TEMPLATE: &str = "workloads/scheduled-job.yml";
/// Backend Service のテンプレート名
pub const BACKEND_SERVICE_TEMPLATE: &str = "workloads/backend-service.yml";

const EMBEDDED_TEMPLATES: &[(&str, &str)] = &[
    (
        SCHEDULED_JOB_TEMPLATE,
        include_str!("../templates/workloads/scheduled-job.yml"),
    ),
    (
        BACKEND_SERVICE_TEMPLATE,
        include_str!("../templates/workloads/backend-service.yml"),
    ),
    (
        "partials/parameters.yml",
        include_str!("../templates/partials/parameters.yml"),
    ),
    (
        "partials/task.yml",
        include_str!("../templates/partials/task.yml"),
    ),
    (
        "partials/env-controller.yml",
        include_str!("../templates/partials/env-controller.yml"),
    ),
    (
        "partials/addons.yml",
        include_str!("../templates/partials/addons.yml"),
    ),
];

/// テンプレートレンダラ
pub struct TemplateRenderer {
    tera: Tera,
}

impl TemplateRenderer {
    /// 埋め込みテンプレートを読み込んだレンダラを作成
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(EMBEDDED_TEMPLATES.iter().copied())
            .map_err(|e| FlowError::TemplateRender(extract_tera_error_detail(&e)))?;
        tera.register_filter("quote", quote);
        Ok(Self { tera })
    }

    /// 登録済みテンプレートを展開
    pub fn render(&self, name: &str, values: &impl Serialize) -> Result<String> {
        let context = Context::from_serialize(values)
            .map_err(|e| FlowError::TemplateRender(extract_tera_error_detail(&e)))?;
        debug!(template = %name, "Rendering template");
        self.tera.render(name, &context).map_err(|e| {
            FlowError::template(name, extract_tera_error_detail(&e))
        })
    }

    /// 文字列をテンプレートとして展開
    pub fn render_str(&mut self, template: &str, values: &impl Serialize) -> Result<String> {
        let context = Context::from_serialize(values)
            .map_err(|e| FlowError::TemplateRender(extract_tera_error_detail(&e)))?;
        self.tera
            .render_str(template, &context)
            .map_err(|e| FlowError::TemplateRender(extract_tera_error_detail(&e)))
    }
}

/// YAML のダブルクォート文字列として出力するフィルタ
///
/// JSON の文字列リテラルは YAML のダブルクォート文字列としてそのまま有効。
fn quote(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    serde_json::to_string(&text)
        .map(Value::String)
        .map_err(|e| tera::Error::msg(format!("quote: {e}")))
}

/// Teraのエラーから詳細情報を抽出
fn extract_tera_error_detail(e: &tera::Error) -> String {
    use std::error::Error;

    // エラーチェーンを走査して詳細を収集
    let mut details = vec![e.to_string()];
    let mut source = e.source();
    while let Some(err) = source {
        details.push(err.to_string());
        source = err.source();
    }

    let full_error = details.join(" | ");

    if full_error.contains("not found in context")
        && let Some(start) = full_error.find("Variable `")
        && let Some(end) = full_error[start..].find("` not found")
    {
        let var_name = &full_error[start + 10..start + end];
        return format!("未定義の変数: `{var_name}`");
    }

    if full_error.contains("Filter") && full_error.contains("not found") {
        return format!("未定義のフィルター\n詳細: {full_error}");
    }

    full_error
}
