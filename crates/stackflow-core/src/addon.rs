//! アドオン読み込み
//!
//! `stackflow/<name>/addons/*.yml` に置かれたユーザー定義の
//! CloudFormation 断片を1つのネストスタックにまとめる。
//! アドオンが無いことは正常系として `AddonError::NotFound` で表す。

use crate::workspace::Workspace;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, instrument};

/// ネストスタックに必ず渡されるパラメータ
pub const REQUIRED_PARAMETERS: [&str; 3] = ["App", "Env", "Name"];

const MANAGED_POLICY_TYPE: &str = "AWS::IAM::ManagedPolicy";

#[derive(Error, Debug)]
pub enum AddonError {
    #[error("アドオンが見つかりません: {workload}")]
    NotFound { workload: String },

    #[error("アドオンの形式が不正です: {path}\n理由: {message}")]
    Malformed { path: PathBuf, message: String },

    #[error("アドオンの {section}.{key} が複数のファイルで異なる内容で定義されています: {path}")]
    Conflict {
        path: PathBuf,
        section: &'static str,
        key: String,
    },

    #[error("アドオンの読み込みエラー: {path}\n理由: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AddonError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    fn malformed(path: &Path, message: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }
}

/// アドオンファイル1つ分のトップレベル構造
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AddonDocument {
    #[serde(default)]
    parameters: BTreeMap<String, Value>,
    #[serde(default)]
    conditions: BTreeMap<String, Value>,
    #[serde(default)]
    mappings: BTreeMap<String, Value>,
    resources: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    outputs: BTreeMap<String, Value>,
}

/// 出力されるネストスタックのテンプレート
#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct AddonTemplate<'a> {
    #[serde(rename = "AWSTemplateFormatVersion")]
    format_version: &'static str,
    description: String,
    parameters: &'a BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    conditions: &'a BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    mappings: &'a BTreeMap<String, Value>,
    resources: &'a BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    outputs: &'a BTreeMap<String, Value>,
}

/// アドオンの出力
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddonOutput {
    /// Outputs のキー
    pub name: String,
    /// `AWS::IAM::ManagedPolicy` を参照しているか
    pub managed_policy: bool,
}

impl AddonOutput {
    /// コンテナに注入する環境変数名
    pub fn env_name(&self) -> String {
        screaming_snake(&self.name)
    }
}

/// マージ済みのアドオン
#[derive(Debug, Clone, PartialEq)]
pub struct AddonFragment {
    workload: String,
    parameters: BTreeMap<String, Value>,
    conditions: BTreeMap<String, Value>,
    mappings: BTreeMap<String, Value>,
    resources: BTreeMap<String, Value>,
    outputs: BTreeMap<String, Value>,
}

/// ワークスペースからワークロードのアドオンを読み込む
#[instrument(skip(workspace), fields(root = %workspace.root().display()))]
pub fn parse(workload: &str, workspace: &Workspace) -> Result<AddonFragment, AddonError> {
    let files = workspace.addon_files(workload)?;
    if files.is_empty() {
        debug!("No addon files found");
        return Err(AddonError::NotFound {
            workload: workload.to_string(),
        });
    }

    let mut documents = Vec::with_capacity(files.len());
    for path in files {
        let content = std::fs::read_to_string(&path).map_err(|source| AddonError::Io {
            path: path.clone(),
            source,
        })?;
        documents.push((path, content));
    }

    let fragment = AddonFragment::from_documents(workload, &documents)?;
    info!(
        file_count = documents.len(),
        resource_count = fragment.resources.len(),
        "Loaded addons"
    );
    Ok(fragment)
}

impl AddonFragment {
    /// 複数の YAML 文書をパス順にマージする
    pub fn from_documents(
        workload: &str,
        documents: &[(PathBuf, String)],
    ) -> Result<Self, AddonError> {
        if documents.is_empty() {
            return Err(AddonError::NotFound {
                workload: workload.to_string(),
            });
        }

        let mut fragment = Self {
            workload: workload.to_string(),
            parameters: BTreeMap::new(),
            conditions: BTreeMap::new(),
            mappings: BTreeMap::new(),
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        };

        for (path, content) in documents {
            let document: AddonDocument = serde_yaml::from_str(content)
                .map_err(|e| AddonError::malformed(path, e.to_string()))?;
            let resources = document
                .resources
                .ok_or_else(|| AddonError::malformed(path, "Resources が定義されていません"))?;

            merge_section(&mut fragment.parameters, document.parameters, path, "Parameters")?;
            merge_section(&mut fragment.conditions, document.conditions, path, "Conditions")?;
            merge_section(&mut fragment.mappings, document.mappings, path, "Mappings")?;
            merge_section(&mut fragment.resources, resources, path, "Resources")?;
            merge_section(&mut fragment.outputs, document.outputs, path, "Outputs")?;
        }

        let last = &documents[documents.len() - 1].0;
        if fragment.resources.is_empty() {
            return Err(AddonError::malformed(last, "Resources が空です"));
        }
        fragment.check_parameters(last)?;
        Ok(fragment)
    }

    fn check_parameters(&self, path: &Path) -> Result<(), AddonError> {
        for required in REQUIRED_PARAMETERS {
            if !self.parameters.contains_key(required) {
                return Err(AddonError::malformed(
                    path,
                    format!("Parameters に {required} を定義してください"),
                ));
            }
        }
        for (name, parameter) in &self.parameters {
            if REQUIRED_PARAMETERS.contains(&name.as_str()) {
                continue;
            }
            if parameter.get("Default").is_none() {
                return Err(AddonError::malformed(
                    path,
                    format!("パラメータ {name} には Default が必要です"),
                ));
            }
        }
        Ok(())
    }

    pub fn workload(&self) -> &str {
        &self.workload
    }

    /// アドオンが宣言するリソースの論理 ID
    pub fn resource_ids(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    /// 出力一覧（キー順）
    pub fn outputs(&self) -> Vec<AddonOutput> {
        self.outputs
            .iter()
            .map(|(name, output)| AddonOutput {
                name: name.clone(),
                managed_policy: output
                    .get("Value")
                    .and_then(referenced_resource)
                    .is_some_and(|target| self.is_managed_policy(target)),
            })
            .collect()
    }

    fn is_managed_policy(&self, logical_id: &str) -> bool {
        self.resources
            .get(logical_id)
            .and_then(|r| r.get("Type"))
            .and_then(Value::as_str)
            == Some(MANAGED_POLICY_TYPE)
    }

    /// ネストスタックとしてアップロードするテンプレート
    pub fn template(&self) -> crate::Result<String> {
        let template = AddonTemplate {
            format_version: "2010-09-09",
            description: format!("Additional resources for {}", self.workload),
            parameters: &self.parameters,
            conditions: &self.conditions,
            mappings: &self.mappings,
            resources: &self.resources,
            outputs: &self.outputs,
        };
        Ok(serde_yaml::to_string(&template)?)
    }
}

fn merge_section(
    target: &mut BTreeMap<String, Value>,
    incoming: BTreeMap<String, Value>,
    path: &Path,
    section: &'static str,
) -> Result<(), AddonError> {
    for (key, value) in incoming {
        match target.get(&key) {
            Some(existing) if *existing == value => {}
            Some(_) => {
                return Err(AddonError::Conflict {
                    path: path.to_path_buf(),
                    section,
                    key,
                });
            }
            None => {
                target.insert(key, value);
            }
        }
    }
    Ok(())
}

/// `!Ref X` または `{Ref: X}` の参照先
fn referenced_resource(value: &Value) -> Option<&str> {
    match value {
        Value::Tagged(tagged) if tagged.tag == "Ref" => tagged.value.as_str(),
        Value::Mapping(map) if map.len() == 1 => map.get("Ref").and_then(Value::as_str),
        _ => None,
    }
}

/// `MyTableName` → `MY_TABLE_NAME`
fn screaming_snake(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if !c.is_ascii_alphanumeric() {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            continue;
        }
        if c.is_ascii_uppercase() && i > 0 && !out.ends_with('_') {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
            if prev.is_ascii_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_ascii_uppercase() && next_is_lower)
            {
                out.push('_');
            }
        }
        out.push(c.to_ascii_uppercase());
    }
    out
}
