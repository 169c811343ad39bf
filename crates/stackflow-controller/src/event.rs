//! Custom resource lifecycle wire types
//!
//! Field names follow the CloudFormation custom resource request and
//! response documents.

use crate::error::{ControllerError, Result};
use serde::{Deserialize, Serialize};
use stackflow_core::ControllerAction;
use std::collections::{BTreeMap, BTreeSet};

/// Lifecycle event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestType {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for RequestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestType::Create => write!(f, "Create"),
            RequestType::Update => write!(f, "Update"),
            RequestType::Delete => write!(f, "Delete"),
        }
    }
}

/// Lifecycle request sent by the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LifecycleRequest {
    pub request_type: RequestType,

    #[serde(default)]
    pub request_id: String,

    #[serde(default)]
    pub stack_id: String,

    #[serde(default)]
    pub logical_resource_id: String,

    /// Pre-signed URL the response is uploaded to
    #[serde(default, rename = "ResponseURL")]
    pub response_url: String,

    /// Present on Update and Delete
    pub physical_resource_id: Option<String>,

    pub resource_properties: ControllerProperties,

    /// Present on Update
    pub old_resource_properties: Option<ControllerProperties>,
}

impl LifecycleRequest {
    pub fn from_json(body: &str) -> Result<Self> {
        Ok(serde_json::from_str(body)?)
    }
}

/// Properties of the `EnvControllerAction` resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ControllerProperties {
    /// Workload requesting the actions
    pub workload: String,

    /// Name of the shared environment stack
    pub env_stack: String,

    /// Environment stack parameter names, e.g. `NATWorkloads`
    #[serde(default)]
    pub parameters: Vec<String>,

    pub env_version: Option<String>,
}

impl ControllerProperties {
    /// Requested actions in their fixed order
    pub fn actions(&self) -> Result<BTreeSet<ControllerAction>> {
        self.parameters
            .iter()
            .map(|p| p.parse::<ControllerAction>().map_err(ControllerError::InvalidRequest))
            .collect()
    }

    /// Identifier reported back to the orchestrator
    ///
    /// A change of this value on Update makes the orchestrator delete the old
    /// resource afterwards.
    pub fn physical_resource_id(&self) -> String {
        format!("envcontroller/{}/{}", self.env_stack, self.workload)
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.workload.trim().is_empty() {
            return Err(ControllerError::InvalidRequest("Workload is empty".into()));
        }
        if self.env_stack.trim().is_empty() {
            return Err(ControllerError::InvalidRequest("EnvStack is empty".into()));
        }
        Ok(())
    }
}

/// Outcome reported to the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseStatus {
    Success,
    Failed,
}

/// Response document for a lifecycle request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LifecycleResponse {
    pub status: ResponseStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    pub physical_resource_id: String,

    pub stack_id: String,

    pub request_id: String,

    pub logical_resource_id: String,

    /// Environment stack outputs, readable with `!GetAtt`
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl LifecycleResponse {
    pub fn success(
        request: &LifecycleRequest,
        physical_resource_id: String,
        data: BTreeMap<String, String>,
    ) -> Self {
        Self {
            status: ResponseStatus::Success,
            reason: None,
            physical_resource_id,
            stack_id: request.stack_id.clone(),
            request_id: request.request_id.clone(),
            logical_resource_id: request.logical_resource_id.clone(),
            data,
        }
    }

    pub fn failed(
        request: &LifecycleRequest,
        physical_resource_id: String,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            status: ResponseStatus::Failed,
            reason: Some(reason.into()),
            physical_resource_id,
            stack_id: request.stack_id.clone(),
            request_id: request.request_id.clone(),
            logical_resource_id: request.logical_resource_id.clone(),
            data: BTreeMap::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
