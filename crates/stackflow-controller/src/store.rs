//! Shared environment state
//!
//! Every environment stack keeps a set of `<Parameter>:<workload>` members.
//! Handlers only ever add or remove single members, so concurrent workload
//! stacks never overwrite each other's requests.

use crate::error::{ControllerError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stackflow_core::ControllerAction;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tokio::sync::RwLock;

/// Key of one workload's membership in an action
pub fn member_key(action: ControllerAction, workload: &str) -> String {
    format!("{}:{}", action.env_parameter(), workload)
}

/// Backend holding the shared environment state
#[async_trait]
pub trait EnvironmentStore: Send + Sync {
    /// Add `workload` to `action`. Returns false if it was already a member.
    async fn add(&self, env_stack: &str, action: ControllerAction, workload: &str) -> Result<bool>;

    /// Remove `workload` from `action`. Returns false if it was not a member.
    async fn remove(
        &self,
        env_stack: &str,
        action: ControllerAction,
        workload: &str,
    ) -> Result<bool>;

    /// Workloads currently requesting `action`
    async fn workloads(
        &self,
        env_stack: &str,
        action: ControllerAction,
    ) -> Result<BTreeSet<String>>;

    /// Outputs of the environment stack
    async fn outputs(&self, env_stack: &str) -> Result<BTreeMap<String, String>>;

    /// Comma separated workload lists keyed by environment stack parameter
    async fn parameter_values(&self, env_stack: &str) -> Result<BTreeMap<String, String>> {
        let mut values = BTreeMap::new();
        for action in ControllerAction::ALL {
            let workloads = self.workloads(env_stack, action).await?;
            values.insert(
                action.env_parameter().to_string(),
                workloads.into_iter().collect::<Vec<_>>().join(","),
            );
        }
        Ok(values)
    }
}

/// State of a single environment stack
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentState {
    /// Environment stack outputs
    pub outputs: BTreeMap<String, String>,

    /// `<Parameter>:<workload>` keys
    pub members: BTreeSet<String>,
}

impl EnvironmentState {
    pub fn with_outputs(outputs: BTreeMap<String, String>) -> Self {
        Self {
            outputs,
            members: BTreeSet::new(),
        }
    }

    /// Workloads listed under the given action
    pub fn workloads(&self, action: ControllerAction) -> BTreeSet<String> {
        let prefix = format!("{}:", action.env_parameter());
        self.members
            .iter()
            .filter_map(|key| key.strip_prefix(&prefix))
            .map(str::to_string)
            .collect()
    }
}

/// In-process store
#[derive(Debug, Default)]
pub struct InMemoryStore {
    environments: RwLock<HashMap<String, EnvironmentState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an environment stack with its outputs
    pub fn with_environment(
        mut self,
        env_stack: impl Into<String>,
        outputs: BTreeMap<String, String>,
    ) -> Self {
        self.environments
            .get_mut()
            .insert(env_stack.into(), EnvironmentState::with_outputs(outputs));
        self
    }

    pub async fn snapshot(&self, env_stack: &str) -> Option<EnvironmentState> {
        self.environments.read().await.get(env_stack).cloned()
    }
}

#[async_trait]
impl EnvironmentStore for InMemoryStore {
    async fn add(&self, env_stack: &str, action: ControllerAction, workload: &str) -> Result<bool> {
        let mut environments = self.environments.write().await;
        let state = environments
            .get_mut(env_stack)
            .ok_or_else(|| ControllerError::EnvironmentNotFound(env_stack.to_string()))?;
        Ok(state.members.insert(member_key(action, workload)))
    }

    async fn remove(
        &self,
        env_stack: &str,
        action: ControllerAction,
        workload: &str,
    ) -> Result<bool> {
        let mut environments = self.environments.write().await;
        let state = environments
            .get_mut(env_stack)
            .ok_or_else(|| ControllerError::EnvironmentNotFound(env_stack.to_string()))?;
        Ok(state.members.remove(&member_key(action, workload)))
    }

    async fn workloads(
        &self,
        env_stack: &str,
        action: ControllerAction,
    ) -> Result<BTreeSet<String>> {
        let environments = self.environments.read().await;
        environments
            .get(env_stack)
            .map(|state| state.workloads(action))
            .ok_or_else(|| ControllerError::EnvironmentNotFound(env_stack.to_string()))
    }

    async fn outputs(&self, env_stack: &str) -> Result<BTreeMap<String, String>> {
        let environments = self.environments.read().await;
        environments
            .get(env_stack)
            .map(|state| state.outputs.clone())
            .ok_or_else(|| ControllerError::EnvironmentNotFound(env_stack.to_string()))
    }
}
