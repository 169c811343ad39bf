//! Lifecycle handler of the environment controller custom resource

use crate::error::{ControllerError, Result};
use crate::event::{LifecycleRequest, LifecycleResponse, RequestType};
use crate::plan::{Change, ChangeKind, ChangeSet};
use crate::retry::RetryConfig;
use crate::store::EnvironmentStore;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Controller settings
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Upper bound for a whole lifecycle call
    pub timeout: Duration,

    pub retry: RetryConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            // below the 900s function timeout
            timeout: Duration::from_secs(840),
            retry: RetryConfig::default(),
        }
    }
}

/// Environment controller
///
/// Applies the membership changes a workload stack requests against the
/// shared environment state and reports the environment outputs back.
pub struct EnvController<S> {
    store: S,
    config: ControllerConfig,
}

impl<S: EnvironmentStore> EnvController<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            config: ControllerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Handle a raw request document and return the response document
    pub async fn handle_json(&self, body: &str) -> Result<String> {
        let request = LifecycleRequest::from_json(body)?;
        self.handle(&request).await.to_json()
    }

    /// Handle one lifecycle request
    ///
    /// Create and Update report `FAILED` on any error, including the timeout.
    /// Delete is best effort and always reports `SUCCESS`.
    #[instrument(skip_all, fields(
        request_type = %request.request_type,
        workload = %request.resource_properties.workload,
        env_stack = %request.resource_properties.env_stack,
    ))]
    pub async fn handle(&self, request: &LifecycleRequest) -> LifecycleResponse {
        let physical_resource_id = match request.request_type {
            RequestType::Delete => request
                .physical_resource_id
                .clone()
                .unwrap_or_else(|| request.resource_properties.physical_resource_id()),
            RequestType::Create | RequestType::Update => {
                request.resource_properties.physical_resource_id()
            }
        };

        let outcome = tokio::time::timeout(self.config.timeout, self.dispatch(request))
            .await
            .unwrap_or(Err(ControllerError::Timeout(self.config.timeout)));

        match (request.request_type, outcome) {
            (_, Ok(data)) => {
                info!(outputs = data.len(), "Lifecycle request succeeded");
                LifecycleResponse::success(request, physical_resource_id, data)
            }
            (RequestType::Delete, Err(e)) => {
                warn!(error = %e, "Delete did not complete, reporting success");
                LifecycleResponse::success(request, physical_resource_id, BTreeMap::new())
            }
            (_, Err(e)) => {
                error!(error = %e, "Lifecycle request failed");
                LifecycleResponse::failed(request, physical_resource_id, e.to_string())
            }
        }
    }

    async fn dispatch(&self, request: &LifecycleRequest) -> Result<BTreeMap<String, String>> {
        let changes = ChangeSet::for_request(request)?;
        info!(summary = %changes.summary(), "Applying environment changes");

        if request.request_type == RequestType::Delete {
            self.remove_best_effort(&changes).await;
            return Ok(BTreeMap::new());
        }

        for change in &changes.changes {
            let changed = self.apply(change).await?;
            debug!(change = %change, changed, "Applied change");
        }

        let env_stack = &request.resource_properties.env_stack;
        self.config
            .retry
            .run("outputs", || self.store.outputs(env_stack))
            .await
    }

    async fn remove_best_effort(&self, changes: &ChangeSet) {
        for change in &changes.changes {
            match self.apply(change).await {
                Ok(changed) => debug!(change = %change, changed, "Applied change"),
                Err(ControllerError::EnvironmentNotFound(env_stack)) => {
                    debug!(%env_stack, "Environment already gone");
                }
                Err(e) => warn!(change = %change, error = %e, "Failed to remove membership"),
            }
        }
    }

    async fn apply(&self, change: &Change) -> Result<bool> {
        let name = change.to_string();
        self.config
            .retry
            .run(&name, || async {
                match change.kind {
                    ChangeKind::Add => {
                        self.store
                            .add(&change.env_stack, change.action, &change.workload)
                            .await
                    }
                    ChangeKind::Remove => {
                        self.store
                            .remove(&change.env_stack, change.action, &change.workload)
                            .await
                    }
                }
            })
            .await
    }
}
