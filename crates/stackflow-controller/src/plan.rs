//! Membership changes derived from a lifecycle request

use crate::error::Result;
use crate::event::{LifecycleRequest, RequestType};
use stackflow_core::ControllerAction;
use std::collections::BTreeSet;

/// Type of membership change
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChangeKind {
    Add,
    Remove,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeKind::Add => write!(f, "add"),
            ChangeKind::Remove => write!(f, "remove"),
        }
    }
}

/// One membership change against an environment stack
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Change {
    pub kind: ChangeKind,
    pub env_stack: String,
    pub action: ControllerAction,
    pub workload: String,
}

impl std::fmt::Display for Change {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}:{} on {}",
            self.kind, self.action, self.workload, self.env_stack
        )
    }
}

/// Ordered list of changes for one request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub changes: Vec<Change>,
}

impl ChangeSet {
    /// Changes a request implies
    ///
    /// Create adds every requested action and Delete removes them. Update adds
    /// the new actions and removes the dropped ones when the workload and
    /// environment stack are unchanged. If either changed, the orchestrator
    /// deletes the old resource separately.
    pub fn for_request(request: &LifecycleRequest) -> Result<Self> {
        let properties = &request.resource_properties;
        properties.check()?;
        let requested = properties.actions()?;

        let kind = match request.request_type {
            RequestType::Delete => ChangeKind::Remove,
            RequestType::Create | RequestType::Update => ChangeKind::Add,
        };
        let mut changes: Vec<Change> = requested
            .iter()
            .map(|&action| Change {
                kind,
                env_stack: properties.env_stack.clone(),
                action,
                workload: properties.workload.clone(),
            })
            .collect();

        if request.request_type == RequestType::Update
            && let Some(old) = &request.old_resource_properties
            && old.physical_resource_id() == properties.physical_resource_id()
        {
            let previous: BTreeSet<ControllerAction> = old.actions()?;
            changes.extend(previous.difference(&requested).map(|&action| Change {
                kind: ChangeKind::Remove,
                env_stack: properties.env_stack.clone(),
                action,
                workload: properties.workload.clone(),
            }));
        }

        Ok(Self { changes })
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Summary of the change set
    pub fn summary(&self) -> ChangeSummary {
        let count = |kind: ChangeKind| self.changes.iter().filter(|c| c.kind == kind).count();
        ChangeSummary {
            add: count(ChangeKind::Add),
            remove: count(ChangeKind::Remove),
        }
    }
}

/// Summary of planned changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeSummary {
    pub add: usize,
    pub remove: usize,
}

impl std::fmt::Display for ChangeSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} to add, {} to remove", self.add, self.remove)
    }
}
