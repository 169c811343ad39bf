//! StackFlow environment controller
//!
//! Deploy-time agent behind the `Custom::EnvControllerFunction` resource that
//! workload stacks embed. It records which workloads need which shared
//! environment resources (NAT gateway, shared file system, load balancers,
//! service discovery) and returns the environment outputs to the stack.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │          workload stack (CloudFormation)      │
//! │           EnvControllerAction resource        │
//! └─────────────────────┬────────────────────────┘
//!                       │ LifecycleRequest
//! ┌─────────────────────▼────────────────────────┐
//! │              stackflow-controller             │
//! │  EnvController ─ ChangeSet ─ RetryConfig      │
//! │  ┌────────────────────────────────────────┐  │
//! │  │   trait EnvironmentStore { ... }        │  │
//! │  └────────────────────────────────────────┘  │
//! └───────┬─────────────────────┬────────────────┘
//!         │                     │
//! ┌───────▼───────┐     ┌───────▼───────┐
//! │ InMemoryStore │     │   FileStore   │
//! └───────────────┘     └───────────────┘
//! ```

pub mod controller;
pub mod error;
pub mod event;
pub mod plan;
pub mod retry;
pub mod state;
pub mod store;

// Re-exports
pub use controller::{ControllerConfig, EnvController};
pub use error::{ControllerError, Result};
pub use event::{
    ControllerProperties, LifecycleRequest, LifecycleResponse, RequestType, ResponseStatus,
};
pub use plan::{Change, ChangeKind, ChangeSet, ChangeSummary};
pub use retry::RetryConfig;
pub use state::{FileStore, StateFile, StateLock};
pub use store::{EnvironmentState, EnvironmentStore, InMemoryStore, member_key};
