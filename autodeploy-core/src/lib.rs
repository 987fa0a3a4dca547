//! autodeploy core library: domain types, configuration, errors.
//!
//! - [`types`]: revisions, working-copy status, sync and deployment outcomes
//! - [`config`]: [`AgentConfig`] loading, layering and validation
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod types;

pub use config::AgentConfig;
pub use error::ConfigError;
pub use types::{
    AbortReason, DeploymentReport, DeploymentResult, ManifestFingerprint, OperationState,
    RevisionId, Stage, SyncOutcome, WorkingCopyStatus,
};
