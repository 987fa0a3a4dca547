//! # autodeploy-sync
//!
//! Git-facing half of the deployment agent.
//!
//! Every external tool runs through a [`CommandRunner`]. The [`Inspector`]
//! answers read-only questions about the working copy, and the [`SyncEngine`]
//! brings a clean working copy up to the remote tip, reporting whether the
//! dependency manifest changed.

pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod inspector;
pub mod interpret;
pub mod runner;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use engine::{best_effort, SyncEngine};
pub use error::{CommandError, InspectionError, SyncError};
pub use inspector::{Divergence, Inspector};
pub use interpret::StashEntry;
pub use runner::{git_command, CommandOutput, CommandRunner, CommandSpec, SystemRunner};
