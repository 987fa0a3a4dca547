//! Deployment agent: the orchestrator state machine plus the pieces around
//! it (install/build stages, process supervisor, log sink).
//!
//! A run is a single blocking pass:
//! [`Orchestrator::run`] returns a [`DeploymentReport`] whose
//! [`DeploymentResult::exit_code`] becomes the process exit status.
//!
//! [`DeploymentReport`]: autodeploy_core::DeploymentReport
//! [`DeploymentResult::exit_code`]: autodeploy_core::DeploymentResult::exit_code

mod error;
pub mod log_rotation;
pub mod logging;
pub mod orchestrator;
pub mod stages;
pub mod supervisor;

pub use error::{LoggingError, StageError, StageFailure};
pub use orchestrator::Orchestrator;
pub use supervisor::Supervisor;
