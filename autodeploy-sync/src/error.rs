//! Error types for autodeploy-sync.

use std::path::PathBuf;

use thiserror::Error;

/// An external command could not be run, or failed when success was required.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The process ran and exited unsuccessfully.
    #[error(
        "command `{command}` failed with exit code {}: {}",
        display_code(.exit_code),
        .stderr.trim()
    )]
    Exit {
        command: String,
        /// `None` when the process was terminated by a signal.
        exit_code: Option<i32>,
        stderr: String,
    },

    /// The process could not be started at all.
    #[error("failed to execute `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

impl CommandError {
    /// Captured error stream, empty for spawn failures.
    pub fn stderr(&self) -> &str {
        match self {
            CommandError::Exit { stderr, .. } => stderr,
            CommandError::Spawn { .. } => "",
        }
    }
}

fn display_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "none (killed by signal)".to_string(), |c| c.to_string())
}

/// Revisions or working-copy state could not be determined.
#[derive(Debug, Error)]
pub enum InspectionError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("not a git repository: {0}")]
    NotARepository(PathBuf),

    /// git exited successfully but printed no revision for the given ref.
    #[error("git returned no revision for `{0}`")]
    EmptyRevision(String),
}

/// Fatal sync failures. A refusal to sync is not an error; see
/// [`autodeploy_core::SyncOutcome::Aborted`].
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("inspection failed: {0}")]
    Inspection(#[from] InspectionError),

    /// The pull failed and the recovery path could not complete; this is the
    /// original pull failure.
    #[error("pull failed: {0}")]
    Pull(#[source] CommandError),
}

/// Convenience constructor for [`InspectionError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> InspectionError {
    InspectionError::Io {
        path: path.into(),
        source,
    }
}
