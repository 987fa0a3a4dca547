use std::path::PathBuf;

use autodeploy_core::Stage;
use autodeploy_sync::CommandError;
use thiserror::Error;

/// Why a deployment stage (install, build, restart) failed.
#[derive(Debug, Error)]
pub enum StageFailure {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no {0} command configured")]
    EmptyCommand(&'static str),
}

/// A failure attributed to the stage it happened in.
#[derive(Debug, Error)]
#[error("{stage} stage failed: {source}")]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub source: StageFailure,
}

impl StageError {
    pub fn new(stage: Stage, source: impl Into<StageFailure>) -> Self {
        Self {
            stage,
            source: source.into(),
        }
    }
}

/// Log sink setup failures.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(String),
}

pub(crate) fn stage_io(
    stage: Stage,
    path: impl Into<PathBuf>,
    source: std::io::Error,
) -> StageError {
    StageError::new(
        stage,
        StageFailure::Io {
            path: path.into(),
            source,
        },
    )
}
