//! Tracing setup for the agent binary.
//!
//! Events go to two sinks: the console (for the scheduler's own capture) and
//! the append-only log file, without ANSI colour. The console is stdout unless
//! stdout carries machine-readable output, in which case it is stderr. The
//! level comes from `RUST_LOG` and defaults to `info`.

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::LoggingError;
use crate::log_rotation;

/// Stream the console sink writes to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Console {
    #[default]
    Stdout,
    Stderr,
}

impl Console {
    fn writer(self) -> BoxMakeWriter {
        match self {
            Console::Stdout => BoxMakeWriter::new(std::io::stdout),
            Console::Stderr => BoxMakeWriter::new(std::io::stderr),
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install console plus file logging. Rotates the file first when oversized.
pub fn init_with_file(log_file: &Path, console: Console) -> Result<(), LoggingError> {
    let io_err = |source| LoggingError::Io {
        path: log_file.to_path_buf(),
        source,
    };

    if let Some(parent) = log_file.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| LoggingError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let rotated = log_rotation::rotate_agent_log(log_file).map_err(io_err)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .map_err(io_err)?;

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_target(false).with_writer(console.writer()))
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .try_init()
        .map_err(|e| LoggingError::Subscriber(e.to_string()))?;

    if rotated {
        tracing::info!(path = %log_file.display(), "log file rotated");
    }
    Ok(())
}

/// Console-only logging. A second call is a no-op.
pub fn init_console(console: Console) {
    let _ = fmt()
        .with_env_filter(env_filter())
        .with_target(false)
        .with_writer(console.writer())
        .try_init();
}
