//! Size-based rotation for the agent's append-only log.
//!
//! The log is rotated at startup, before the file sink is opened, once it
//! exceeds 10 MiB. At most 5 rotated copies are kept:
//!   auto-deploy.log → auto-deploy.log.1 → … → auto-deploy.log.5

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Rotation threshold (10 MiB).
pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

/// Rotated copies kept alongside the live log.
pub const MAX_ROTATED_FILES: usize = 5;

/// Rotate `log_path` when it has reached `max_bytes`.
///
/// The oldest copy is dropped, the others shift up by one, and the live file
/// becomes `.1`. The next writer recreates the live file in append mode.
///
/// Returns `true` when a rotation happened. A missing log is not an error.
pub fn rotate_if_needed(log_path: &Path, max_bytes: u64, max_files: usize) -> io::Result<bool> {
    let size = match fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    if size < max_bytes || max_files == 0 {
        return Ok(false);
    }

    let oldest = numbered_path(log_path, max_files);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for n in (1..max_files).rev() {
        let src = numbered_path(log_path, n);
        if src.exists() {
            fs::rename(&src, numbered_path(log_path, n + 1))?;
        }
    }
    fs::rename(log_path, numbered_path(log_path, 1))?;
    Ok(true)
}

/// Rotate the agent log with the default limits.
pub fn rotate_agent_log(log_path: &Path) -> io::Result<bool> {
    rotate_if_needed(log_path, MAX_LOG_BYTES, MAX_ROTATED_FILES)
}

/// Path of the `n`-th rotated copy, e.g. `auto-deploy.log.2`.
fn numbered_path(base: &Path, n: usize) -> PathBuf {
    let name = base
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "auto-deploy.log".to_string());
    base.with_file_name(format!("{name}.{n}"))
}
