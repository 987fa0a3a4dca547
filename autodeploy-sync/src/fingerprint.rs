//! Manifest fingerprinting — SHA-256 of the dependency manifest bytes.

use std::path::Path;

use sha2::{Digest, Sha256};

use autodeploy_core::ManifestFingerprint;

use crate::error::{io_err, InspectionError};

/// Hash the file at `path`, or report it absent.
///
/// The fingerprint is only ever compared with another one taken in the same
/// run; it is never stored.
pub fn fingerprint_file(path: &Path) -> Result<ManifestFingerprint, InspectionError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(ManifestFingerprint::Absent)
        }
        Err(err) => return Err(io_err(path, err)),
    };
    Ok(ManifestFingerprint::Digest(digest(&bytes)))
}

fn digest(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    hex::encode(h.finalize())
}
