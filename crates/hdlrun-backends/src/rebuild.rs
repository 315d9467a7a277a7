//! Modification-time based rebuild decision

use crate::{BackendError, BackendResult};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

/// Decide whether `output` must be rebuilt from `dependencies`.
///
/// A missing output is always outdated, whatever state the dependencies are
/// in. Otherwise the output is outdated iff the newest dependency is strictly
/// newer than it. An empty dependency list never makes an existing output
/// stale. A dependency that does not exist is an error, not a skip.
pub fn is_outdated(output: &Path, dependencies: &[PathBuf]) -> BackendResult<bool> {
    let output_mtime = match fs::metadata(output) {
        Ok(meta) if meta.is_file() => meta.modified()?,
        _ => return Ok(true),
    };

    let mut newest = SystemTime::UNIX_EPOCH;
    for dependency in dependencies {
        let meta = fs::metadata(dependency)
            .map_err(|_| BackendError::MissingDependency(dependency.clone()))?;
        let mtime = meta.modified()?;
        if mtime > newest {
            newest = mtime;
        }
    }

    Ok(newest > output_mtime)
}

/// Combine the staleness check with the force flag, logging the skip notice
/// when compilation can be left out
pub(crate) fn needs_compile(
    force: bool,
    output: &Path,
    dependencies: &[PathBuf],
) -> BackendResult<bool> {
    if is_outdated(output, dependencies)? {
        debug!("{} is outdated, compiling", output.display());
        return Ok(true);
    }
    if force {
        debug!("Forcing recompilation of {}", output.display());
        return Ok(true);
    }
    warn!("Skipping compilation: {}", output.display());
    Ok(false)
}
