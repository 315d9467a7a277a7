//! hdlrun configuration parsing
//!
//! This crate handles parsing and validation of `hdlrun.toml` files, which
//! describe the design under test, where the test runtime lives and how the
//! runner behaves. Unknown keys are rejected rather than ignored.

pub mod error;
pub mod manifest;

pub use error::{ManifestError, Result};
pub use manifest::{Manifest, RunnerConfig, RuntimeConfig, SimulationConfig, MANIFEST_FILE};

use std::path::{Path, PathBuf};
use tracing::debug;

/// Parse a configuration file from a path
pub fn from_path(path: impl AsRef<Path>) -> Result<Manifest> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .map_err(|e| ManifestError::Io(format!("{}: {}", path.display(), e)))?;
    debug!("Loaded configuration from {}", path.display());
    from_str(&contents)
}

/// Parse a configuration from a string
pub fn from_str(s: &str) -> Result<Manifest> {
    toml::from_str(s).map_err(|e| ManifestError::Parse(e.to_string()))
}

/// Directory that relative paths in the file at `path` are resolved against
pub fn base_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
