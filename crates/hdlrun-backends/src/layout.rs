//! Location of the embedded test runtime's shared libraries

use crate::{BackendError, BackendResult};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Helper tool that reports where the test runtime is installed
pub const CONFIG_TOOL: &str = "cocotb-config";

/// Get the platform-specific shared library extension
pub fn lib_ext() -> &'static str {
    if cfg!(target_os = "windows") {
        "dll"
    } else {
        "so"
    }
}

/// Where the runtime's simulator interface libraries and shared files live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeLayout {
    /// Directory holding `libcocotbvpi_*` and friends
    pub lib_dir: PathBuf,
    /// Directory holding shared support files (e.g. `lib/verilator/verilator.cpp`)
    pub share_dir: PathBuf,
    /// Interpreter prefix exported as `PYTHONHOME`, when known
    #[serde(default)]
    pub python_home: Option<PathBuf>,
}

impl RuntimeLayout {
    pub fn new(lib_dir: impl Into<PathBuf>, share_dir: impl Into<PathBuf>) -> Self {
        Self {
            lib_dir: lib_dir.into(),
            share_dir: share_dir.into(),
            python_home: None,
        }
    }

    pub fn with_python_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.python_home = Some(home.into());
        self
    }

    /// Fill in whichever locations were not given explicitly
    pub fn resolve(
        lib_dir: Option<PathBuf>,
        share_dir: Option<PathBuf>,
        python_home: Option<PathBuf>,
    ) -> BackendResult<Self> {
        let lib_dir = match lib_dir {
            Some(dir) => dir,
            None => query_config_tool("--lib-dir")?,
        };
        let share_dir = match share_dir {
            Some(dir) => dir,
            None => query_config_tool("--share")?,
        };
        Ok(Self {
            lib_dir,
            share_dir,
            python_home,
        })
    }

    /// Full path of the runtime library `lib<stem>.<ext>`
    pub fn library(&self, stem: &str) -> PathBuf {
        self.lib_dir.join(format!("lib{}.{}", stem, lib_ext()))
    }

    /// Path of a runtime library without extension, for tools that add it
    pub fn library_stem(&self, stem: &str) -> PathBuf {
        self.lib_dir.join(format!("lib{}", stem))
    }

    /// C++ harness that verilator links the design against
    pub fn verilator_cpp(&self) -> PathBuf {
        self.share_dir
            .join("lib")
            .join("verilator")
            .join("verilator.cpp")
    }

    pub fn lib_dir(&self) -> &Path {
        &self.lib_dir
    }
}

fn query_config_tool(flag: &str) -> BackendResult<PathBuf> {
    let output = match Command::new(CONFIG_TOOL).arg(flag).output() {
        Ok(output) => output,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(BackendError::MissingExecutable(CONFIG_TOOL.to_string()))
        }
        Err(e) => return Err(e.into()),
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(BackendError::ToolFailed(format!(
            "{} {} exited with {}: {}",
            CONFIG_TOOL,
            flag,
            output.status,
            stderr.trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let value = stdout.trim();
    if value.is_empty() {
        return Err(BackendError::ToolFailed(format!(
            "{} {} printed nothing",
            CONFIG_TOOL, flag
        )));
    }
    Ok(PathBuf::from(value))
}
