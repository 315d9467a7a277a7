//! Error types for running a simulation

use crate::cancel::CancelSignal;
use hdlrun_backends::BackendError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for runner operations
pub type Result<T> = std::result::Result<T, RunError>;

/// Errors that end a simulation run. Each message names the failing stage.
#[derive(Debug, Error)]
pub enum RunError {
    /// Backend construction, command assembly or pre-flight check failed
    #[error("build: {0}")]
    Backend(#[from] BackendError),

    /// A command could not be started at all
    #[error("execute: failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Interrupted by a signal
    #[error("execute: cancelled by {signal}{}", describe_pid(.pid))]
    Cancelled {
        pid: Option<u32>,
        signal: CancelSignal,
    },

    /// Signal handlers could not be installed
    #[error("execute: cannot install signal handlers: {0}")]
    SignalSetup(std::io::Error),

    /// No report after the run: the simulator terminated abnormally
    #[error("collect: simulation terminated abnormally, results file not found: {}", .0.display())]
    ReportMissing(PathBuf),

    /// First failing test case recorded in the report
    #[error("collect: {message} class=\"{classname}\" test=\"{suite}/{case}\"{}", describe_output(.stdout))]
    TestFailure {
        suite: String,
        case: String,
        classname: String,
        message: String,
        stdout: Option<String>,
    },

    #[error("collect: malformed results file {}: {message}", .path.display())]
    MalformedReport { path: PathBuf, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn describe_pid(pid: &Option<u32>) -> String {
    match pid {
        Some(pid) => format!(", killed pid {}", pid),
        None => ", no process was running".to_string(),
    }
}

fn describe_output(stdout: &Option<String>) -> String {
    match stdout {
        Some(output) if !output.trim().is_empty() => {
            format!(" error={}", output.trim().replace('\n', " | "))
        }
        _ => String::new(),
    }
}

impl RunError {
    /// True for the failures a test report produced, as opposed to
    /// infrastructure problems
    pub fn is_test_failure(&self) -> bool {
        matches!(self, RunError::TestFailure { .. })
    }
}
