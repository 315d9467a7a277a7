//! hdlrun simulator backends
//!
//! This crate turns a [`SimulationRequest`] into the ordered list of vendor
//! tool invocations needed to compile and run a design on one simulator
//! engine. Each engine gets its own [`Backend`] implementation that knows how
//! that tool spells include paths, macro defines, library loading and the
//! compile/elaborate/run split.
//!
//! Nothing in here spawns a simulator. The runner crate executes the
//! [`CommandSequence`] a backend returns.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

pub mod cadence;
pub mod command;
pub mod env;
pub mod ghdl;
pub mod icarus;
pub mod layout;
pub mod questa;
pub mod rebuild;
pub mod request;
pub mod riviera;
pub mod util;
pub mod vcs;
pub mod verilator;

pub use command::{find_executable, CommandSequence, SimCommand};
pub use env::EnvOverrides;
pub use layout::RuntimeLayout;
pub use rebuild::is_outdated;
pub use request::{SimulationRequest, SimulationRequestBuilder, SourceKind, ToplevelLang};

/// Backend-specific errors
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("{simulator} does not support {kind} sources")]
    UnsupportedSourceKind {
        simulator: SimulatorKind,
        kind: SourceKind,
    },
    #[error("Rebuild check failed, dependency not found: {}", .0.display())]
    MissingDependency(PathBuf),
    #[error("Executable not found on PATH: {0}")]
    MissingExecutable(String),
    #[error("Unknown simulator '{name}'. Supported: {supported}")]
    UnknownSimulator { name: String, supported: String },
    #[error("Invalid simulation request: {0}")]
    InvalidRequest(String),
    #[error("Tool execution failed: {0}")]
    ToolFailed(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// The fixed set of simulator engines hdlrun can drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimulatorKind {
    Icarus,
    Questa,
    Ius,
    Xcelium,
    Vcs,
    Ghdl,
    Riviera,
    Verilator,
}

impl SimulatorKind {
    /// Every supported engine, in the order they are listed to users
    pub const ALL: [SimulatorKind; 8] = [
        SimulatorKind::Icarus,
        SimulatorKind::Questa,
        SimulatorKind::Ius,
        SimulatorKind::Xcelium,
        SimulatorKind::Vcs,
        SimulatorKind::Ghdl,
        SimulatorKind::Riviera,
        SimulatorKind::Verilator,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SimulatorKind::Icarus => "icarus",
            SimulatorKind::Questa => "questa",
            SimulatorKind::Ius => "ius",
            SimulatorKind::Xcelium => "xcelium",
            SimulatorKind::Vcs => "vcs",
            SimulatorKind::Ghdl => "ghdl",
            SimulatorKind::Riviera => "riviera",
            SimulatorKind::Verilator => "verilator",
        }
    }

    /// Comma separated list of supported names, for diagnostics
    pub fn supported_list() -> String {
        Self::ALL
            .iter()
            .map(|kind| kind.name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for SimulatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SimulatorKind {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == wanted)
            .ok_or_else(|| BackendError::UnknownSimulator {
                name: wanted.to_string(),
                supported: Self::supported_list(),
            })
    }
}

/// Main backend interface trait
///
/// Implementations are constructed from a request (rejecting source languages
/// the engine cannot handle) and then asked for the command sequence of one
/// run. `build` may write vendor script files into the working directory and
/// may add bridging variables to `env`; both are part of its contract.
pub trait Backend {
    /// Which engine this backend drives
    fn kind(&self) -> SimulatorKind;

    /// Format include directories as this tool expects them, preserving order
    fn include_flags(&self, dirs: &[PathBuf]) -> Vec<String>;

    /// Format preprocessor defines as this tool expects them, preserving order
    fn define_flags(&self, defines: &[String]) -> Vec<String>;

    /// Assemble compile commands (unless up to date) followed by the run
    /// command (unless compile-only)
    fn build(&self, env: &mut EnvOverrides) -> BackendResult<CommandSequence>;
}

/// Backend factory for creating the backend matching a simulator name
pub struct BackendFactory;

impl BackendFactory {
    /// Create a backend for the specified engine
    pub fn create_backend(
        kind: SimulatorKind,
        request: &SimulationRequest,
        layout: &RuntimeLayout,
    ) -> BackendResult<Box<dyn Backend>> {
        let request = request.clone();
        let layout = layout.clone();
        Ok(match kind {
            SimulatorKind::Icarus => Box::new(icarus::IcarusBackend::new(request, layout)?),
            SimulatorKind::Questa => Box::new(questa::QuestaBackend::new(request, layout)?),
            SimulatorKind::Ius => Box::new(cadence::CadenceBackend::ius(request, layout)?),
            SimulatorKind::Xcelium => Box::new(cadence::CadenceBackend::xcelium(request, layout)?),
            SimulatorKind::Vcs => Box::new(vcs::VcsBackend::new(request, layout)?),
            SimulatorKind::Ghdl => Box::new(ghdl::GhdlBackend::new(request, layout)?),
            SimulatorKind::Riviera => Box::new(riviera::RivieraBackend::new(request, layout)?),
            SimulatorKind::Verilator => {
                Box::new(verilator::VerilatorBackend::new(request, layout)?)
            }
        })
    }

    /// List all available backends
    pub fn available_backends() -> Vec<SimulatorKind> {
        SimulatorKind::ALL.to_vec()
    }
}

/// Fail construction when the request carries sources of a language the
/// engine cannot simulate
pub(crate) fn reject_sources(
    simulator: SimulatorKind,
    request: &SimulationRequest,
    kind: SourceKind,
) -> BackendResult<()> {
    if request.sources(kind).is_empty() {
        Ok(())
    } else {
        Err(BackendError::UnsupportedSourceKind { simulator, kind })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulator_kind_round_trip_names() {
        for kind in SimulatorKind::ALL {
            assert_eq!(kind.name().parse::<SimulatorKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_simulator_names_supported_set() {
        let err = "modelsim".parse::<SimulatorKind>().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("modelsim"));
        assert!(message.contains("icarus, questa, ius, xcelium, vcs, ghdl, riviera, verilator"));
    }

    #[test]
    fn test_simulator_kind_serialization() {
        let json = serde_json::to_string(&SimulatorKind::Xcelium).unwrap();
        assert_eq!(json, "\"xcelium\"");
        let kind: SimulatorKind = serde_json::from_str("\"riviera\"").unwrap();
        assert_eq!(kind, SimulatorKind::Riviera);
    }

    #[test]
    fn test_backend_factory() {
        let backends = BackendFactory::available_backends();
        assert_eq!(backends.len(), 8);
    }
}
