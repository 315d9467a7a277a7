//! Configuration structure definitions

use crate::error::{ManifestError, Result};
use hdlrun_backends::{
    BackendResult, RuntimeLayout, SimulationRequest, SimulationRequestBuilder, SimulatorKind,
    ToplevelLang,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Conventional configuration file name
pub const MANIFEST_FILE: &str = "hdlrun.toml";

/// Complete `hdlrun.toml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    /// What to simulate
    pub simulation: SimulationConfig,

    /// Where the test runtime is installed (discovered when absent)
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Runner behaviour
    #[serde(default)]
    pub runner: RunnerConfig,
}

/// The `[simulation]` table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationConfig {
    /// Top-level hardware module
    pub toplevel: String,

    /// Test module loaded by the runtime
    pub module: String,

    #[serde(default)]
    pub toplevel_lang: ToplevelLang,

    /// Directory the simulator runs in (defaults to the build directory)
    #[serde(default)]
    pub work_dir: Option<PathBuf>,

    /// Build directory (default: "sim_build")
    #[serde(default)]
    pub sim_build: Option<PathBuf>,

    #[serde(default)]
    pub python_search: Vec<PathBuf>,

    #[serde(default)]
    pub verilog_sources: Vec<PathBuf>,

    #[serde(default)]
    pub vhdl_sources: Vec<PathBuf>,

    #[serde(default)]
    pub includes: Vec<PathBuf>,

    #[serde(default)]
    pub defines: Vec<String>,

    #[serde(default)]
    pub compile_args: Vec<String>,

    #[serde(default)]
    pub simulation_args: Vec<String>,

    /// Appended to both compile and simulation arguments
    #[serde(default)]
    pub extra_args: Vec<String>,

    #[serde(default)]
    pub plus_args: Vec<String>,

    #[serde(default)]
    pub force_compile: bool,

    #[serde(default)]
    pub compile_only: bool,

    #[serde(default)]
    pub gui: bool,

    /// Only run the named test case
    #[serde(default)]
    pub testcase: Option<String>,

    #[serde(default)]
    pub seed: Option<u64>,

    /// Extra variables for the simulator environment
    #[serde(default)]
    pub extra_env: IndexMap<String, String>,
}

/// The `[runtime]` table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub lib_dir: Option<PathBuf>,

    #[serde(default)]
    pub share_dir: Option<PathBuf>,

    /// Exported as `PYTHONHOME`
    #[serde(default)]
    pub python_home: Option<PathBuf>,
}

/// The `[runner]` table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunnerConfig {
    /// Simulator used when `SIM` is not set
    #[serde(default)]
    pub simulator: Option<SimulatorKind>,

    /// Milliseconds between SIGTERM and SIGKILL when cancelling
    #[serde(default)]
    pub kill_grace_ms: Option<u64>,
}

impl Manifest {
    /// Validate values serde cannot check
    pub fn validate(&self) -> Result<()> {
        let sim = &self.simulation;
        if sim.toplevel.trim().is_empty() {
            return Err(ManifestError::Validation(
                "simulation.toplevel cannot be empty".to_string(),
            ));
        }
        if sim.module.trim().is_empty() {
            return Err(ManifestError::Validation(
                "simulation.module cannot be empty".to_string(),
            ));
        }
        if let Some(define) = sim.defines.iter().find(|d| d.trim().is_empty()) {
            return Err(ManifestError::Validation(format!(
                "simulation.defines contains an empty entry: {:?}",
                define
            )));
        }
        for key in sim.extra_env.keys() {
            if key.is_empty() || key.contains('=') || key.contains('\0') {
                return Err(ManifestError::Validation(format!(
                    "simulation.extra_env has an invalid variable name: {:?}",
                    key
                )));
            }
        }
        if self.runner.kill_grace_ms == Some(0) {
            return Err(ManifestError::Validation(
                "runner.kill_grace_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Request builder seeded from `[simulation]`, relative paths resolved
    /// against `base_dir`. Callers may override fields before building.
    pub fn request_builder(&self, base_dir: &Path) -> SimulationRequestBuilder {
        let sim = &self.simulation;
        let mut builder = SimulationRequest::builder(sim.toplevel.clone(), sim.module.clone())
            .base_dir(base_dir)
            .toplevel_lang(sim.toplevel_lang)
            .python_search(sim.python_search.iter().cloned())
            .verilog_sources(sim.verilog_sources.iter().cloned())
            .vhdl_sources(sim.vhdl_sources.iter().cloned())
            .includes(sim.includes.iter().cloned())
            .defines(sim.defines.iter().cloned())
            .compile_args(sim.compile_args.iter().cloned())
            .simulation_args(sim.simulation_args.iter().cloned())
            .extra_args(sim.extra_args.iter().cloned())
            .plus_args(sim.plus_args.iter().cloned())
            .force_compile(sim.force_compile)
            .compile_only(sim.compile_only)
            .gui(sim.gui);

        if let Some(dir) = &sim.work_dir {
            builder = builder.work_dir(dir);
        }
        if let Some(dir) = &sim.sim_build {
            builder = builder.sim_build(dir);
        }
        if let Some(testcase) = &sim.testcase {
            builder = builder.testcase(testcase);
        }
        if let Some(seed) = sim.seed {
            builder = builder.seed(seed);
        }
        for (key, value) in &sim.extra_env {
            builder = builder.env(key, value);
        }
        builder
    }

    /// Validate and turn `[simulation]` into a request
    pub fn into_request(&self, base_dir: &Path) -> Result<SimulationRequest> {
        self.validate()?;
        Ok(self.request_builder(base_dir).build()?)
    }

    /// Runtime locations from `[runtime]`, asking the config tool for any
    /// that are missing
    pub fn runtime_layout(&self, base_dir: &Path) -> BackendResult<RuntimeLayout> {
        let resolve = |dir: &Option<PathBuf>| dir.as_ref().map(|d| base_dir.join(d));
        RuntimeLayout::resolve(
            resolve(&self.runtime.lib_dir),
            resolve(&self.runtime.share_dir),
            resolve(&self.runtime.python_home),
        )
    }

    /// Grace period for cancelled children, when configured
    pub fn kill_grace(&self) -> Option<Duration> {
        self.runner.kill_grace_ms.map(Duration::from_millis)
    }
}
