//! Simulation request: everything one run needs to know about the design

use crate::util::{absolute_path, absolute_paths};
use crate::{BackendError, BackendResult};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::warn;

/// Default name of the simulation build directory
pub const DEFAULT_SIM_BUILD: &str = "sim_build";

/// HDL family of the toplevel, selects the primary procedural interface
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToplevelLang {
    #[default]
    Verilog,
    Vhdl,
}

impl FromStr for ToplevelLang {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "verilog" | "systemverilog" | "sv" => Ok(ToplevelLang::Verilog),
            "vhdl" => Ok(ToplevelLang::Vhdl),
            other => Err(BackendError::InvalidRequest(format!(
                "unknown toplevel language '{}', expected verilog or vhdl",
                other
            ))),
        }
    }
}

/// Source language families a request can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Verilog,
    Vhdl,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Verilog => f.write_str("Verilog"),
            SourceKind::Vhdl => f.write_str("VHDL"),
        }
    }
}

/// Immutable description of one simulation.
///
/// Built through [`SimulationRequestBuilder`], which resolves every path to
/// an absolute one. Nothing changes after construction.
#[derive(Debug, Clone)]
pub struct SimulationRequest {
    toplevel: String,
    module: String,
    toplevel_lang: ToplevelLang,
    sim_dir: PathBuf,
    work_dir: PathBuf,
    python_search: Vec<PathBuf>,
    verilog_sources: Vec<PathBuf>,
    vhdl_sources: Vec<PathBuf>,
    includes: Vec<PathBuf>,
    defines: Vec<String>,
    compile_args: Vec<String>,
    simulation_args: Vec<String>,
    plus_args: Vec<String>,
    force_compile: bool,
    compile_only: bool,
    gui: bool,
    testcase: Option<String>,
    seed: Option<String>,
    extra_env: IndexMap<String, String>,
}

impl SimulationRequest {
    pub fn builder(toplevel: impl Into<String>, module: impl Into<String>) -> SimulationRequestBuilder {
        SimulationRequestBuilder::new(toplevel, module)
    }

    /// Top-level hardware module name
    pub fn toplevel(&self) -> &str {
        &self.toplevel
    }

    /// Test module loaded by the embedded test runtime
    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn toplevel_lang(&self) -> ToplevelLang {
        self.toplevel_lang
    }

    /// Simulation build directory holding compiled artifacts
    pub fn sim_dir(&self) -> &Path {
        &self.sim_dir
    }

    /// Directory the simulator processes run in
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn python_search(&self) -> &[PathBuf] {
        &self.python_search
    }

    pub fn verilog_sources(&self) -> &[PathBuf] {
        &self.verilog_sources
    }

    pub fn vhdl_sources(&self) -> &[PathBuf] {
        &self.vhdl_sources
    }

    pub fn sources(&self, kind: SourceKind) -> &[PathBuf] {
        match kind {
            SourceKind::Verilog => &self.verilog_sources,
            SourceKind::Vhdl => &self.vhdl_sources,
        }
    }

    /// Every source file, Verilog first, as rebuild dependencies
    pub fn all_sources(&self) -> Vec<PathBuf> {
        self.verilog_sources
            .iter()
            .chain(&self.vhdl_sources)
            .cloned()
            .collect()
    }

    pub fn includes(&self) -> &[PathBuf] {
        &self.includes
    }

    pub fn defines(&self) -> &[String] {
        &self.defines
    }

    /// Compile arguments, with the shared extra arguments already appended
    pub fn compile_args(&self) -> &[String] {
        &self.compile_args
    }

    /// Simulation arguments, with the shared extra arguments already appended
    pub fn simulation_args(&self) -> &[String] {
        &self.simulation_args
    }

    pub fn plus_args(&self) -> &[String] {
        &self.plus_args
    }

    pub fn force_compile(&self) -> bool {
        self.force_compile
    }

    pub fn compile_only(&self) -> bool {
        self.compile_only
    }

    pub fn gui(&self) -> bool {
        self.gui
    }

    pub fn testcase(&self) -> Option<&str> {
        self.testcase.as_deref()
    }

    pub fn seed(&self) -> Option<&str> {
        self.seed.as_deref()
    }

    pub fn extra_env(&self) -> &IndexMap<String, String> {
        &self.extra_env
    }
}

/// Builder for [`SimulationRequest`]
#[derive(Debug, Clone)]
pub struct SimulationRequestBuilder {
    toplevel: String,
    module: String,
    toplevel_lang: ToplevelLang,
    base_dir: Option<PathBuf>,
    work_dir: Option<PathBuf>,
    sim_build: PathBuf,
    python_search: Vec<PathBuf>,
    verilog_sources: Vec<PathBuf>,
    vhdl_sources: Vec<PathBuf>,
    includes: Vec<PathBuf>,
    defines: Vec<String>,
    compile_args: Vec<String>,
    simulation_args: Vec<String>,
    extra_args: Vec<String>,
    plus_args: Vec<String>,
    force_compile: bool,
    compile_only: bool,
    gui: bool,
    testcase: Option<String>,
    seed: Option<String>,
    extra_env: IndexMap<String, String>,
}

impl SimulationRequestBuilder {
    pub fn new(toplevel: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            toplevel: toplevel.into(),
            module: module.into(),
            toplevel_lang: ToplevelLang::default(),
            base_dir: None,
            work_dir: None,
            sim_build: PathBuf::from(DEFAULT_SIM_BUILD),
            python_search: Vec::new(),
            verilog_sources: Vec::new(),
            vhdl_sources: Vec::new(),
            includes: Vec::new(),
            defines: Vec::new(),
            compile_args: Vec::new(),
            simulation_args: Vec::new(),
            extra_args: Vec::new(),
            plus_args: Vec::new(),
            force_compile: false,
            compile_only: false,
            gui: false,
            testcase: None,
            seed: None,
            extra_env: IndexMap::new(),
        }
    }

    /// Directory relative paths are resolved against (defaults to the
    /// current directory)
    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    pub fn toplevel_lang(mut self, lang: ToplevelLang) -> Self {
        self.toplevel_lang = lang;
        self
    }

    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    pub fn sim_build(mut self, dir: impl Into<PathBuf>) -> Self {
        self.sim_build = dir.into();
        self
    }

    pub fn python_search<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.python_search.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn verilog_sources<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.verilog_sources.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn vhdl_sources<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.vhdl_sources.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn includes<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.includes.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn defines<I, S>(mut self, defines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.defines.extend(defines.into_iter().map(Into::into));
        self
    }

    pub fn compile_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.compile_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn simulation_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.simulation_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Arguments appended to both compilation and simulation
    pub fn extra_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn plus_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.plus_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn force_compile(mut self, force: bool) -> Self {
        self.force_compile = force;
        self
    }

    pub fn compile_only(mut self, compile_only: bool) -> Self {
        self.compile_only = compile_only;
        self
    }

    pub fn gui(mut self, gui: bool) -> Self {
        self.gui = gui;
        self
    }

    pub fn testcase(mut self, testcase: impl Into<String>) -> Self {
        self.testcase = Some(testcase.into());
        self
    }

    pub fn seed(mut self, seed: impl ToString) -> Self {
        self.seed = Some(seed.to_string());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_env.insert(key.into(), value.into());
        self
    }

    /// Validate and resolve into an immutable request
    pub fn build(self) -> BackendResult<SimulationRequest> {
        if self.toplevel.trim().is_empty() {
            return Err(BackendError::InvalidRequest(
                "toplevel name cannot be empty".to_string(),
            ));
        }
        if self.module.trim().is_empty() {
            return Err(BackendError::InvalidRequest(
                "test module name cannot be empty".to_string(),
            ));
        }

        let base = match self.base_dir {
            Some(dir) => dir,
            None => std::env::current_dir()?,
        };

        let sim_dir = absolute_path(&base, &self.sim_build);
        let work_dir = match self.work_dir {
            Some(dir) => {
                let dir = absolute_path(&base, &dir);
                if dir.is_dir() {
                    dir
                } else {
                    warn!(
                        "Working directory {} does not exist, using {}",
                        dir.display(),
                        sim_dir.display()
                    );
                    sim_dir.clone()
                }
            }
            None => sim_dir.clone(),
        };

        let mut compile_args = self.compile_args;
        compile_args.extend(self.extra_args.iter().cloned());
        let mut simulation_args = self.simulation_args;
        simulation_args.extend(self.extra_args);

        Ok(SimulationRequest {
            toplevel: self.toplevel,
            module: self.module,
            toplevel_lang: self.toplevel_lang,
            python_search: absolute_paths(&base, &self.python_search),
            verilog_sources: absolute_paths(&base, &self.verilog_sources),
            vhdl_sources: absolute_paths(&base, &self.vhdl_sources),
            includes: absolute_paths(&base, &self.includes),
            sim_dir,
            work_dir,
            defines: self.defines,
            compile_args,
            simulation_args,
            plus_args: self.plus_args,
            force_compile: self.force_compile,
            compile_only: self.compile_only,
            gui: self.gui,
            testcase: self.testcase,
            seed: self.seed,
            extra_env: self.extra_env,
        })
    }
}
