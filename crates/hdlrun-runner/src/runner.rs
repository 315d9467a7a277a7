//! Orchestration facade
//!
//! `Runner` drives one simulation: pick the backend, assemble its commands,
//! derive the environment, execute under a session with signal handling, and
//! adjudicate the outcome from the test report.

use crate::env::{ExecutionEnvironment, RESULTS_FILE_VAR};
use crate::error::Result;
use crate::exec;
use crate::results::{self, RunResult};
use crate::session::{Session, DEFAULT_KILL_GRACE};
use chrono::{DateTime, Local};
use hdlrun_backends::{
    Backend, BackendFactory, BackendResult, CommandSequence, EnvOverrides, RuntimeLayout,
    SimulationRequest, SimulatorKind,
};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, warn};

/// Environment variable selecting the simulator
pub const SIM_VAR: &str = "SIM";

pub const DEFAULT_SIMULATOR: SimulatorKind = SimulatorKind::Icarus;

/// Resolve the simulator: explicit choice, then `SIM`, then the configured
/// default, then icarus
pub fn select_simulator(
    explicit: Option<&str>,
    from_env: Option<&str>,
    configured: Option<SimulatorKind>,
) -> BackendResult<SimulatorKind> {
    match explicit.or(from_env).filter(|name| !name.trim().is_empty()) {
        Some(name) => name.parse(),
        None => Ok(configured.unwrap_or(DEFAULT_SIMULATOR)),
    }
}

/// Everything needed to execute a run, without having executed it
#[derive(Debug)]
pub struct Plan {
    pub simulator: SimulatorKind,
    pub commands: CommandSequence,
    pub env: ExecutionEnvironment,
    pub report_path: PathBuf,
}

/// What a finished run reports back
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub simulator: SimulatorKind,
    pub toplevel: String,
    pub module: String,
    pub commands: usize,
    pub compile_only: bool,
    /// Absent for compile-only runs
    pub result: Option<RunResult>,
    pub started: DateTime<Local>,
    pub elapsed_secs: f64,
}

impl RunSummary {
    pub fn report_path(&self) -> Option<&PathBuf> {
        self.result.as_ref().map(|result| &result.report_path)
    }
}

pub struct Runner {
    simulator: SimulatorKind,
    request: SimulationRequest,
    layout: RuntimeLayout,
    kill_grace: Duration,
    environment: Option<ExecutionEnvironment>,
}

impl Runner {
    pub fn new(simulator: SimulatorKind, request: SimulationRequest, layout: RuntimeLayout) -> Self {
        Self {
            simulator,
            request,
            layout,
            kill_grace: DEFAULT_KILL_GRACE,
            environment: None,
        }
    }

    /// How long a cancelled child gets between SIGTERM and SIGKILL
    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    /// Base environment to use instead of the current process environment
    pub fn with_environment(mut self, environment: ExecutionEnvironment) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn simulator(&self) -> SimulatorKind {
        self.simulator
    }

    pub fn request(&self) -> &SimulationRequest {
        &self.request
    }

    /// Assemble commands and environment for the configured simulator
    pub fn plan(&self) -> Result<Plan> {
        let backend = BackendFactory::create_backend(self.simulator, &self.request, &self.layout)?;
        self.plan_with(backend.as_ref())
    }

    /// Assemble commands and environment for an already constructed backend
    pub fn plan_with(&self, backend: &dyn Backend) -> Result<Plan> {
        fs::create_dir_all(self.request.sim_dir())?;
        let inherited = self
            .environment
            .clone()
            .unwrap_or_else(ExecutionEnvironment::inherit);
        let report_path = self.report_path(&inherited)?;

        let mut backend_vars = EnvOverrides::new();
        let commands = backend.build(&mut backend_vars)?;
        debug!(
            "{} produced {} command(s), {} variable(s)",
            backend.kind(),
            commands.len(),
            backend_vars.len()
        );

        let env = ExecutionEnvironment::prepare(
            inherited,
            &self.request,
            &self.layout,
            &backend_vars,
            &report_path,
        )?;

        Ok(Plan {
            simulator: backend.kind(),
            commands,
            env,
            report_path,
        })
    }

    /// Build, execute and collect with the configured simulator
    pub fn run(&self) -> Result<RunSummary> {
        let backend = BackendFactory::create_backend(self.simulator, &self.request, &self.layout)?;
        self.run_with(backend.as_ref())
    }

    /// Build, execute and collect with `backend`
    pub fn run_with(&self, backend: &dyn Backend) -> Result<RunSummary> {
        let started = Local::now();
        let clock = Instant::now();

        let plan = self.plan_with(backend)?;
        plan.commands.check_executables(plan.env.search_path())?;
        if !self.request.compile_only() {
            remove_stale_report(&plan.report_path)?;
        }

        let span = info_span!(
            "simulation",
            simulator = %plan.simulator,
            toplevel = self.request.toplevel(),
            module = self.request.module()
        );
        let session = Session::install(span)?.with_kill_grace(self.kill_grace);
        exec::execute(&session, &plan.commands, &plan.env, self.request.work_dir())?;
        session.restore_signals();
        drop(session);

        let result = if self.request.compile_only() {
            None
        } else {
            let result = results::collect(&plan.report_path)?;
            info!("Results file: {}", result.report_path.display());
            Some(result)
        };

        Ok(RunSummary {
            simulator: plan.simulator,
            toplevel: self.request.toplevel().to_string(),
            module: self.request.module().to_string(),
            commands: plan.commands.len(),
            compile_only: self.request.compile_only(),
            result,
            started,
            elapsed_secs: clock.elapsed().as_secs_f64(),
        })
    }

    /// Report location: `COCOTB_RESULTS_FILE` when set, otherwise a fresh
    /// name in the build directory. The placeholder file is removed again so
    /// only the simulator creates it.
    fn report_path(&self, inherited: &ExecutionEnvironment) -> Result<PathBuf> {
        if let Some(path) = inherited.get(RESULTS_FILE_VAR).filter(|p| !p.is_empty()) {
            return Ok(PathBuf::from(path));
        }
        let placeholder = tempfile::Builder::new()
            .suffix("_results.xml")
            .tempfile_in(self.request.sim_dir())?
            .into_temp_path();
        let path = placeholder.to_path_buf();
        placeholder.close()?;
        Ok(path)
    }
}

/// A report left by an earlier run must not be mistaken for this run's
fn remove_stale_report(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            warn!("Removed results file from a previous run: {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
