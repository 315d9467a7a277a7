//! Verilator backend (Verilog only)
//!
//! Verilates the design together with the runtime's C++ harness, builds the
//! generated makefile, and runs the resulting executable directly.

use crate::rebuild::needs_compile;
use crate::util::path_arg;
use crate::{
    find_executable, reject_sources, Backend, BackendError, BackendResult, CommandSequence,
    EnvOverrides, RuntimeLayout, SimCommand, SimulationRequest, SimulatorKind, SourceKind,
};
use std::path::PathBuf;
use tracing::{debug, warn};

pub struct VerilatorBackend {
    request: SimulationRequest,
    layout: RuntimeLayout,
    executable: PathBuf,
}

impl VerilatorBackend {
    /// Fails with `MissingExecutable` when `verilator` is not on `PATH`
    pub fn new(request: SimulationRequest, layout: RuntimeLayout) -> BackendResult<Self> {
        let path = std::env::var_os("PATH");
        Self::with_search_path(request, layout, path.as_deref())
    }

    /// Like [`VerilatorBackend::new`] but searching an explicit `PATH` value
    pub fn with_search_path(
        request: SimulationRequest,
        layout: RuntimeLayout,
        search_path: Option<&std::ffi::OsStr>,
    ) -> BackendResult<Self> {
        reject_sources(SimulatorKind::Verilator, &request, SourceKind::Vhdl)?;
        if request.gui() {
            warn!("verilator has no GUI mode, running in batch");
        }
        let executable = find_executable("verilator", search_path)
            .ok_or_else(|| BackendError::MissingExecutable("verilator".to_string()))?;
        debug!("Using verilator at {}", executable.display());
        Ok(Self {
            request,
            layout,
            executable,
        })
    }

    fn verilate_command(&self) -> SimCommand {
        let req = &self.request;
        let sim_dir = path_arg(req.sim_dir());
        let lib_dir = self.layout.lib_dir().to_string_lossy().to_string();
        SimCommand::new("perl")
            .arg(path_arg(&self.executable))
            .args(["-cc", "--exe", "-Mdir"])
            .arg(sim_dir)
            .args(["-DCOCOTB_SIM=1", "--top-module", req.toplevel()])
            .args(["--vpi", "--public-flat-rw", "--prefix", "Vtop", "-o"])
            .arg(req.toplevel())
            .arg("-LDFLAGS")
            .arg(format!(
                "-Wl,-rpath,{lib} -L{lib} -lcocotbvpi_verilator",
                lib = lib_dir
            ))
            .args(req.compile_args().iter().cloned())
            .args(self.define_flags(req.defines()))
            .args(self.include_flags(req.includes()))
            .arg(path_arg(&self.layout.verilator_cpp()))
            .args(req.verilog_sources().iter().map(|p| path_arg(p)))
    }
}

impl Backend for VerilatorBackend {
    fn kind(&self) -> SimulatorKind {
        SimulatorKind::Verilator
    }

    fn include_flags(&self, dirs: &[PathBuf]) -> Vec<String> {
        dirs.iter()
            .map(|dir| format!("-I{}", dir.to_string_lossy()))
            .collect()
    }

    fn define_flags(&self, defines: &[String]) -> Vec<String> {
        defines.iter().map(|define| format!("-D{}", define)).collect()
    }

    fn build(&self, env: &mut EnvOverrides) -> BackendResult<CommandSequence> {
        let req = &self.request;
        let mut commands = CommandSequence::new();
        let out_file = req.sim_dir().join(req.toplevel());

        if needs_compile(req.force_compile(), &out_file, req.verilog_sources())? {
            env.set("CPPFLAGS", "-std=c++11");
            commands.push(self.verilate_command());
            commands.push(
                SimCommand::new("make")
                    .arg("-C")
                    .arg(path_arg(req.sim_dir()))
                    .args(["-f", "Vtop.mk"]),
            );
        }

        if !req.compile_only() {
            commands.push(
                SimCommand::new(path_arg(&out_file))
                    .args(req.simulation_args().iter().cloned())
                    .args(req.plus_args().iter().cloned()),
            );
        }

        Ok(commands)
    }
}
