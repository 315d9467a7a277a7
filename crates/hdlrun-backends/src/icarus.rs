//! Icarus Verilog backend
//!
//! Compiles with `iverilog` into a `.vvp` image and runs it with `vvp`,
//! loading the runtime's VPI module. Verilog only.

use crate::rebuild::needs_compile;
use crate::util::path_arg;
use crate::{
    reject_sources, Backend, BackendResult, CommandSequence, EnvOverrides, RuntimeLayout,
    SimCommand, SimulationRequest, SimulatorKind, SourceKind,
};
use std::path::{Path, PathBuf};
use tracing::warn;

pub struct IcarusBackend {
    request: SimulationRequest,
    layout: RuntimeLayout,
    sim_file: PathBuf,
}

impl IcarusBackend {
    pub fn new(request: SimulationRequest, layout: RuntimeLayout) -> BackendResult<Self> {
        reject_sources(SimulatorKind::Icarus, &request, SourceKind::Vhdl)?;
        if request.gui() {
            warn!("icarus has no GUI mode, running in batch");
        }
        let sim_file = request
            .sim_dir()
            .join(format!("{}.vvp", request.toplevel()));
        Ok(Self {
            request,
            layout,
            sim_file,
        })
    }

    /// Compiled simulation image
    pub fn sim_file(&self) -> &Path {
        &self.sim_file
    }

    fn compile_command(&self) -> SimCommand {
        let req = &self.request;
        SimCommand::new("iverilog")
            .args(["-o".to_string(), path_arg(&self.sim_file)])
            .args(["-D", "COCOTB_SIM=1", "-s", req.toplevel(), "-g2012"])
            .args(self.define_flags(req.defines()))
            .args(self.include_flags(req.includes()))
            .args(req.compile_args().iter().cloned())
            .args(req.verilog_sources().iter().map(|p| path_arg(p)))
    }

    fn run_command(&self) -> SimCommand {
        let req = &self.request;
        SimCommand::new("vvp")
            .args(["-M".to_string(), path_arg(self.layout.lib_dir())])
            .args(["-m", "libcocotbvpi_icarus"])
            .args(req.simulation_args().iter().cloned())
            .arg(path_arg(&self.sim_file))
            .args(req.plus_args().iter().cloned())
    }
}

impl Backend for IcarusBackend {
    fn kind(&self) -> SimulatorKind {
        SimulatorKind::Icarus
    }

    fn include_flags(&self, dirs: &[PathBuf]) -> Vec<String> {
        dirs.iter()
            .flat_map(|dir| ["-I".to_string(), path_arg(dir)])
            .collect()
    }

    fn define_flags(&self, defines: &[String]) -> Vec<String> {
        defines
            .iter()
            .flat_map(|define| ["-D".to_string(), define.clone()])
            .collect()
    }

    fn build(&self, _env: &mut EnvOverrides) -> BackendResult<CommandSequence> {
        let mut commands = CommandSequence::new();

        let deps = self.request.verilog_sources();
        if needs_compile(self.request.force_compile(), &self.sim_file, deps)? {
            commands.push(self.compile_command());
        }

        if !self.request.compile_only() {
            commands.push(self.run_command());
        }

        Ok(commands)
    }
}
