//! Cadence Incisive (`irun`) and Xcelium (`xrun`) backends
//!
//! Both tools share one command-line dialect, so a single implementation is
//! parameterised by the tool.

use crate::rebuild::needs_compile;
use crate::util::path_arg;
use crate::{
    Backend, BackendResult, CommandSequence, EnvOverrides, RuntimeLayout, SimCommand,
    SimulationRequest, SimulatorKind,
};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CadenceTool {
    Ius,
    Xcelium,
}

impl CadenceTool {
    pub fn program(self) -> &'static str {
        match self {
            CadenceTool::Ius => "irun",
            CadenceTool::Xcelium => "xrun",
        }
    }

    fn kind(self) -> SimulatorKind {
        match self {
            CadenceTool::Ius => SimulatorKind::Ius,
            CadenceTool::Xcelium => SimulatorKind::Xcelium,
        }
    }
}

pub struct CadenceBackend {
    tool: CadenceTool,
    request: SimulationRequest,
    layout: RuntimeLayout,
}

impl CadenceBackend {
    pub fn new(
        tool: CadenceTool,
        request: SimulationRequest,
        layout: RuntimeLayout,
    ) -> BackendResult<Self> {
        Ok(Self {
            tool,
            request,
            layout,
        })
    }

    pub fn ius(request: SimulationRequest, layout: RuntimeLayout) -> BackendResult<Self> {
        Self::new(CadenceTool::Ius, request, layout)
    }

    pub fn xcelium(request: SimulationRequest, layout: RuntimeLayout) -> BackendResult<Self> {
        Self::new(CadenceTool::Xcelium, request, layout)
    }

    fn elaborate_command(&self) -> SimCommand {
        let req = &self.request;
        let vpi = format!(
            "{}:vlog_startup_routines_bootstrap",
            self.layout.library("cocotbvpi_ius").to_string_lossy()
        );
        SimCommand::new(self.tool.program())
            .args(["-64", "-elaborate", "-v93", "-define", "COCOTB_SIM=1"])
            .args(["-loadvpi".to_string(), vpi])
            .args(["-plinowarn", "-access", "+rwc", "-top", req.toplevel()])
            .args(self.define_flags(req.defines()))
            .args(self.include_flags(req.includes()))
            .args(req.compile_args().iter().cloned())
            .args(req.verilog_sources().iter().map(|p| path_arg(p)))
            .args(req.vhdl_sources().iter().map(|p| path_arg(p)))
    }

    fn run_command(&self) -> SimCommand {
        let req = &self.request;
        let mut cmd = SimCommand::new(self.tool.program()).args(["-64", "-R"]);
        if req.gui() {
            cmd = cmd.arg("-gui");
        }
        cmd.args(req.simulation_args().iter().cloned())
            .args(req.plus_args().iter().cloned())
    }
}

impl Backend for CadenceBackend {
    fn kind(&self) -> SimulatorKind {
        self.tool.kind()
    }

    fn include_flags(&self, dirs: &[PathBuf]) -> Vec<String> {
        dirs.iter()
            .flat_map(|dir| ["-incdir".to_string(), path_arg(dir)])
            .collect()
    }

    fn define_flags(&self, defines: &[String]) -> Vec<String> {
        defines
            .iter()
            .flat_map(|define| ["-define".to_string(), define.clone()])
            .collect()
    }

    fn build(&self, env: &mut EnvOverrides) -> BackendResult<CommandSequence> {
        let req = &self.request;
        env.set("GPI_EXTRA", "cocotbvhpi_ius:cocotbvhpi_entry_point");

        let mut commands = CommandSequence::new();
        // INCA_libs is created in the directory the tool runs in
        let out_file = req.work_dir().join("INCA_libs").join("history");
        if needs_compile(req.force_compile(), &out_file, &req.all_sources())? {
            commands.push(self.elaborate_command());
        }

        if !req.compile_only() {
            commands.push(self.run_command());
        }

        Ok(commands)
    }
}
