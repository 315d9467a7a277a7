//! Synopsys VCS backend

use crate::rebuild::needs_compile;
use crate::util::path_arg;
use crate::{
    reject_sources, Backend, BackendResult, CommandSequence, EnvOverrides, RuntimeLayout,
    SimCommand, SimulationRequest, SimulatorKind, SourceKind,
};
use std::fs;
use std::path::{Path, PathBuf};

/// PLI table granting the runtime read/write access everywhere
const PLI_TABLE: &str = "acc+=rw,wn:*";

pub struct VcsBackend {
    request: SimulationRequest,
    layout: RuntimeLayout,
}

impl VcsBackend {
    pub fn new(request: SimulationRequest, layout: RuntimeLayout) -> BackendResult<Self> {
        reject_sources(SimulatorKind::Vcs, &request, SourceKind::Vhdl)?;
        Ok(Self { request, layout })
    }

    fn simv(&self) -> PathBuf {
        self.request.sim_dir().join("simv")
    }

    fn compile_command(&self, pli_tab: &Path) -> SimCommand {
        let req = &self.request;
        SimCommand::new("vcs")
            .args(["-full64", "-debug", "+vpi", "-P"])
            .arg(path_arg(pli_tab))
            .args(["-sverilog", "+define+COCOTB_SIM=1", "-load"])
            .arg(path_arg(&self.layout.library("cocotbvpi_vcs")))
            .args(["-o".to_string(), path_arg(&self.simv())])
            .args(self.define_flags(req.defines()))
            .args(self.include_flags(req.includes()))
            .args(req.compile_args().iter().cloned())
            .args(req.verilog_sources().iter().map(|p| path_arg(p)))
    }
}

impl Backend for VcsBackend {
    fn kind(&self) -> SimulatorKind {
        SimulatorKind::Vcs
    }

    fn include_flags(&self, dirs: &[PathBuf]) -> Vec<String> {
        dirs.iter()
            .map(|dir| format!("+incdir+{}", dir.to_string_lossy()))
            .collect()
    }

    fn define_flags(&self, defines: &[String]) -> Vec<String> {
        defines
            .iter()
            .map(|define| format!("+define+{}", define))
            .collect()
    }

    fn build(&self, _env: &mut EnvOverrides) -> BackendResult<CommandSequence> {
        let req = &self.request;
        let mut commands = CommandSequence::new();

        if needs_compile(req.force_compile(), &self.simv(), req.verilog_sources())? {
            fs::create_dir_all(req.sim_dir())?;
            let pli_tab = req.sim_dir().join("pli.tab");
            fs::write(&pli_tab, PLI_TABLE)?;
            commands.push(self.compile_command(&pli_tab));
        }

        if !req.compile_only() {
            let mut run = SimCommand::new(path_arg(&self.simv()))
                .arg("+define+COCOTB_SIM=1")
                .args(req.simulation_args().iter().cloned())
                .args(req.plus_args().iter().cloned());
            if req.gui() {
                run = run.arg("-gui");
            }
            commands.push(run);
        }

        Ok(commands)
    }
}
