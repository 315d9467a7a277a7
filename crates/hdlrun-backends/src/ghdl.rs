//! GHDL backend (VHDL only)
//!
//! Sources are imported one by one with `ghdl -i`, the toplevel is
//! elaborated with `ghdl -m`, and `ghdl -r` runs it with the runtime's VPI
//! module. All library files go into the simulation build directory.

use crate::rebuild::needs_compile;
use crate::util::path_arg;
use crate::{
    reject_sources, Backend, BackendResult, CommandSequence, EnvOverrides, RuntimeLayout,
    SimCommand, SimulationRequest, SimulatorKind, SourceKind,
};
use std::path::PathBuf;
use tracing::warn;

const DEFAULT_STD: &str = "93";

pub struct GhdlBackend {
    request: SimulationRequest,
    layout: RuntimeLayout,
}

impl GhdlBackend {
    pub fn new(request: SimulationRequest, layout: RuntimeLayout) -> BackendResult<Self> {
        reject_sources(SimulatorKind::Ghdl, &request, SourceKind::Verilog)?;
        if request.gui() {
            warn!("ghdl has no GUI mode, running in batch");
        }
        Ok(Self { request, layout })
    }

    fn workdir_flag(&self) -> String {
        format!("--workdir={}", self.request.sim_dir().to_string_lossy())
    }

    /// `--std=` selected in the compile arguments, if any
    fn std_flag(&self) -> Option<&String> {
        self.request
            .compile_args()
            .iter()
            .rev()
            .find(|arg| arg.starts_with("--std="))
    }

    /// Library index file of the `work` library; its name carries the
    /// VHDL standard revision
    pub fn work_library(&self) -> PathBuf {
        let std = self
            .std_flag()
            .map(|flag| flag.trim_start_matches("--std="))
            .unwrap_or(DEFAULT_STD);
        self.request
            .sim_dir()
            .join(format!("work-obj{}.cf", std))
    }

    fn analysis_options(&self) -> Vec<String> {
        let req = &self.request;
        let mut options = vec![self.workdir_flag()];
        options.extend(self.include_flags(req.includes()));
        options.extend(req.compile_args().iter().cloned());
        options
    }
}

impl Backend for GhdlBackend {
    fn kind(&self) -> SimulatorKind {
        SimulatorKind::Ghdl
    }

    /// Extra library search directories
    fn include_flags(&self, dirs: &[PathBuf]) -> Vec<String> {
        dirs.iter()
            .map(|dir| format!("-P{}", dir.to_string_lossy()))
            .collect()
    }

    /// Defines become toplevel generic overrides (`NAME=VALUE`)
    fn define_flags(&self, defines: &[String]) -> Vec<String> {
        defines.iter().map(|define| format!("-g{}", define)).collect()
    }

    fn build(&self, _env: &mut EnvOverrides) -> BackendResult<CommandSequence> {
        let req = &self.request;
        let mut commands = CommandSequence::new();

        if needs_compile(req.force_compile(), &self.work_library(), req.vhdl_sources())? {
            for source in req.vhdl_sources() {
                commands.push(
                    SimCommand::new("ghdl")
                        .arg("-i")
                        .args(self.analysis_options())
                        .arg(path_arg(source)),
                );
            }
            commands.push(
                SimCommand::new("ghdl")
                    .arg("-m")
                    .args(self.analysis_options())
                    .arg(req.toplevel()),
            );
        }

        if !req.compile_only() {
            let mut run = SimCommand::new("ghdl").arg("-r").arg(self.workdir_flag());
            if let Some(std) = self.std_flag() {
                run = run.arg(std.clone());
            }
            run = run
                .arg(req.toplevel())
                .arg(format!(
                    "--vpi={}",
                    self.layout.library("cocotbvpi_ghdl").to_string_lossy()
                ))
                .args(self.define_flags(req.defines()))
                .args(req.simulation_args().iter().cloned());
            commands.push(run);
        }

        Ok(commands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_library_follows_std_flag() {
        let dir = tempfile::tempdir().unwrap();
        let request = SimulationRequest::builder("top", "test_top")
            .base_dir(dir.path())
            .compile_args(["--std=08"])
            .build()
            .unwrap();
        let backend = GhdlBackend::new(request, RuntimeLayout::new("/l", "/s")).unwrap();
        assert!(backend.work_library().ends_with("work-obj08.cf"));
    }
}
