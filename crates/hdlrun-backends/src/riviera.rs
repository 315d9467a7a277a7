//! Aldec Riviera-PRO backend
//!
//! The whole flow is a single TCL do-script executed by `vsimsa` (or by the
//! `riviera` GUI in interactive mode).

use crate::rebuild::needs_compile;
use crate::util::{add_args, as_tcl_value, tcl_path, tcl_values};
use crate::{
    Backend, BackendResult, CommandSequence, EnvOverrides, RuntimeLayout, SimCommand,
    SimulationRequest, SimulatorKind, ToplevelLang,
};
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

pub const RUN_SCRIPT: &str = "runsim.do";

pub struct RivieraBackend {
    request: SimulationRequest,
    layout: RuntimeLayout,
}

impl RivieraBackend {
    pub fn new(request: SimulationRequest, layout: RuntimeLayout) -> BackendResult<Self> {
        Ok(Self { request, layout })
    }

    fn rtl_library(&self) -> &str {
        self.request.toplevel()
    }

    fn script(&self, compile: bool, env: &mut EnvOverrides) -> String {
        let req = &self.request;
        let lib = as_tcl_value(self.rtl_library());
        let compile_args = tcl_values(req.compile_args()).join(" ");
        let mut script = String::from("onerror {\n quit -code 1\n}\n");

        if compile {
            let _ = writeln!(script, "alib {}", lib);
            if !req.vhdl_sources().is_empty() {
                let sources: Vec<_> = req.vhdl_sources().iter().map(|p| tcl_path(p)).collect();
                let line = add_args([
                    format!("acom -work {}", lib),
                    compile_args.clone(),
                    sources.join(" "),
                ]);
                let _ = writeln!(script, "{}", line);
            }
            if !req.verilog_sources().is_empty() {
                let sources: Vec<_> =
                    req.verilog_sources().iter().map(|p| tcl_path(p)).collect();
                let line = add_args([
                    format!("alog -work {} +define+COCOTB_SIM -sv", lib),
                    self.define_flags(req.defines()).join(" "),
                    self.include_flags(req.includes()).join(" "),
                    compile_args.clone(),
                    sources.join(" "),
                ]);
                let _ = writeln!(script, "{}", line);
            }
        }

        if !req.compile_only() {
            let load = match req.toplevel_lang() {
                ToplevelLang::Vhdl => {
                    if !req.verilog_sources().is_empty() {
                        env.set("GPI_EXTRA", "cocotbvpi_aldec:cocotbvpi_entry_point");
                    }
                    format!(
                        "-loadvhpi {}",
                        tcl_path(&self.layout.library_stem("cocotbvhpi_aldec"))
                    )
                }
                ToplevelLang::Verilog => {
                    if !req.vhdl_sources().is_empty() {
                        env.set("GPI_EXTRA", "cocotbvhpi_aldec:cocotbvhpi_entry_point");
                    }
                    format!(
                        "-pli {}",
                        tcl_path(&self.layout.library_stem("cocotbvpi_aldec"))
                    )
                }
            };
            let line = add_args([
                format!("asim +access +w -interceptcoutput -O2 {}", load),
                tcl_values(req.simulation_args()).join(" "),
                as_tcl_value(&format!("{}.{}", self.rtl_library(), req.toplevel())),
                tcl_values(req.plus_args()).join(" "),
            ]);
            let _ = writeln!(script, "{}", line);
            if !req.gui() {
                script.push_str("run -all\nexit\n");
            }
        }

        script
    }
}

impl Backend for RivieraBackend {
    fn kind(&self) -> SimulatorKind {
        SimulatorKind::Riviera
    }

    fn include_flags(&self, dirs: &[PathBuf]) -> Vec<String> {
        dirs.iter()
            .map(|dir| format!("+incdir+{}", tcl_path(dir)))
            .collect()
    }

    fn define_flags(&self, defines: &[String]) -> Vec<String> {
        defines
            .iter()
            .map(|define| format!("+define+{}", as_tcl_value(define)))
            .collect()
    }

    fn build(&self, env: &mut EnvOverrides) -> BackendResult<CommandSequence> {
        let req = &self.request;
        let library = req
            .work_dir()
            .join(self.rtl_library())
            .join(format!("{}.lib", self.rtl_library()));
        let compile = needs_compile(req.force_compile(), &library, &req.all_sources())?;

        let script = self.script(compile, env);
        fs::create_dir_all(req.work_dir())?;
        let script_path = req.work_dir().join(RUN_SCRIPT);
        fs::write(&script_path, script)?;

        let program = if req.gui() { "riviera" } else { "vsimsa" };
        let mut commands = CommandSequence::new();
        commands.push(
            SimCommand::new(program)
                .args(["-do", "do"])
                .arg(tcl_path(&script_path)),
        );
        Ok(commands)
    }
}
