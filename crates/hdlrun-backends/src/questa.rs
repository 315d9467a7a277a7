//! Questa / ModelSim backend
//!
//! Everything goes through `vsim -do`. Compile and run steps are exported as
//! `.do` scripts into the working directory so the same scripts can be
//! sourced by hand from the simulator GUI.

use crate::rebuild::needs_compile;
use crate::util::{add_args, as_tcl_value, tcl_path, tcl_values};
use crate::{
    Backend, BackendResult, CommandSequence, EnvOverrides, RuntimeLayout, SimCommand,
    SimulationRequest, SimulatorKind, ToplevelLang,
};
use std::fs;
use std::path::{Path, PathBuf};

pub const COMPILE_SCRIPT: &str = "compile.do";
pub const RUN_SCRIPT: &str = "runsim.do";

pub struct QuestaBackend {
    request: SimulationRequest,
    layout: RuntimeLayout,
}

impl QuestaBackend {
    pub fn new(request: SimulationRequest, layout: RuntimeLayout) -> BackendResult<Self> {
        Ok(Self { request, layout })
    }

    /// RTL library the design is compiled into, named after the toplevel
    fn rtl_library(&self) -> &str {
        self.request.toplevel()
    }

    /// `vlib` creates the library relative to the directory vsim runs in
    fn library_dir(&self) -> PathBuf {
        self.request.work_dir().join(self.rtl_library())
    }

    fn batch(do_cmd: String) -> SimCommand {
        SimCommand::new("vsim").args(["-c", "-do"]).arg(do_cmd)
    }

    fn compile_script(&self) -> String {
        let req = &self.request;
        let lib = as_tcl_value(self.rtl_library());
        let mut lines = Vec::new();

        if !req.vhdl_sources().is_empty() {
            lines.push(add_args([
                "vcom -mixedsvvh -work".to_string(),
                lib.clone(),
                "-mfcu".to_string(),
                tcl_values(req.compile_args()).join(" "),
                paths_tcl(req.vhdl_sources()),
            ]));
        }

        if !req.verilog_sources().is_empty() {
            lines.push(add_args([
                "vlog -mixedsvvh -work".to_string(),
                lib,
                "+define+COCOTB_SIM -sv -mfcu".to_string(),
                self.define_flags(req.defines()).join(" "),
                self.include_flags(req.includes()).join(" "),
                tcl_values(req.compile_args()).join(" "),
                paths_tcl(req.verilog_sources()),
            ]));
        }

        let mut script = lines.join("\n");
        script.push('\n');
        script
    }

    fn run_script(&self, env: &mut EnvOverrides) -> String {
        let req = &self.request;

        // Primary interface follows the toplevel language, the other one is
        // loaded as an extra when both languages are present
        let interface = match req.toplevel_lang() {
            ToplevelLang::Vhdl => {
                if !req.verilog_sources().is_empty() {
                    env.set("GPI_EXTRA", "cocotbvpi_modelsim:cocotbvpi_entry_point");
                }
                let fli = self.layout.library("cocotbfli_modelsim");
                format!(
                    "-foreign {}",
                    as_tcl_value(&format!("cocotb_init {}", fli.to_string_lossy()))
                )
            }
            ToplevelLang::Verilog => {
                if !req.vhdl_sources().is_empty() {
                    env.set("GPI_EXTRA", "cocotbfli_modelsim:cocotbfli_entry_point");
                }
                format!(
                    "-pli {}",
                    tcl_path(&self.layout.library("cocotbvpi_modelsim"))
                )
            }
        };

        let on_finish = if req.gui() { "stop" } else { "exit" };
        let mut script = add_args([
            format!("vsim -onfinish {}", on_finish),
            interface,
            tcl_values(req.simulation_args()).join(" "),
            as_tcl_value(&format!("{}.{}", self.rtl_library(), req.toplevel())),
            tcl_values(req.plus_args()).join(" "),
        ]);
        script.push('\n');
        if !req.gui() {
            script.push_str("run -all\nquit\n");
        }
        script
    }
}

fn paths_tcl(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| tcl_path(p))
        .collect::<Vec<_>>()
        .join(" ")
}

fn write_script(dir: &Path, name: &str, contents: &str) -> BackendResult<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(name);
    fs::write(&path, contents)?;
    Ok(path)
}

impl Backend for QuestaBackend {
    fn kind(&self) -> SimulatorKind {
        SimulatorKind::Questa
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
        let mut commands = CommandSequence::new();
        let lib = as_tcl_value(self.rtl_library());

        let out_file = self.library_dir().join("_info");
        if needs_compile(req.force_compile(), &out_file, &req.all_sources())? {
            if self.library_dir().is_dir() {
                commands.push(Self::batch(format!("vdel -lib {} -all; quit;", lib)));
            }
            commands.push(Self::batch(format!("vlib {}; quit;", lib)));

            let script = write_script(req.work_dir(), COMPILE_SCRIPT, &self.compile_script())?;
            commands.push(Self::batch(format!("source {}; quit;", tcl_path(&script))));
        }

        if !req.compile_only() {
            let script = write_script(req.work_dir(), RUN_SCRIPT, &self.run_script(env))?;
            let mode = if req.gui() { "-gui" } else { "-c" };
            commands.push(
                SimCommand::new("vsim")
                    .args([mode, "-do"])
                    .arg(format!("source {}", tcl_path(&script))),
            );
        }

        Ok(commands)
    }
}
