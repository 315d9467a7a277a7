//! Integration tests for backend command assembly

use hdlrun_backends::{
    Backend, BackendError, BackendFactory, EnvOverrides, RuntimeLayout, SimulationRequest, SimulatorKind,
    ToplevelLang,
};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

fn layout() -> RuntimeLayout {
    RuntimeLayout::new("/opt/rt/libs", "/opt/rt/share")
}

fn write_source(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, "module m; endmodule\n").unwrap();
    path
}

fn set_mtime(path: &Path, at: SystemTime) {
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(at)
        .unwrap();
}

/// Two Verilog sources under a fresh temp dir, no build artifacts yet
fn two_source_design() -> (TempDir, Vec<PathBuf>) {
    let dir = tempfile::tempdir().unwrap();
    let sources = vec![
        write_source(dir.path(), "a.v"),
        write_source(dir.path(), "b.v"),
    ];
    (dir, sources)
}

#[test]
fn test_icarus_fresh_build_compiles_then_runs() {
    let (dir, sources) = two_source_design();
    let request = SimulationRequest::builder("dff", "test_dff")
        .base_dir(dir.path())
        .verilog_sources(sources.clone())
        .defines(["WIDTH=8"])
        .includes(["inc"])
        .plus_args(["+seed=3"])
        .build()
        .unwrap();

    let backend = BackendFactory::create_backend(SimulatorKind::Icarus, &request, &layout()).unwrap();
    let mut env = EnvOverrides::new();
    let commands = backend.build(&mut env).unwrap();

    assert_eq!(commands.len(), 2);
    let compile = &commands.as_slice()[0];
    assert_eq!(compile.program, "iverilog");
    assert!(compile.args.contains(&"-g2012".to_string()));
    let define_at = compile.args.iter().position(|a| a == "WIDTH=8").unwrap();
    assert_eq!(compile.args[define_at - 1], "-D");
    // Sources come last, in request order
    let n = compile.args.len();
    assert_eq!(compile.args[n - 2], sources[0].to_string_lossy());
    assert_eq!(compile.args[n - 1], sources[1].to_string_lossy());

    let run = &commands.as_slice()[1];
    assert_eq!(run.program, "vvp");
    assert_eq!(run.args.last().unwrap(), "+seed=3");
    assert!(run.args.contains(&"libcocotbvpi_icarus".to_string()));
    assert!(env.is_empty());
}

#[test]
fn test_icarus_compile_only_skips_run() {
    let (dir, sources) = two_source_design();
    let request = SimulationRequest::builder("dff", "test_dff")
        .base_dir(dir.path())
        .verilog_sources(sources)
        .compile_only(true)
        .build()
        .unwrap();

    let backend = BackendFactory::create_backend(SimulatorKind::Icarus, &request, &layout()).unwrap();
    let commands = backend.build(&mut EnvOverrides::new()).unwrap();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands.as_slice()[0].program, "iverilog");
}

#[test]
fn test_icarus_up_to_date_image_runs_only() {
    let (dir, sources) = two_source_design();
    let past = SystemTime::now() - Duration::from_secs(3600);
    for source in &sources {
        set_mtime(source, past);
    }

    let sim_dir = dir.path().join("sim_build");
    fs::create_dir_all(&sim_dir).unwrap();
    fs::write(sim_dir.join("dff.vvp"), "image").unwrap();

    let request = SimulationRequest::builder("dff", "test_dff")
        .base_dir(dir.path())
        .verilog_sources(sources)
        .build()
        .unwrap();
    let backend = BackendFactory::create_backend(SimulatorKind::Icarus, &request, &layout()).unwrap();
    let commands = backend.build(&mut EnvOverrides::new()).unwrap();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands.as_slice()[0].program, "vvp");

    // Forcing brings the compile step back
    let forced = SimulationRequest::builder("dff", "test_dff")
        .base_dir(dir.path())
        .verilog_sources([dir.path().join("a.v")])
        .force_compile(true)
        .build()
        .unwrap();
    let backend = BackendFactory::create_backend(SimulatorKind::Icarus, &forced, &layout()).unwrap();
    assert_eq!(backend.build(&mut EnvOverrides::new()).unwrap().len(), 2);
}

#[test]
fn test_missing_source_fails_rebuild_check() {
    let dir = tempfile::tempdir().unwrap();
    let sim_dir = dir.path().join("sim_build");
    fs::create_dir_all(&sim_dir).unwrap();
    fs::write(sim_dir.join("dff.vvp"), "image").unwrap();

    let request = SimulationRequest::builder("dff", "test_dff")
        .base_dir(dir.path())
        .verilog_sources(["missing.v"])
        .build()
        .unwrap();
    let backend = BackendFactory::create_backend(SimulatorKind::Icarus, &request, &layout()).unwrap();
    let err = backend.build(&mut EnvOverrides::new()).unwrap_err();
    assert!(matches!(err, BackendError::MissingDependency(p) if p.ends_with("missing.v")));
}

#[test]
fn test_verilog_only_engines_reject_vhdl() {
    let dir = tempfile::tempdir().unwrap();
    let request = SimulationRequest::builder("top", "test_top")
        .base_dir(dir.path())
        .vhdl_sources(["top.vhd"])
        .build()
        .unwrap();

    for kind in [SimulatorKind::Icarus, SimulatorKind::Vcs, SimulatorKind::Verilator] {
        let err = match BackendFactory::create_backend(kind, &request, &layout()) {
            Ok(_) => panic!("{} accepted VHDL sources", kind),
            Err(err) => err,
        };
        assert!(
            matches!(err, BackendError::UnsupportedSourceKind { simulator, .. } if simulator == kind),
            "unexpected error for {}: {}",
            kind,
            err
        );
        assert!(err.to_string().contains("VHDL"));
    }
}

#[test]
fn test_ghdl_rejects_verilog() {
    let dir = tempfile::tempdir().unwrap();
    let request = SimulationRequest::builder("top", "test_top")
        .base_dir(dir.path())
        .verilog_sources(["top.v"])
        .build()
        .unwrap();
    let err = match BackendFactory::create_backend(SimulatorKind::Ghdl, &request, &layout()) {
        Ok(_) => panic!("ghdl accepted Verilog sources"),
        Err(err) => err,
    };
    assert_eq!(err.to_string(), "ghdl does not support Verilog sources");
}

#[test]
fn test_ghdl_imports_each_source_then_elaborates() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_source(dir.path(), "a.vhd");
    let b = write_source(dir.path(), "b.vhd");
    let request = SimulationRequest::builder("top", "test_top")
        .base_dir(dir.path())
        .toplevel_lang(ToplevelLang::Vhdl)
        .vhdl_sources([a, b])
        .defines(["DATA_WIDTH=16"])
        .build()
        .unwrap();

    let backend = BackendFactory::create_backend(SimulatorKind::Ghdl, &request, &layout()).unwrap();
    let commands = backend.build(&mut EnvOverrides::new()).unwrap();
    let shapes: Vec<_> = commands
        .iter()
        .map(|c| (c.program.as_str(), c.args[0].as_str()))
        .collect();
    assert_eq!(
        shapes,
        [("ghdl", "-i"), ("ghdl", "-i"), ("ghdl", "-m"), ("ghdl", "-r")]
    );
    let run = commands.as_slice().last().unwrap();
    assert!(run.args.contains(&"-gDATA_WIDTH=16".to_string()));
    assert!(run.args.iter().any(|a| a.starts_with("--vpi=")));
}

#[test]
fn test_questa_writes_quoted_scripts() {
    let dir = tempfile::tempdir().unwrap();
    let src_dir = dir.path().join("my rtl");
    fs::create_dir_all(&src_dir).unwrap();
    let source = write_source(&src_dir, "top.sv");

    let request = SimulationRequest::builder("top", "test_top")
        .base_dir(dir.path())
        .verilog_sources([source])
        .defines(["MSG=[hi]"])
        .build()
        .unwrap();
    let backend = BackendFactory::create_backend(SimulatorKind::Questa, &request, &layout()).unwrap();
    let commands = backend.build(&mut EnvOverrides::new()).unwrap();

    // No library yet: vlib, compile script, run script
    let do_args: Vec<_> = commands.iter().map(|c| c.args[2].clone()).collect();
    assert_eq!(commands.len(), 3);
    assert_eq!(do_args[0], "vlib top; quit;");
    assert!(do_args[1].starts_with("source ") && do_args[1].ends_with("compile.do; quit;"));

    let compile = fs::read_to_string(request.work_dir().join("compile.do")).unwrap();
    assert!(compile.contains("my\\ rtl/top.sv"));
    assert!(compile.contains("+define+MSG=\\[hi\\]"));

    let run = fs::read_to_string(request.work_dir().join("runsim.do")).unwrap();
    assert!(run.starts_with("vsim -onfinish exit -pli "));
    assert!(run.contains(" top.top"));
    assert!(run.ends_with("\nrun -all\nquit\n"));
}

#[test]
fn test_questa_mixed_language_sets_gpi_extra() {
    let dir = tempfile::tempdir().unwrap();
    let request = SimulationRequest::builder("top", "test_top")
        .base_dir(dir.path())
        .toplevel_lang(ToplevelLang::Vhdl)
        .verilog_sources([write_source(dir.path(), "sub.v")])
        .vhdl_sources([write_source(dir.path(), "top.vhd")])
        .gui(true)
        .build()
        .unwrap();
    let backend = BackendFactory::create_backend(SimulatorKind::Questa, &request, &layout()).unwrap();
    let mut env = EnvOverrides::new();
    let commands = backend.build(&mut env).unwrap();

    assert_eq!(
        env.get("GPI_EXTRA"),
        Some("cocotbvpi_modelsim:cocotbvpi_entry_point")
    );
    let run = commands.as_slice().last().unwrap();
    assert_eq!(run.args[0], "-gui");
    let script = fs::read_to_string(request.work_dir().join("runsim.do")).unwrap();
    assert!(script.starts_with("vsim -onfinish stop -foreign cocotb_init\\ "));
    assert!(!script.contains("run -all"));
}

#[test]
fn test_riviera_single_script_command() {
    let dir = tempfile::tempdir().unwrap();
    let request = SimulationRequest::builder("top", "test_top")
        .base_dir(dir.path())
        .verilog_sources([write_source(dir.path(), "top.sv")])
        .includes(["inc dir"])
        .plus_args(["+verbose"])
        .build()
        .unwrap();
    let backend = BackendFactory::create_backend(SimulatorKind::Riviera, &request, &layout()).unwrap();
    let mut env = EnvOverrides::new();
    let commands = backend.build(&mut env).unwrap();

    assert_eq!(commands.len(), 1);
    let cmd = &commands.as_slice()[0];
    assert_eq!(cmd.program, "vsimsa");
    assert_eq!(cmd.args[..2], ["-do", "do"]);

    let script = fs::read_to_string(request.work_dir().join("runsim.do")).unwrap();
    assert!(script.starts_with("onerror {\n quit -code 1\n}\nalib top\n"));
    assert!(script.contains("+incdir+"));
    assert!(script.contains("inc\\ dir"));
    assert!(script.contains("-pli "));
    assert!(script.contains("top.top +verbose"));
    assert!(script.ends_with("run -all\nexit\n"));
    assert!(env.get("GPI_EXTRA").is_none());
}

#[test]
fn test_cadence_tools_share_dialect() {
    let dir = tempfile::tempdir().unwrap();
    let request = SimulationRequest::builder("top", "test_top")
        .base_dir(dir.path())
        .verilog_sources([write_source(dir.path(), "top.v")])
        .defines(["A=1", "B"])
        .build()
        .unwrap();

    for (kind, program) in [(SimulatorKind::Ius, "irun"), (SimulatorKind::Xcelium, "xrun")] {
        let backend = BackendFactory::create_backend(kind, &request, &layout()).unwrap();
        let mut env = EnvOverrides::new();
        let commands = backend.build(&mut env).unwrap();
        assert_eq!(commands.len(), 2);
        assert!(commands.iter().all(|c| c.program == program));

        let elaborate = &commands.as_slice()[0];
        let joined = elaborate.args.join(" ");
        assert!(joined.contains("-define A=1 -define B"));
        assert_eq!(commands.as_slice()[1].args, ["-64", "-R"]);
        assert_eq!(
            env.get("GPI_EXTRA"),
            Some("cocotbvhpi_ius:cocotbvhpi_entry_point")
        );
    }
}

#[test]
fn test_vcs_writes_pli_table_and_appends_gui() {
    let dir = tempfile::tempdir().unwrap();
    let request = SimulationRequest::builder("top", "test_top")
        .base_dir(dir.path())
        .verilog_sources([write_source(dir.path(), "top.v")])
        .gui(true)
        .build()
        .unwrap();
    let backend = BackendFactory::create_backend(SimulatorKind::Vcs, &request, &layout()).unwrap();
    let commands = backend.build(&mut EnvOverrides::new()).unwrap();

    assert_eq!(commands.len(), 2);
    let pli = fs::read_to_string(request.sim_dir().join("pli.tab")).unwrap();
    assert_eq!(pli, "acc+=rw,wn:*");
    let run = &commands.as_slice()[1];
    assert!(run.program.ends_with("simv"));
    assert_eq!(run.args.last().unwrap(), "-gui");
}

#[cfg(unix)]
#[test]
fn test_verilator_needs_executable_and_builds_makefile() {
    use hdlrun_backends::verilator::VerilatorBackend;
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let request = SimulationRequest::builder("top", "test_top")
        .base_dir(dir.path())
        .verilog_sources([write_source(dir.path(), "top.v")])
        .build()
        .unwrap();

    let empty = tempfile::tempdir().unwrap();
    let err = match VerilatorBackend::with_search_path(
        request.clone(),
        layout(),
        Some(empty.path().as_os_str()),
    ) {
        Ok(_) => panic!("verilator found in an empty PATH"),
        Err(err) => err,
    };
    assert!(matches!(err, BackendError::MissingExecutable(name) if name == "verilator"));

    let bin = tempfile::tempdir().unwrap();
    let tool = bin.path().join("verilator");
    fs::write(&tool, "#!/bin/sh\n").unwrap();
    fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();

    let backend =
        VerilatorBackend::with_search_path(request.clone(), layout(), Some(bin.path().as_os_str()))
            .unwrap();
    let mut env = EnvOverrides::new();
    let commands = backend.build(&mut env).unwrap();
    let programs: Vec<_> = commands.iter().map(|c| c.program.clone()).collect();
    assert_eq!(programs[..2], ["perl", "make"]);
    assert!(programs[2].ends_with("sim_build/top"));
    assert_eq!(env.get("CPPFLAGS"), Some("-std=c++11"));

    let verilate = &commands.as_slice()[0];
    assert_eq!(verilate.args[0], tool.to_string_lossy());
    assert!(verilate
        .args
        .iter()
        .any(|a| a.ends_with("share/lib/verilator/verilator.cpp")));
}

#[test]
fn test_flag_formatting_preserves_order() {
    let request = SimulationRequest::builder("top", "test_top").build().unwrap();
    let dirs = [PathBuf::from("/b"), PathBuf::from("/a")];
    let defines = ["Z".to_string(), "A=1".to_string()];

    let icarus = BackendFactory::create_backend(SimulatorKind::Icarus, &request, &layout()).unwrap();
    assert_eq!(icarus.include_flags(&dirs), ["-I", "/b", "-I", "/a"]);
    assert_eq!(icarus.define_flags(&defines), ["-D", "Z", "-D", "A=1"]);

    let vcs = BackendFactory::create_backend(SimulatorKind::Vcs, &request, &layout()).unwrap();
    assert_eq!(vcs.include_flags(&dirs), ["+incdir+/b", "+incdir+/a"]);
    assert_eq!(vcs.define_flags(&defines), ["+define+Z", "+define+A=1"]);

    let ghdl = BackendFactory::create_backend(SimulatorKind::Ghdl, &request, &layout()).unwrap();
    assert_eq!(ghdl.include_flags(&dirs), ["-P/b", "-P/a"]);
    assert_eq!(ghdl.define_flags(&defines), ["-gZ", "-gA=1"]);

    assert!(icarus.define_flags(&[]).is_empty());
}

/// Library-based tools create their libraries in the directory they run in,
/// so a separate working directory is where the rebuild check must look
#[test]
fn test_library_engines_skip_compile_in_separate_work_dir() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_source(dir.path(), "top.v");
    set_mtime(&source, SystemTime::now() - Duration::from_secs(3600));
    let work = dir.path().join("run");
    fs::create_dir_all(work.join("top")).unwrap();
    fs::create_dir_all(work.join("INCA_libs")).unwrap();
    fs::write(work.join("top/_info"), "questa").unwrap();
    fs::write(work.join("top/top.lib"), "riviera").unwrap();
    fs::write(work.join("INCA_libs/history"), "ius").unwrap();

    let request = SimulationRequest::builder("top", "test_top")
        .base_dir(dir.path())
        .work_dir("run")
        .verilog_sources([source])
        .build()
        .unwrap();
    assert_eq!(request.work_dir(), work);
    assert_ne!(request.work_dir(), request.sim_dir());

    let questa = BackendFactory::create_backend(SimulatorKind::Questa, &request, &layout()).unwrap();
    let commands = questa.build(&mut EnvOverrides::new()).unwrap();
    assert_eq!(commands.len(), 1);
    assert!(commands.as_slice()[0].args[2].contains("runsim.do"));

    let riviera = BackendFactory::create_backend(SimulatorKind::Riviera, &request, &layout()).unwrap();
    assert_eq!(riviera.build(&mut EnvOverrides::new()).unwrap().len(), 1);
    let script = fs::read_to_string(work.join("runsim.do")).unwrap();
    assert!(!script.contains("alib"));

    let ius = BackendFactory::create_backend(SimulatorKind::Ius, &request, &layout()).unwrap();
    let commands = ius.build(&mut EnvOverrides::new()).unwrap();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands.as_slice()[0].args, ["-64", "-R"]);
}

#[test]
fn test_questa_recreates_stale_library_in_work_dir() {
    let dir = tempfile::tempdir().unwrap();
    let work = dir.path().join("run");
    fs::create_dir_all(work.join("top")).unwrap();
    fs::write(work.join("top/_info"), "old").unwrap();
    set_mtime(&work.join("top/_info"), SystemTime::now() - Duration::from_secs(3600));
    let source = write_source(dir.path(), "top.v");

    let request = SimulationRequest::builder("top", "test_top")
        .base_dir(dir.path())
        .work_dir("run")
        .verilog_sources([source])
        .build()
        .unwrap();
    let backend = BackendFactory::create_backend(SimulatorKind::Questa, &request, &layout()).unwrap();
    let commands = backend.build(&mut EnvOverrides::new()).unwrap();

    let steps: Vec<_> = commands.iter().map(|c| c.args[2].clone()).collect();
    assert_eq!(steps.len(), 4);
    assert_eq!(steps[0], "vdel -lib top -all; quit;");
    assert_eq!(steps[1], "vlib top; quit;");
}

/// Log sink shared between a test and the subscriber it installs
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
    }
}

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_up_to_date_build_logs_skip_notice() {
    let (dir, sources) = two_source_design();
    for source in &sources {
        set_mtime(source, SystemTime::now() - Duration::from_secs(3600));
    }
    let sim_dir = dir.path().join("sim_build");
    fs::create_dir_all(&sim_dir).unwrap();
    fs::write(sim_dir.join("dff.vvp"), "image").unwrap();

    let request = SimulationRequest::builder("dff", "test_dff")
        .base_dir(dir.path())
        .verilog_sources(sources)
        .build()
        .unwrap();
    let backend = BackendFactory::create_backend(SimulatorKind::Icarus, &request, &layout()).unwrap();

    let logs = CapturedLogs::default();
    let sink = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || sink.clone())
        .with_ansi(false)
        .finish();
    let commands = tracing::subscriber::with_default(subscriber, || {
        backend.build(&mut EnvOverrides::new()).unwrap()
    });

    assert_eq!(commands.len(), 1);
    let text = logs.text();
    let notice = text
        .lines()
        .find(|line| line.contains("Skipping compilation"))
        .unwrap_or_else(|| panic!("no skip notice in:\n{}", text));
    assert!(notice.contains("WARN"));
    assert!(notice.contains(&sim_dir.join("dff.vvp").display().to_string()));
}
