use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use hdlrun_backends::{BackendFactory, SimulatorKind};
use hdlrun_manifest::{Manifest, MANIFEST_FILE};
use hdlrun_runner::runner::DEFAULT_SIMULATOR;
use hdlrun_runner::{select_simulator, Runner, SIM_VAR};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// hdlrun - run cocotb testbenches on any supported HDL simulator
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only show warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile and simulate, then check the test report
    Run {
        #[command(flatten)]
        target: TargetArgs,

        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the commands a run would execute, without executing them.
    ///
    /// Nothing is spawned, but the build directory and any script files the
    /// printed commands read (such as runsim.do) are written, so the commands
    /// can be pasted into a shell as they are.
    Commands {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Remove simulation build directories
    Clean {
        /// Directory to clean (defaults to the current directory)
        #[arg(default_value = ".")]
        dir: PathBuf,

        /// Also remove build directories in every subdirectory
        #[arg(short, long)]
        recursive: bool,

        /// Name of the build directory
        #[arg(long, default_value = "sim_build")]
        sim_build: String,
    },

    /// List supported simulators
    Simulators,
}

/// Options shared by `run` and `commands`; each one overrides the
/// configuration file
#[derive(Args)]
struct TargetArgs {
    /// Configuration file
    #[arg(short, long, default_value = MANIFEST_FILE)]
    config: PathBuf,

    /// Simulator to use (overrides SIM and the configuration)
    #[arg(short, long)]
    sim: Option<String>,

    /// Only run the named test case
    #[arg(long)]
    testcase: Option<String>,

    /// Random seed passed to the test runtime
    #[arg(long)]
    seed: Option<u64>,

    /// Extra preprocessor define (repeatable)
    #[arg(short = 'D', long = "define")]
    defines: Vec<String>,

    /// Extra plus argument for the simulator (repeatable)
    #[arg(long = "plus-arg", allow_hyphen_values = true)]
    plus_args: Vec<String>,

    /// Recompile even if the build is up to date
    #[arg(long)]
    force_compile: bool,

    /// Stop after compilation
    #[arg(long)]
    compile_only: bool,

    /// Open the simulator GUI
    #[arg(long)]
    gui: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Child output is logged at info, so that is the default level
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    // stdout is reserved for results and JSON
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match dispatch(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Run { target, json } => run_simulation(&target, json),
        Commands::Commands { target } => show_commands(&target),
        Commands::Clean {
            dir,
            recursive,
            sim_build,
        } => clean_builds(&dir, &sim_build, recursive),
        Commands::Simulators => {
            list_simulators();
            Ok(())
        }
    }
}

/// Load the configuration and apply command line overrides
fn load_runner(target: &TargetArgs) -> Result<Runner> {
    let manifest: Manifest = hdlrun_manifest::from_path(&target.config)
        .with_context(|| format!("Failed to load {}", target.config.display()))?;
    manifest.validate()?;
    let base = hdlrun_manifest::base_dir(&target.config);
    debug!("Resolving paths against {}", base.display());

    let from_env = std::env::var(SIM_VAR).ok();
    let simulator = select_simulator(
        target.sim.as_deref(),
        from_env.as_deref(),
        manifest.runner.simulator,
    )?;

    let mut builder = manifest
        .request_builder(&base)
        .defines(target.defines.iter().cloned())
        .plus_args(target.plus_args.iter().cloned());
    if let Some(testcase) = &target.testcase {
        builder = builder.testcase(testcase);
    }
    if let Some(seed) = target.seed {
        builder = builder.seed(seed);
    }
    if target.force_compile {
        builder = builder.force_compile(true);
    }
    if target.compile_only {
        builder = builder.compile_only(true);
    }
    if target.gui {
        builder = builder.gui(true);
    }
    let request = builder.build().context("Invalid simulation request")?;

    let layout = manifest
        .runtime_layout(&base)
        .context("Failed to locate the cocotb runtime")?;

    let mut runner = Runner::new(simulator, request, layout);
    if let Some(grace) = manifest.kill_grace() {
        runner = runner.with_kill_grace(grace);
    }
    Ok(runner)
}

fn run_simulation(target: &TargetArgs, json: bool) -> Result<()> {
    let runner = load_runner(target)?;
    info!(
        "Simulating {} with {}",
        runner.request().toplevel(),
        runner.simulator()
    );

    let summary = runner.run()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else if let Some(path) = summary.report_path() {
        println!("Results file: {}", path.display());
    } else {
        println!("Compilation finished in {:.2}s", summary.elapsed_secs);
    }
    Ok(())
}

fn show_commands(target: &TargetArgs) -> Result<()> {
    let runner = load_runner(target)?;
    let plan = runner.plan()?;

    println!("# simulator: {}", plan.simulator);
    println!("# working directory: {}", runner.request().work_dir().display());
    println!("# results file: {}", plan.report_path.display());
    for command in &plan.commands {
        println!("{}", command);
    }
    Ok(())
}

fn clean_builds(dir: &Path, sim_build: &str, recursive: bool) -> Result<()> {
    let removed = hdlrun_runner::clean(dir, sim_build, recursive)
        .with_context(|| format!("Failed to clean {}", dir.display()))?;

    if removed.is_empty() {
        println!("Nothing to clean");
    }
    for path in removed {
        println!("Removed {}", path.display());
    }
    Ok(())
}

fn list_simulators() {
    let configured = std::env::var(SIM_VAR)
        .ok()
        .and_then(|name| name.parse::<SimulatorKind>().ok());

    for kind in BackendFactory::available_backends() {
        let mut notes = Vec::new();
        if kind == DEFAULT_SIMULATOR {
            notes.push("default");
        }
        if configured == Some(kind) {
            notes.push("selected by SIM");
        }
        if notes.is_empty() {
            println!("{}", kind);
        } else {
            println!("{} ({})", kind, notes.join(", "));
        }
    }
}
