//! Process execution engine
//!
//! Runs a command sequence strictly one command after the other. Each child
//! gets a single pipe for stdout and stderr; a reader thread splits it into
//! lines which are logged as they arrive. The main thread selects over those
//! lines and the cancellation channel, so a signal is acted on immediately
//! even while the simulator is silent.

use crate::cancel::CancelSignal;
use crate::env::ExecutionEnvironment;
use crate::error::{Result, RunError};
use crate::session::{LiveProcess, Session};
use crossbeam_channel::{select, Receiver, Sender};
use hdlrun_backends::{CommandSequence, SimCommand};
use std::io::{self, BufRead, BufReader, PipeReader};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Target for forwarded simulator output
pub const SIM_OUTPUT_TARGET: &str = "hdlrun::sim";

/// Poll interval while waiting for a child that closed its output
const REAP_POLL: Duration = Duration::from_millis(20);
/// Upper bound on waiting for a child after SIGKILL
const KILL_WAIT: Duration = Duration::from_secs(2);

/// Execute `commands` in `cwd` with exactly the variables in `env`.
///
/// A non-zero exit status is logged and the sequence continues; the test
/// report decides the outcome. A cancellation signal stops everything and
/// returns [`RunError::Cancelled`] after the previous signal handlers have
/// been restored.
pub fn execute(
    session: &Session,
    commands: &CommandSequence,
    env: &ExecutionEnvironment,
    cwd: &Path,
) -> Result<()> {
    let _entered = session.span().enter();

    for command in commands {
        if let Some(signal) = session.pending_signal() {
            return Err(cancel(session, signal, None));
        }
        info!("Running command: {}", command);
        run_command(session, command, env, cwd)?;
    }

    // A signal racing the last exit still cancels the run
    if let Some(signal) = session.pending_signal() {
        return Err(cancel(session, signal, None));
    }
    Ok(())
}

fn run_command(
    session: &Session,
    command: &SimCommand,
    env: &ExecutionEnvironment,
    cwd: &Path,
) -> Result<()> {
    let (reader, writer) = io::pipe()?;

    let mut process = Command::new(&command.program);
    process
        .args(&command.args)
        .current_dir(cwd)
        .env_clear()
        .envs(env.iter())
        .stdin(Stdio::null())
        .stdout(writer.try_clone()?)
        .stderr(writer);
    own_process_group(&mut process);

    let child = process.spawn().map_err(|source| RunError::Spawn {
        program: command.program.clone(),
        source,
    })?;
    // Our copies of the write end must go, or the reader never sees EOF
    drop(process);

    let pid = child.id();
    debug!("Started {} as pid {}", command.program, pid);
    session.live().attach(child);

    let (line_tx, lines) = crossbeam_channel::unbounded();
    let pump = thread::Builder::new()
        .name(format!("hdlrun-output-{}", pid))
        .spawn(move || pump_lines(reader, line_tx));
    stop_on_error(session.live(), session.kill_grace(), pump)?;

    let never = crossbeam_channel::never();
    let mut signals_open = true;

    // Forward output until the child closes it
    loop {
        let signals = if signals_open { session.signals() } else { &never };
        select! {
            recv(lines) -> line => match line {
                Ok(line) => log_line(&line),
                Err(_) => break,
            },
            recv(signals) -> signal => match signal {
                Ok(signal) => return Err(cancel(session, signal, Some(&lines))),
                Err(_) => signals_open = false,
            },
        }
    }

    let status = loop {
        if let Some(status) = session.live().try_reap()? {
            break status;
        }
        let signals = if signals_open { session.signals() } else { &never };
        select! {
            recv(signals) -> signal => match signal {
                Ok(signal) => return Err(cancel(session, signal, None)),
                Err(_) => signals_open = false,
            },
            default(REAP_POLL) => {}
        }
    };

    report_exit(command, status);
    Ok(())
}

/// Nobody supervises the attached child once setup fails, so kill it before
/// handing the error back
fn stop_on_error<T>(live: &LiveProcess, grace: Duration, result: io::Result<T>) -> Result<T> {
    result.map_err(|e| {
        if let Some(child) = live.take() {
            error!("Stopping pid {} after setup failure: {}", child.id(), e);
            terminate(child, grace);
        }
        RunError::Io(e)
    })
}

fn report_exit(command: &SimCommand, status: ExitStatus) {
    if status.success() {
        debug!("{} finished", command.program);
    } else {
        match status.code() {
            Some(code) => error!("Command terminated with error {}: {}", code, command.program),
            None => error!("Command terminated by {}: {}", status, command.program),
        }
    }
}

fn log_line(line: &str) {
    if !line.is_empty() {
        info!(target: SIM_OUTPUT_TARGET, "{}", line);
    }
}

/// Split the combined output into lines, tolerating invalid UTF-8
fn pump_lines(reader: PipeReader, lines: Sender<String>) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).trim_end().to_string();
                if lines.send(line).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("Lost simulator output: {}", e);
                break;
            }
        }
    }
}

/// Kill the live child (if any), restore the signal handlers and build the
/// error that ends the run
fn cancel(session: &Session, signal: CancelSignal, lines: Option<&Receiver<String>>) -> RunError {
    warn!("Received {}, stopping simulation", signal);
    let drain = |lines: Option<&Receiver<String>>| {
        if let Some(lines) = lines {
            for line in lines.try_iter() {
                log_line(&line);
            }
        }
    };

    drain(lines);
    let child = session.live().take();
    let pid = child.as_ref().map(Child::id);
    if let Some(child) = child {
        terminate(child, session.kill_grace());
    }
    drain(lines);

    session.restore_signals();
    RunError::Cancelled { pid, signal }
}

/// SIGTERM, a grace period, then SIGKILL with a bounded wait
fn terminate(mut child: Child, grace: Duration) {
    let pid = child.id();
    info!("Terminating pid {}", pid);
    signal_group(&child, Escalation::Terminate);
    if wait_bounded(&mut child, grace).is_some() {
        return;
    }

    warn!("pid {} still running after {:?}, killing", pid, grace);
    signal_group(&child, Escalation::Kill);
    if let Err(e) = child.kill() {
        debug!("kill({}) failed: {}", pid, e);
    }
    if wait_bounded(&mut child, KILL_WAIT).is_none() {
        error!("pid {} did not exit after SIGKILL, leaving it behind", pid);
    }
}

fn wait_bounded(child: &mut Child, timeout: Duration) -> Option<ExitStatus> {
    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Some(status),
            Ok(None) if Instant::now() < deadline => thread::sleep(REAP_POLL),
            Ok(None) => return None,
            Err(e) => {
                error!("Waiting for pid {} failed: {}", child.id(), e);
                return None;
            }
        }
    }
}

#[derive(Clone, Copy)]
enum Escalation {
    Terminate,
    Kill,
}

/// Children lead their own process group so vendor tools that fork helpers
/// are stopped as a whole
#[cfg(unix)]
fn own_process_group(command: &mut Command) {
    use std::os::unix::process::CommandExt;
    command.process_group(0);
}

#[cfg(not(unix))]
fn own_process_group(_command: &mut Command) {}

#[cfg(unix)]
fn signal_group(child: &Child, escalation: Escalation) {
    let signum = match escalation {
        Escalation::Terminate => libc::SIGTERM,
        Escalation::Kill => libc::SIGKILL,
    };
    let Ok(pgid) = libc::pid_t::try_from(child.id()) else {
        return;
    };
    // SAFETY: kill(2) has no memory-safety preconditions
    let rc = unsafe { libc::kill(-pgid, signum) };
    if rc != 0 {
        debug!(
            "Signalling process group {} failed: {}",
            pgid,
            io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn signal_group(child: &Child, _escalation: Escalation) {
    // No process groups: the caller's Child::kill does the work
    let _ = child;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pump_lines_splits_and_trims() {
        let (reader, mut writer) = io::pipe().unwrap();
        let (tx, rx) = crossbeam_channel::unbounded();
        let pump = thread::spawn(move || pump_lines(reader, tx));

        use std::io::Write;
        writer.write_all(b"first  \r\n\nsecond\nno newline").unwrap();
        drop(writer);
        pump.join().unwrap();

        let lines: Vec<String> = rx.try_iter().collect();
        assert_eq!(lines, ["first", "", "second", "no newline"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_setup_failure_stops_attached_child() {
        let mut command = Command::new("sleep");
        command.arg("30");
        own_process_group(&mut command);
        let child = command.spawn().unwrap();
        let pid = child.id();

        let live = LiveProcess::default();
        live.attach(child);
        let failed: io::Result<()> = Err(io::Error::other("no threads left"));
        let err = stop_on_error(&live, Duration::from_millis(500), failed).unwrap_err();

        assert!(matches!(err, RunError::Io(_)));
        assert!(!live.is_active());
        // SAFETY: signal 0 only checks for existence
        let rc = unsafe { libc::kill(pid as libc::pid_t, 0) };
        assert_eq!(rc, -1);
        assert_eq!(io::Error::last_os_error().raw_os_error(), Some(libc::ESRCH));
    }

    #[test]
    fn test_setup_success_passes_value_through() {
        let live = LiveProcess::default();
        let value = stop_on_error(&live, Duration::from_millis(10), Ok(7)).unwrap();
        assert_eq!(value, 7);
        assert!(!live.is_active());
    }
}
