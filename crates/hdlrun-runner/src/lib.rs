//! hdlrun simulation runner
//!
//! Executes the command sequence a backend assembled and decides whether the
//! run passed:
//! - `exec`: spawn commands one at a time and stream their output to tracing
//! - `cancel`: SIGINT/SIGTERM handling that kills the live simulator
//! - `results`: scan the JUnit report for the first failing test case
//! - `runner`: the facade tying backend, environment, execution and report
//!   together

pub mod cancel;
pub mod clean;
pub mod env;
pub mod error;
pub mod exec;
pub mod results;
pub mod runner;
pub mod session;

pub use cancel::{CancelSignal, CancellationController};
pub use clean::clean;
pub use env::{ExecutionEnvironment, RESULTS_FILE_VAR};
pub use error::{Result, RunError};
pub use exec::execute;
pub use results::{collect, RunResult};
pub use runner::{select_simulator, Plan, RunSummary, Runner, SIM_VAR};
pub use session::{LiveProcess, Session, DEFAULT_KILL_GRACE};
