//! Orchestration session
//!
//! Everything one run shares between the execution engine and the
//! cancellation path: the tracing span, the live child process and the
//! installed signal handlers.

use crate::cancel::{CancelSignal, CancellationController};
use crate::error::Result;
use crossbeam_channel::Receiver;
use std::io;
use std::process::{Child, ExitStatus};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::Span;

/// Time a child gets to exit after SIGTERM before it is killed outright
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(5);

/// The child process currently running, if any.
///
/// All access goes through this lock: the engine attaches and reaps, the
/// cancellation path takes the child out to kill it.
#[derive(Debug, Default)]
pub struct LiveProcess {
    slot: Mutex<Option<Child>>,
}

impl LiveProcess {
    fn lock(&self) -> MutexGuard<'_, Option<Child>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn attach(&self, child: Child) {
        let previous = self.lock().replace(child);
        debug_assert!(previous.is_none(), "a child process was still attached");
    }

    /// Process id of the live child
    pub fn pid(&self) -> Option<u32> {
        self.lock().as_ref().map(Child::id)
    }

    pub fn is_active(&self) -> bool {
        self.lock().is_some()
    }

    /// Reap the child if it has exited, clearing the slot
    pub(crate) fn try_reap(&self) -> io::Result<Option<ExitStatus>> {
        let mut slot = self.lock();
        let status = match slot.as_mut() {
            Some(child) => child.try_wait()?,
            None => return Ok(None),
        };
        if status.is_some() {
            slot.take();
        }
        Ok(status)
    }

    /// Detach the child so the caller can kill it
    pub(crate) fn take(&self) -> Option<Child> {
        self.lock().take()
    }
}

/// State owned by one orchestration run
pub struct Session {
    span: Span,
    live: LiveProcess,
    controller: CancellationController,
    kill_grace: Duration,
}

impl Session {
    /// Install signal handlers and open a session logging under `span`
    pub fn install(span: Span) -> Result<Self> {
        Ok(Self {
            span,
            live: LiveProcess::default(),
            controller: CancellationController::install()?,
            kill_grace: DEFAULT_KILL_GRACE,
        })
    }

    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn live(&self) -> &LiveProcess {
        &self.live
    }

    pub fn kill_grace(&self) -> Duration {
        self.kill_grace
    }

    pub fn signals(&self) -> &Receiver<CancelSignal> {
        self.controller.signals()
    }

    pub fn pending_signal(&self) -> Option<CancelSignal> {
        self.controller.pending()
    }

    /// Put back the signal handlers that were active before the session
    pub fn restore_signals(&self) {
        self.controller.restore();
    }

    pub fn handlers_installed(&self) -> bool {
        self.controller.is_installed()
    }
}
