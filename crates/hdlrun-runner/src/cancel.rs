//! Cancellation controller
//!
//! Turns SIGINT/SIGTERM into a message on a channel. The signal handler only
//! writes one byte into a self-pipe; a watcher thread reads it and forwards a
//! [`CancelSignal`] to whoever is selecting on [`CancellationController::signals`].
//!
//! Only the first signal after installation is forwarded. Later signals are
//! swallowed until the previous handlers are restored, so a burst of Ctrl-C
//! presses yields exactly one cancellation.
//!
//! At most one controller can be installed per process at a time.

use crate::error::{Result, RunError};
use crossbeam_channel::{Receiver, Sender};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Signals that cancel a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelSignal {
    Interrupt,
    Terminate,
}

impl CancelSignal {
    #[cfg(unix)]
    pub fn as_raw(self) -> libc::c_int {
        match self {
            CancelSignal::Interrupt => libc::SIGINT,
            CancelSignal::Terminate => libc::SIGTERM,
        }
    }

    #[cfg(unix)]
    pub fn from_raw(signum: libc::c_int) -> Option<Self> {
        match signum {
            libc::SIGINT => Some(CancelSignal::Interrupt),
            libc::SIGTERM => Some(CancelSignal::Terminate),
            _ => None,
        }
    }
}

impl fmt::Display for CancelSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelSignal::Interrupt => f.write_str("SIGINT"),
            CancelSignal::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// Owns the installed signal handlers and the snapshot of the previous ones
pub struct CancellationController {
    receiver: Receiver<CancelSignal>,
    guard: Mutex<Option<imp::HandlerGuard>>,
}

impl CancellationController {
    /// Install handlers for SIGINT and SIGTERM, remembering the current ones
    pub fn install() -> Result<Self> {
        if INSTALLED
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(RunError::SignalSetup(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "another cancellation controller is active",
            )));
        }

        let (sender, receiver) = crossbeam_channel::unbounded();
        match imp::HandlerGuard::install(sender) {
            Ok(guard) => Ok(Self {
                receiver,
                guard: Mutex::new(Some(guard)),
            }),
            Err(e) => {
                INSTALLED.store(false, Ordering::SeqCst);
                Err(RunError::SignalSetup(e))
            }
        }
    }

    /// Channel carrying the (single) forwarded cancellation signal
    pub fn signals(&self) -> &Receiver<CancelSignal> {
        &self.receiver
    }

    /// Non-blocking check for a cancellation that arrived between commands
    pub fn pending(&self) -> Option<CancelSignal> {
        self.receiver.try_recv().ok()
    }

    pub fn is_installed(&self) -> bool {
        self.guard
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Put the previous handlers back. Safe to call more than once.
    pub fn restore(&self) {
        let guard = self
            .guard
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(guard) = guard {
            guard.restore();
            INSTALLED.store(false, Ordering::SeqCst);
            tracing::debug!("Restored previous signal handlers");
        }
    }
}

impl Drop for CancellationController {
    fn drop(&mut self) {
        self.restore();
    }
}

#[cfg(unix)]
mod imp {
    use super::{CancelSignal, Sender};
    use std::io::{self, PipeReader, PipeWriter, Read};
    use std::os::fd::AsRawFd;
    use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
    use std::thread::{self, JoinHandle};
    use tracing::debug;

    /// Set by the first handled signal, cleared on install
    static TRIGGERED: AtomicBool = AtomicBool::new(false);
    /// Write end of the self-pipe, -1 when nothing is installed
    static WAKE_FD: AtomicI32 = AtomicI32::new(-1);

    const HANDLED: [libc::c_int; 2] = [libc::SIGINT, libc::SIGTERM];

    extern "C" fn on_signal(signum: libc::c_int) {
        if TRIGGERED.swap(true, Ordering::SeqCst) {
            return;
        }
        let fd = WAKE_FD.load(Ordering::SeqCst);
        if fd >= 0 {
            let byte = signum as u8;
            // SAFETY: write(2) is async-signal-safe and `byte` outlives the call
            unsafe {
                libc::write(fd, (&byte as *const u8).cast(), 1);
            }
        }
    }

    pub(super) struct HandlerGuard {
        previous: Vec<(libc::c_int, libc::sigaction)>,
        writer: Option<PipeWriter>,
        watcher: Option<JoinHandle<()>>,
    }

    impl HandlerGuard {
        pub(super) fn install(sender: Sender<CancelSignal>) -> io::Result<Self> {
            let (reader, writer) = io::pipe()?;
            TRIGGERED.store(false, Ordering::SeqCst);
            WAKE_FD.store(writer.as_raw_fd(), Ordering::SeqCst);

            let watcher = thread::Builder::new()
                .name("hdlrun-signals".to_string())
                .spawn(move || forward_signals(reader, sender))?;

            let mut guard = Self {
                previous: Vec::with_capacity(HANDLED.len()),
                writer: Some(writer),
                watcher: Some(watcher),
            };
            for signum in HANDLED {
                match set_handler(signum) {
                    Ok(old) => guard.previous.push((signum, old)),
                    Err(e) => {
                        guard.restore();
                        return Err(e);
                    }
                }
            }
            Ok(guard)
        }

        pub(super) fn restore(mut self) {
            for (signum, old) in self.previous.drain(..) {
                // SAFETY: `old` was filled in by a successful sigaction call
                let rc = unsafe { libc::sigaction(signum, &old, std::ptr::null_mut()) };
                if rc != 0 {
                    tracing::error!(
                        "Failed to restore handler for signal {}: {}",
                        signum,
                        io::Error::last_os_error()
                    );
                }
            }
            WAKE_FD.store(-1, Ordering::SeqCst);
            // Closing the write end lets the watcher see EOF
            self.writer.take();
            if let Some(watcher) = self.watcher.take() {
                let _ = watcher.join();
            }
        }
    }

    fn set_handler(signum: libc::c_int) -> io::Result<libc::sigaction> {
        // SAFETY: both structs are plain data, zeroed is a valid starting
        // state, and the handler only touches atomics and write(2)
        unsafe {
            let mut action: libc::sigaction = std::mem::zeroed();
            action.sa_sigaction = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
            action.sa_flags = libc::SA_RESTART;
            libc::sigemptyset(&mut action.sa_mask);

            let mut old: libc::sigaction = std::mem::zeroed();
            if libc::sigaction(signum, &action, &mut old) != 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(old)
        }
    }

    fn forward_signals(mut reader: PipeReader, sender: Sender<CancelSignal>) {
        let mut byte = [0u8; 1];
        loop {
            match reader.read(&mut byte) {
                Ok(0) => break,
                Ok(_) => {
                    if let Some(signal) = CancelSignal::from_raw(byte[0] as libc::c_int) {
                        debug!("Caught {}", signal);
                        if sender.send(signal).is_err() {
                            break;
                        }
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
    }
}

#[cfg(not(unix))]
mod imp {
    use super::{CancelSignal, Sender};
    use std::io;

    /// No signal support: the channel stays open and never fires
    pub(super) struct HandlerGuard {
        _sender: Sender<CancelSignal>,
    }

    impl HandlerGuard {
        pub(super) fn install(sender: Sender<CancelSignal>) -> io::Result<Self> {
            Ok(Self { _sender: sender })
        }

        pub(super) fn restore(self) {}
    }
}
