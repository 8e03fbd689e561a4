//! Signal handling (§6): a clean-exit set (`SIGINT`, `SIGTERM`, plus the
//! resource-limit signals that default to terminating the process) and two
//! administrative signals (`SIGHUP` reload, `SIGUSR1`/`SIGUSR2`), with
//! `SIGPIPE` ignored so a write to an already-closed control connection
//! never kills the daemon.
//!
//! The loop is single-threaded and cooperative, so signals are not handled
//! asynchronously: `signal_hook::iterator::Signals` collects them on its
//! internal self-pipe and [`SignalHandler::poll`] drains it non-blockingly
//! once per event-loop iteration.

use signal_hook::consts::{SIGHUP, SIGINT, SIGPROF, SIGTERM, SIGUSR1, SIGUSR2, SIGVTALRM, SIGXCPU, SIGXFSZ};
use signal_hook::iterator::Signals;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Clean shutdown: unlink the control socket, remove the pidfile, exit.
    Shutdown,
    /// Reopen the log file (log rotation).
    Reload,
    Usr1,
    Usr2,
}

pub struct SignalHandler {
    signals: Signals,
}

impl SignalHandler {
    pub fn install() -> Result<Self> {
        // SAFETY: sets the disposition once at startup, before the event
        // loop starts reading/writing control sockets.
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_IGN);
        }
        let signals = Signals::new([
            SIGHUP, SIGINT, SIGTERM, SIGUSR1, SIGUSR2, SIGXCPU, SIGXFSZ, SIGVTALRM, SIGPROF,
        ])
        .map_err(std::io::Error::from)?;
        Ok(Self { signals })
    }

    /// Drain pending signals without blocking, returning the most urgent one
    /// seen this call (shutdown signals win over administrative ones).
    pub fn poll(&mut self) -> Option<Signal> {
        let mut result = None;
        for raw in self.signals.pending() {
            let mapped = match raw {
                SIGHUP => Signal::Reload,
                SIGUSR1 => Signal::Usr1,
                SIGUSR2 => Signal::Usr2,
                SIGINT | SIGTERM | SIGXCPU | SIGXFSZ | SIGVTALRM | SIGPROF => Signal::Shutdown,
                _ => continue,
            };
            if mapped == Signal::Shutdown {
                return Some(Signal::Shutdown);
            }
            result.get_or_insert(mapped);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn installs_without_error() {
        assert!(SignalHandler::install().is_ok());
    }

    #[test]
    fn poll_is_empty_with_no_pending_signals() {
        let mut handler = SignalHandler::install().unwrap();
        assert_eq!(handler.poll(), None);
    }
}
