//! Termination signal capture.
//!
//! SIGTERM and SIGINT are recorded into a process-wide atomic; the run
//! loop checks it once per iteration and shuts down cooperatively.

use std::io;
use std::sync::atomic::{AtomicI32, Ordering};

static SIGNAL_VAL: AtomicI32 = AtomicI32::new(0);

extern "C" fn handle_termination(signo: libc::c_int) {
    SIGNAL_VAL.store(signo, Ordering::Relaxed);
}

fn install(signo: libc::c_int) -> io::Result<()> {
    // SAFETY: the handler only stores to an atomic, which is
    // async-signal-safe.
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = handle_termination as usize;
        libc::sigemptyset(&mut action.sa_mask);
        action.sa_flags = libc::SA_RESTART;
        if libc::sigaction(signo, &action, std::ptr::null_mut()) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Installs the SIGTERM and SIGINT handlers.
pub fn install_termination_handlers() -> io::Result<()> {
    install(libc::SIGTERM)?;
    install(libc::SIGINT)
}

/// The last termination signal observed, or 0.
pub fn signal_value() -> i32 {
    SIGNAL_VAL.load(Ordering::Relaxed)
}

/// Whether a SIGTERM or SIGINT has arrived since the last reset.
pub fn termination_requested() -> bool {
    matches!(signal_value(), libc::SIGTERM | libc::SIGINT)
}

/// Clears the recorded signal.
pub fn reset() {
    SIGNAL_VAL.store(0, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raised_sigterm_is_observed() {
        reset();
        install_termination_handlers().unwrap();
        assert!(!termination_requested());

        // SAFETY: raising a signal we just installed a handler for.
        unsafe {
            libc::raise(libc::SIGTERM);
        }

        assert!(termination_requested());
        assert_eq!(signal_value(), libc::SIGTERM);
        reset();
    }
}
