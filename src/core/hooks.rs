//! Process-wide restore hooks
//!
//! Guards restore the terminal when they drop, which covers returns and
//! unwinding panics. A process killed by a signal, or built with
//! `panic = "abort"`, never drops them. [`install`] closes that gap:
//!
//! - SIGINT, SIGTERM and SIGHUP (through `ctrlc`) restore every captured
//!   terminal and exit with [`SIGNAL_EXIT_CODE`]
//! - a chained panic hook restores every captured terminal before the
//!   previous hook prints the panic
//!
//! Installation is opt-in (`restore_on_signal` in the config) because it
//! takes over the process's signal disposition.

use std::panic;
use std::sync::{Mutex, PoisonError};

use tracing::warn;

use super::device::{DeviceError, Result};
use super::guard::restore_all;

/// Exit status after a terminating signal
pub const SIGNAL_EXIT_CODE: i32 = 130;

static INSTALLED: Mutex<bool> = Mutex::new(false);

/// Install the signal handler and panic hook. Later calls do nothing.
///
/// Fails with [`DeviceError::SignalHandler`] when another signal handler
/// was already set through `ctrlc`.
pub fn install() -> Result<()> {
    let mut installed = INSTALLED.lock().unwrap_or_else(PoisonError::into_inner);
    if *installed {
        return Ok(());
    }

    ctrlc::set_handler(|| {
        let restored = restore_all();
        warn!(restored, "Terminating on signal");
        std::process::exit(SIGNAL_EXIT_CODE);
    })
    .map_err(DeviceError::SignalHandler)?;

    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        restore_all();
        previous(info);
    }));

    *installed = true;
    Ok(())
}

/// Whether [`install`] has run successfully in this process
pub fn is_installed() -> bool {
    *INSTALLED.lock().unwrap_or_else(PoisonError::into_inner)
}
