//! terminable - Raw-mode keyboard capture for terminals
//!
//! terminable puts a terminal into raw mode, decodes the bytes it sends into
//! key events, and puts the terminal back the way it was on every exit path.
//!
//! # Features
//!
//! - **Raw Mode Guard**: saved terminal mode restored on close, drop and unwind
//! - **Restore Hooks**: opt-in restore on SIGINT / SIGTERM / SIGHUP and panics
//! - **Key Decoding**: CSI / SS3 escape sequences, xterm modifiers, UTF-8, Alt+key
//! - **Escape Timeout**: a lone ESC becomes the Escape key after a short window
//! - **Blocking or Polling** reads, cancellable from another thread
//! - **TOML Config**: timeouts and extra key sequences
//!
//! # Quick Start
//!
//! ```no_run
//! # #[cfg(unix)]
//! # fn main() -> Result<(), terminable::CaptureError> {
//! let session = terminable::capture()?;
//! while let Some(key) = session.read()? {
//!     println!("{}\r", key);
//! }
//! # Ok(())
//! # }
//! # #[cfg(not(unix))]
//! # fn main() {}
//! ```
//!
//! Pressing Ctrl+C closes the session and `read()` fails with
//! [`CaptureError::Interrupted`] unless `interrupt_on_ctrl_c` is turned off.

pub mod config;
pub mod core;
pub mod input;

pub use crate::config::{CaptureConfig, ConfigError};
pub use crate::core::device::{ByteRead, ByteSource, DeviceError, DeviceId, TerminalDevice};
pub use crate::core::guard::{restore_all, RawModeGuard};
pub use crate::core::memory::{MemoryMode, MemoryTerminal};
pub use crate::core::session::{with_capture, CaptureError, CaptureSession};
#[cfg(unix)]
pub use crate::core::tty::{TerminalMode, Tty};
pub use crate::input::{KeyCode, KeyEvent, KeyTable, ModifierSet, SequenceDecoder};

/// Capture standard input with the config from [`CaptureConfig::load`]
#[cfg(unix)]
pub fn capture() -> Result<CaptureSession<Tty>, CaptureError> {
    capture_with(CaptureConfig::load())
}

/// Capture standard input with `config`
#[cfg(unix)]
pub fn capture_with(config: CaptureConfig) -> Result<CaptureSession<Tty>, CaptureError> {
    let tty = Tty::stdin()?;
    CaptureSession::open(tty, config)
}
