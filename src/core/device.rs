//! Terminal device and byte source abstractions
//!
//! A capture session talks to the outside world through two traits:
//! [`TerminalDevice`] for mode switching and [`ByteSource`] for input.
//! [`Tty`](super::tty::Tty) implements both over a real terminal and
//! [`MemoryTerminal`](super::memory::MemoryTerminal) over an in-process buffer.

use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Device is not an interactive terminal")]
    NotInteractive,

    #[error("Terminal is already in raw mode for another capture")]
    Conflict,

    #[error("Failed to open terminal device: {0}")]
    Open(#[source] io::Error),

    #[error("Failed to query terminal mode: {0}")]
    Query(#[source] io::Error),

    #[error("Failed to set terminal mode: {0}")]
    Set(#[source] io::Error),

    #[error("Failed to install signal handler: {0}")]
    SignalHandler(#[source] ctrlc::Error),
}

pub type Result<T> = std::result::Result<T, DeviceError>;

/// Identity of a terminal device, used to keep one raw-mode guard per device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId {
    pub dev: u64,
    pub ino: u64,
}

impl DeviceId {
    pub const fn new(dev: u64, ino: u64) -> Self {
        Self { dev, ino }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}:{}", self.dev, self.ino)
    }
}

/// Mode control for a terminal
pub trait TerminalDevice: Send + Sync + 'static {
    /// Snapshot of the terminal's mode settings
    type Mode: Clone + Send + Sync + 'static;

    fn device_id(&self) -> DeviceId;

    /// Whether the device is attached to an interactive terminal
    fn is_interactive(&self) -> bool;

    fn query_mode(&self) -> Result<Self::Mode>;

    fn set_mode(&self, mode: &Self::Mode) -> Result<()>;

    /// Raw-mode variant of `mode`: no line buffering, no echo, no
    /// signal-generating control characters
    fn raw_mode(&self, mode: &Self::Mode) -> Self::Mode;
}

/// Result of waiting for one input byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRead {
    Byte(u8),
    /// No byte arrived within the timeout
    Timeout,
    /// End of stream, or the source was closed
    Closed,
}

/// Source of raw input bytes
pub trait ByteSource: Send + Sync {
    /// Wait for the next byte. `None` waits indefinitely,
    /// `Some(Duration::ZERO)` polls.
    fn next_byte(&self, timeout: Option<Duration>) -> io::Result<ByteRead>;

    /// Close the source from any thread; a blocked `next_byte` returns
    /// `Closed` promptly and later calls keep returning it
    fn close(&self);

    /// Re-arm a closed source for a new session
    fn reset(&self) {}
}
