//! Terminal side of a capture.
//!
//! - **device**: `TerminalDevice` / `ByteSource` traits and `DeviceError`
//! - **guard**: `RawModeGuard`, scoped raw mode with one live guard per device
//! - **hooks**: opt-in signal and panic hooks restoring captured terminals
//! - **tty**: termios-backed terminal (Unix)
//! - **memory**: in-process terminal for tests and embedding
//! - **session**: `CaptureSession` combining guard, byte source and decoder
//!
//! # Architecture
//!
//! ```text
//! CaptureSession
//! ├── RawModeGuard (saved mode, restored on close / drop)
//! ├── ByteSource   (Tty or MemoryTerminal)
//! └── SequenceDecoder
//! ```

pub mod device;
pub mod guard;
pub mod hooks;
pub mod memory;
pub mod session;
#[cfg(unix)]
pub mod tty;
