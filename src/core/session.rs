//! Capture session
//!
//! Combines a raw-mode guard, a byte source and a decoder into a single
//! object with a `read()` that yields key events.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use super::device::{ByteRead, ByteSource, DeviceError, TerminalDevice};
use super::guard::RawModeGuard;
use super::hooks;
use crate::config::{CaptureConfig, ConfigError};
use crate::input::{KeyEvent, SequenceDecoder};

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Input closed")]
    InputClosed,

    #[error("Another read is already in progress on this session")]
    ConcurrentAccess,

    #[error("Interrupted by Ctrl+C")]
    Interrupted,

    #[error("Failed to read input: {0}")]
    Io(#[source] io::Error),
}

pub type Result<T> = std::result::Result<T, CaptureError>;

/// Decoder plus the time of the last byte that left it mid-sequence
struct DecodeState {
    decoder: SequenceDecoder,
    pending_since: Option<Instant>,
}

/// Clears the in-progress flag when a read ends, however it ends
struct ReadInProgress<'a>(&'a AtomicBool);

impl Drop for ReadInProgress<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A terminal held in raw mode, decoding key presses
pub struct CaptureSession<D>
where
    D: TerminalDevice + ByteSource,
{
    device: Arc<D>,
    guard: RawModeGuard<D>,
    decode: Mutex<DecodeState>,
    config: CaptureConfig,
    reading: AtomicBool,
    closed: AtomicBool,
}

impl<D> CaptureSession<D>
where
    D: TerminalDevice + ByteSource,
{
    /// Put `device` into raw mode and start decoding its input
    pub fn open(device: D, config: CaptureConfig) -> Result<Self> {
        config.validate()?;
        let decoder = config.decoder()?;
        if config.restore_on_signal {
            hooks::install()?;
        }

        let device = Arc::new(device);
        let guard = RawModeGuard::acquire(Arc::clone(&device))?;
        device.reset();

        info!(
            device = %guard.device_id(),
            blocking = config.blocking,
            escape_timeout_ms = config.escape_timeout_ms,
            "Capture session opened"
        );

        Ok(Self {
            device,
            guard,
            decode: Mutex::new(DecodeState {
                decoder,
                pending_since: None,
            }),
            config,
            reading: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    /// Next key event.
    ///
    /// In blocking mode this waits until a key is complete and always
    /// returns `Some`. In non-blocking mode `Ok(None)` means no complete
    /// key is available yet. Fails with [`CaptureError::InputClosed`] once
    /// the input ended or the session was closed, and with
    /// [`CaptureError::Interrupted`] on Ctrl+C when
    /// `interrupt_on_ctrl_c` is set (the session is closed first).
    pub fn read(&self) -> Result<Option<KeyEvent>> {
        if self.reading.swap(true, Ordering::AcqRel) {
            return Err(CaptureError::ConcurrentAccess);
        }
        let _in_progress = ReadInProgress(&self.reading);

        match self.read_event()? {
            Some(event) if self.config.interrupt_on_ctrl_c && event.is_interrupt() => {
                debug!("Ctrl+C received, closing capture session");
                if let Err(e) = self.close() {
                    warn!("Suppressed error while closing after interrupt: {}", e);
                }
                Err(CaptureError::Interrupted)
            }
            other => Ok(other),
        }
    }

    fn read_event(&self) -> Result<Option<KeyEvent>> {
        let mut state = self.decode.lock().unwrap_or_else(PoisonError::into_inner);

        loop {
            if self.is_closed() {
                return Err(CaptureError::InputClosed);
            }

            let now = Instant::now();
            let deadline = state
                .pending_since
                .filter(|_| state.decoder.is_pending())
                .map(|since| since + self.config.escape_timeout());

            if let Some(deadline) = deadline {
                if now >= deadline {
                    state.pending_since = None;
                    match state.decoder.flush() {
                        Some(event) => return Ok(Some(event)),
                        None => continue,
                    }
                }
            }

            let wait = match (self.config.blocking, deadline) {
                (false, _) => Some(Duration::ZERO),
                (true, Some(deadline)) => Some(deadline - now),
                (true, None) => None,
            };

            match self.device.next_byte(wait).map_err(CaptureError::Io)? {
                ByteRead::Byte(byte) => {
                    let event = state.decoder.feed(byte);
                    state.pending_since = state.decoder.is_pending().then(Instant::now);
                    if event.is_some() {
                        return Ok(event);
                    }
                }
                ByteRead::Timeout => {
                    let expired = deadline.map_or(false, |d| Instant::now() >= d);
                    if !self.config.blocking && !expired {
                        return Ok(None);
                    }
                }
                ByteRead::Closed => {
                    if !self.closed.swap(true, Ordering::AcqRel) {
                        debug!(device = %self.guard.device_id(), "End of input");
                    }
                    state.decoder.reset();
                    state.pending_since = None;
                    return Err(CaptureError::InputClosed);
                }
            }
        }
    }

    /// Stop capturing and restore the terminal.
    ///
    /// Safe to call from any thread and more than once. A `read()` blocked
    /// on another thread returns [`CaptureError::InputClosed`] promptly.
    pub fn close(&self) -> std::result::Result<(), DeviceError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!(device = %self.guard.device_id(), "Capture session closing");
        }
        self.device.close();
        self.guard.release()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Whether the terminal is still held in raw mode
    pub fn is_raw(&self) -> bool {
        self.guard.is_active()
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn device(&self) -> &D {
        &self.device
    }
}

impl<D> Drop for CaptureSession<D>
where
    D: TerminalDevice + ByteSource,
{
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to restore terminal when dropping capture session: {}", e);
        }
    }
}

/// Run `f` with a capture session open on `device`, closing it afterwards.
///
/// The terminal is restored however `f` ends. When `f` fails and restoring
/// fails as well, the restore error is logged and `f`'s error is returned.
pub fn with_capture<D, T, E, F>(device: D, config: CaptureConfig, f: F) -> std::result::Result<T, E>
where
    D: TerminalDevice + ByteSource,
    F: FnOnce(&CaptureSession<D>) -> std::result::Result<T, E>,
    E: From<CaptureError>,
{
    let session = CaptureSession::open(device, config)?;
    let outcome = f(&session);
    let closed = session.close();

    match (outcome, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(CaptureError::from(e).into()),
        (Err(primary), Ok(())) => Err(primary),
        (Err(primary), Err(secondary)) => {
            warn!("Suppressed terminal restore failure: {}", secondary);
            Err(primary)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::memory::MemoryTerminal;
    use crate::input::{KeyCode, ModifierSet};
    use std::thread;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn open(term: &MemoryTerminal, config: CaptureConfig) -> CaptureSession<MemoryTerminal> {
        CaptureSession::open(term.clone(), config).unwrap()
    }

    #[test]
    fn test_reads_arrow_up() -> anyhow::Result<()> {
        init_tracing();
        let term = MemoryTerminal::new();
        let session = open(&term, CaptureConfig::default());

        term.push(&[0x1B, 0x5B, 0x41]);
        assert_eq!(session.read()?, Some(KeyEvent::plain(KeyCode::Up)));
        assert_eq!(term.pending(), 0);
        Ok(())
    }

    #[test]
    fn test_reads_ctrl_a() -> anyhow::Result<()> {
        let term = MemoryTerminal::new();
        let session = open(&term, CaptureConfig::default());

        term.push(&[0x01]);
        assert_eq!(
            session.read()?,
            Some(KeyEvent::new(KeyCode::Char('a'), ModifierSet::CONTROL))
        );
        Ok(())
    }

    #[test]
    fn test_lone_escape_after_timeout() -> anyhow::Result<()> {
        let term = MemoryTerminal::new();
        let timeout = Duration::from_millis(40);
        let session = open(&term, CaptureConfig::default().with_escape_timeout(timeout));

        term.push(&[0x1B]);
        let started = Instant::now();
        assert_eq!(session.read()?, Some(KeyEvent::plain(KeyCode::Escape)));
        assert!(started.elapsed() >= timeout);
        Ok(())
    }

    #[test]
    fn test_escape_then_key_within_window() -> anyhow::Result<()> {
        let term = MemoryTerminal::new();
        let session = open(
            &term,
            CaptureConfig::default().with_escape_timeout(Duration::from_millis(500)),
        );

        let writer = term.clone();
        let handle = thread::spawn(move || {
            writer.push(&[0x1B]);
            thread::sleep(Duration::from_millis(20));
            writer.push(b"[B");
        });
        assert_eq!(session.read()?, Some(KeyEvent::plain(KeyCode::Down)));
        handle.join().unwrap();
        Ok(())
    }

    #[test]
    fn test_non_blocking() -> anyhow::Result<()> {
        let term = MemoryTerminal::new();
        let timeout = Duration::from_millis(30);
        let session = open(
            &term,
            CaptureConfig::default()
                .with_blocking(false)
                .with_escape_timeout(timeout),
        );

        assert_eq!(session.read()?, None);

        term.push(b"x\x1b");
        assert_eq!(session.read()?, Some(KeyEvent::plain(KeyCode::Char('x'))));
        // ESC is pending until its window has passed in wall-clock time
        assert_eq!(session.read()?, None);
        thread::sleep(timeout + Duration::from_millis(10));
        assert_eq!(session.read()?, Some(KeyEvent::plain(KeyCode::Escape)));
        assert_eq!(session.read()?, None);
        Ok(())
    }

    #[test]
    fn test_second_session_conflicts() -> anyhow::Result<()> {
        let term = MemoryTerminal::new();
        let first = open(&term, CaptureConfig::default());

        let second = CaptureSession::open(term.clone(), CaptureConfig::default());
        assert!(matches!(second, Err(CaptureError::Device(DeviceError::Conflict))));

        // first session unaffected
        assert!(first.is_raw());
        term.push(b"k");
        assert_eq!(first.read()?, Some(KeyEvent::plain(KeyCode::Char('k'))));
        Ok(())
    }

    #[test]
    fn test_close_unblocks_read() {
        let term = MemoryTerminal::new();
        let session = open(&term, CaptureConfig::default());

        let (result, elapsed) = thread::scope(|s| {
            let reader = s.spawn(|| {
                let started = Instant::now();
                (session.read(), started.elapsed())
            });
            thread::sleep(Duration::from_millis(50));
            session.close().unwrap();
            reader.join().unwrap()
        });

        assert!(matches!(result, Err(CaptureError::InputClosed)));
        assert!(elapsed < Duration::from_secs(2));
        assert!(!term.mode().is_raw());
    }

    #[test]
    fn test_byte_source_close_unblocks_read() {
        let term = MemoryTerminal::new();
        let before = term.mode();
        let session = open(&term, CaptureConfig::default());

        let (result, elapsed) = thread::scope(|s| {
            let reader = s.spawn(|| {
                let started = Instant::now();
                (session.read(), started.elapsed())
            });
            thread::sleep(Duration::from_millis(50));
            ByteSource::close(&term);
            reader.join().unwrap()
        });

        assert!(matches!(result, Err(CaptureError::InputClosed)));
        assert!(elapsed < Duration::from_secs(2));
        assert!(session.is_closed());
        assert!(matches!(session.read(), Err(CaptureError::InputClosed)));

        drop(session);
        assert_eq!(term.mode(), before);
    }

    #[test]
    fn test_concurrent_read_rejected() {
        let term = MemoryTerminal::new();
        let session = open(&term, CaptureConfig::default());

        thread::scope(|s| {
            let reader = s.spawn(|| session.read());
            thread::sleep(Duration::from_millis(50));
            assert!(matches!(session.read(), Err(CaptureError::ConcurrentAccess)));

            term.push(b"z");
            let first = reader.join().unwrap();
            assert_eq!(first.unwrap(), Some(KeyEvent::plain(KeyCode::Char('z'))));
        });
    }

    #[test]
    fn test_end_of_input() -> anyhow::Result<()> {
        let term = MemoryTerminal::new();
        let session = open(&term, CaptureConfig::default());

        term.push(b"a\x1b[");
        term.finish();
        assert_eq!(session.read()?, Some(KeyEvent::plain(KeyCode::Char('a'))));
        assert!(matches!(session.read(), Err(CaptureError::InputClosed)));
        assert!(matches!(session.read(), Err(CaptureError::InputClosed)));
        assert!(session.is_closed());
        Ok(())
    }

    #[test]
    fn test_close_and_drop_restore_mode() -> anyhow::Result<()> {
        let term = MemoryTerminal::new();
        let before = term.mode();

        let session = open(&term, CaptureConfig::default());
        assert!(term.mode().is_raw());
        session.close()?;
        assert_eq!(term.mode(), before);
        session.close()?;

        {
            let _session = open(&term, CaptureConfig::default());
            assert!(term.mode().is_raw());
        }
        assert_eq!(term.mode(), before);
        Ok(())
    }

    #[test]
    fn test_reopen_after_close() -> anyhow::Result<()> {
        let term = MemoryTerminal::new();
        drop(open(&term, CaptureConfig::default()));

        let session = open(&term, CaptureConfig::default());
        term.push(b"r");
        assert_eq!(session.read()?, Some(KeyEvent::plain(KeyCode::Char('r'))));
        Ok(())
    }

    #[test]
    fn test_ctrl_c_interrupts() {
        let term = MemoryTerminal::new();
        let before = term.mode();
        let session = open(&term, CaptureConfig::default());

        term.push(b"\x03x");
        assert!(matches!(session.read(), Err(CaptureError::Interrupted)));
        assert_eq!(term.mode(), before);
        assert!(matches!(session.read(), Err(CaptureError::InputClosed)));
    }

    #[test]
    fn test_ctrl_c_as_key() -> anyhow::Result<()> {
        let term = MemoryTerminal::new();
        let session = open(&term, CaptureConfig::default().with_interrupt_on_ctrl_c(false));

        term.push(b"\x03");
        assert_eq!(
            session.read()?,
            Some(KeyEvent::new(KeyCode::Char('c'), ModifierSet::CONTROL))
        );
        assert!(term.mode().is_raw());
        Ok(())
    }

    #[test]
    fn test_open_errors() {
        let result = CaptureSession::open(MemoryTerminal::non_interactive(), CaptureConfig::default());
        assert!(matches!(result, Err(CaptureError::Device(DeviceError::NotInteractive))));

        let config = CaptureConfig::default().with_key("[25~", "Nope");
        let term = MemoryTerminal::new();
        let result = CaptureSession::open(term.clone(), config);
        assert!(matches!(result, Err(CaptureError::Config(ConfigError::UnknownKey(_)))));
        assert!(term.mode_changes().is_empty());
    }

    #[test]
    fn test_with_capture_restores_on_error() {
        let term = MemoryTerminal::new();
        let before = term.mode();

        let result: std::result::Result<(), CaptureError> =
            with_capture(term.clone(), CaptureConfig::default(), |session| {
                assert!(session.is_raw());
                Err(CaptureError::InputClosed)
            });

        assert!(matches!(result, Err(CaptureError::InputClosed)));
        assert_eq!(term.mode(), before);
    }

    #[test]
    fn test_with_capture_keeps_primary_error() {
        let term = MemoryTerminal::new();
        let handle = term.clone();

        let result: anyhow::Result<()> = with_capture(term.clone(), CaptureConfig::default(), |_| {
            handle.fail_next_sets(1);
            Err(anyhow::anyhow!("primary failure"))
        });

        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "primary failure");
        assert!(!crate::core::guard::is_device_captured(term.device_id()));
    }

    #[test]
    fn test_with_capture_reports_restore_failure() {
        let term = MemoryTerminal::new();
        let handle = term.clone();

        let result = with_capture(term, CaptureConfig::default(), |session| {
            handle.push(b"q");
            let event = session.read()?;
            handle.fail_next_sets(1);
            Ok::<_, CaptureError>(event)
        });

        assert!(matches!(result, Err(CaptureError::Device(DeviceError::Set(_)))));
    }

    #[test]
    fn test_with_capture_restores_on_panic() {
        let term = MemoryTerminal::new();
        let before = term.mode();
        let device = term.clone();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _: std::result::Result<(), CaptureError> =
                with_capture(device, CaptureConfig::default(), |_| panic!("reader crashed"));
        }));

        assert!(result.is_err());
        assert_eq!(term.mode(), before);
    }
}
