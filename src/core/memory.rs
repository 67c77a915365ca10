//! In-process terminal
//!
//! `MemoryTerminal` behaves like a terminal device without touching one:
//! input is pushed from code, the mode is a plain value, and failures can be
//! injected. Clones share the same state and device identity.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::device::{ByteRead, ByteSource, DeviceError, DeviceId, Result, TerminalDevice};

/// Device numbers for memory terminals live in their own namespace
const MEMORY_DEV: u64 = u64::MAX;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Line discipline flags of a memory terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryMode {
    pub canonical: bool,
    pub echo: bool,
    pub signals: bool,
}

impl Default for MemoryMode {
    fn default() -> Self {
        Self {
            canonical: true,
            echo: true,
            signals: true,
        }
    }
}

impl MemoryMode {
    pub fn is_raw(&self) -> bool {
        !self.canonical && !self.echo && !self.signals
    }
}

#[derive(Default)]
struct State {
    mode: MemoryMode,
    mode_changes: Vec<MemoryMode>,
    input: VecDeque<u8>,
    eof: bool,
    closed: bool,
    fail_query: bool,
    failing_sets: usize,
}

struct Shared {
    state: Mutex<State>,
    readable: Condvar,
}

/// Scripted terminal for tests and embedding
#[derive(Clone)]
pub struct MemoryTerminal {
    id: DeviceId,
    interactive: bool,
    shared: Arc<Shared>,
}

impl Default for MemoryTerminal {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTerminal {
    /// Interactive terminal in cooked mode
    pub fn new() -> Self {
        Self::with_mode(MemoryMode::default())
    }

    pub fn with_mode(mode: MemoryMode) -> Self {
        Self {
            id: DeviceId::new(MEMORY_DEV, NEXT_ID.fetch_add(1, Ordering::Relaxed)),
            interactive: true,
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    mode,
                    ..State::default()
                }),
                readable: Condvar::new(),
            }),
        }
    }

    /// A device that is not a terminal (e.g. redirected input)
    pub fn non_interactive() -> Self {
        Self {
            interactive: false,
            ..Self::new()
        }
    }

    /// Queue input bytes
    pub fn push(&self, bytes: &[u8]) {
        self.lock().input.extend(bytes);
        self.shared.readable.notify_all();
    }

    /// Mark end of input; queued bytes are still delivered
    pub fn finish(&self) {
        self.lock().eof = true;
        self.shared.readable.notify_all();
    }

    pub fn mode(&self) -> MemoryMode {
        self.lock().mode
    }

    /// Every mode applied so far, oldest first
    pub fn mode_changes(&self) -> Vec<MemoryMode> {
        self.lock().mode_changes.clone()
    }

    /// Bytes not yet read
    pub fn pending(&self) -> usize {
        self.lock().input.len()
    }

    pub fn fail_query(&self, fail: bool) {
        self.lock().fail_query = fail;
    }

    /// Make the next `count` mode changes fail
    pub fn fail_next_sets(&self, count: usize) {
        self.lock().failing_sets = count;
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl TerminalDevice for MemoryTerminal {
    type Mode = MemoryMode;

    fn device_id(&self) -> DeviceId {
        self.id
    }

    fn is_interactive(&self) -> bool {
        self.interactive
    }

    fn query_mode(&self) -> Result<MemoryMode> {
        let state = self.lock();
        if state.fail_query {
            return Err(DeviceError::Query(io::Error::new(
                io::ErrorKind::Other,
                "injected query failure",
            )));
        }
        Ok(state.mode)
    }

    fn set_mode(&self, mode: &MemoryMode) -> Result<()> {
        let mut state = self.lock();
        if state.failing_sets > 0 {
            state.failing_sets -= 1;
            return Err(DeviceError::Set(io::Error::new(
                io::ErrorKind::Other,
                "injected set failure",
            )));
        }
        state.mode = *mode;
        state.mode_changes.push(*mode);
        Ok(())
    }

    fn raw_mode(&self, _mode: &MemoryMode) -> MemoryMode {
        MemoryMode {
            canonical: false,
            echo: false,
            signals: false,
        }
    }
}

impl ByteSource for MemoryTerminal {
    fn next_byte(&self, timeout: Option<Duration>) -> io::Result<ByteRead> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.lock();
        loop {
            if state.closed {
                return Ok(ByteRead::Closed);
            }
            if let Some(byte) = state.input.pop_front() {
                return Ok(ByteRead::Byte(byte));
            }
            if state.eof {
                return Ok(ByteRead::Closed);
            }

            state = match deadline {
                None => self
                    .shared
                    .readable
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(ByteRead::Timeout);
                    }
                    self.shared
                        .readable
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }

    fn close(&self) {
        self.lock().closed = true;
        self.shared.readable.notify_all();
    }

    fn reset(&self) {
        self.lock().closed = false;
    }
}
