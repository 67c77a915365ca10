//! Key sequence decoder
//!
//! Byte-at-a-time state machine turning raw terminal input into key events:
//!
//! ```text
//! Ground ──ESC──> Escape ──'[' / 'O'──> Sequence ──final byte──> Ground
//!   │               │                      │
//!   │               └─other byte: Alt+key  ├─ESC: abandon, new Escape
//!   │                                      └─too long: Discard ──final byte──> Ground
//!   └─0x80..: Utf8 ──complete scalar──> Ground
//! ```
//!
//! The decoder never blocks. A lone ESC stays pending until either the next
//! byte arrives or the caller decides the escape window has expired and calls
//! [`SequenceDecoder::flush`].

use tracing::trace;

use super::event::{KeyCode, KeyEvent};
use super::modifiers::ModifierSet;
use super::table::KeyTable;

/// Upper bound on buffered sequence bytes
pub const DEFAULT_MAX_SEQUENCE_LEN: usize = 32;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum DecoderState {
    #[default]
    Ground,
    /// ESC received, waiting for the next byte
    Escape,
    /// Inside `ESC [` (CSI) or `ESC O` (SS3)
    Sequence { intro: u8 },
    /// Collecting a multi-byte UTF-8 character
    Utf8 { expected: usize, alt: bool },
    /// Overlong sequence: swallow bytes up to its final byte
    Discard,
}

/// Escape sequence decoder
#[derive(Debug, Clone)]
pub struct SequenceDecoder {
    state: DecoderState,
    buf: Vec<u8>,
    table: KeyTable,
    max_len: usize,
}

impl Default for SequenceDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceDecoder {
    pub fn new() -> Self {
        Self::with_table(KeyTable::ansi(), DEFAULT_MAX_SEQUENCE_LEN)
    }

    pub fn with_table(table: KeyTable, max_len: usize) -> Self {
        Self {
            state: DecoderState::Ground,
            buf: Vec::with_capacity(max_len.min(64)),
            table,
            max_len: max_len.max(1),
        }
    }

    /// Feed a single byte; returns an event once a key is complete
    pub fn feed(&mut self, byte: u8) -> Option<KeyEvent> {
        match self.state {
            DecoderState::Ground => self.ground(byte, ModifierSet::NONE),
            DecoderState::Escape => self.escape(byte),
            DecoderState::Sequence { intro } => self.sequence(intro, byte),
            DecoderState::Utf8 { expected, alt } => self.utf8(byte, expected, alt),
            DecoderState::Discard => self.discard(byte),
        }
    }

    /// Resolve whatever is pending after the escape window expired.
    ///
    /// A lone ESC becomes the Escape key; `ESC [` or `ESC O` with nothing
    /// after them become Alt+`[` / Alt+`O`; anything else half-read is
    /// dropped.
    pub fn flush(&mut self) -> Option<KeyEvent> {
        let event = match self.state {
            DecoderState::Ground => None,
            DecoderState::Escape => Some(KeyEvent::plain(KeyCode::Escape)),
            DecoderState::Sequence { intro } if self.buf.is_empty() => {
                Some(KeyEvent::new(KeyCode::Char(intro as char), ModifierSet::ALT))
            }
            DecoderState::Sequence { .. } | DecoderState::Utf8 { .. } | DecoderState::Discard => {
                trace!(pending = ?self.buf, "dropping incomplete sequence");
                None
            }
        };
        self.reset();
        event
    }

    /// True while a sequence is partially read
    pub fn is_pending(&self) -> bool {
        self.state != DecoderState::Ground
    }

    /// Number of bytes held for the pending sequence
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn max_sequence_len(&self) -> usize {
        self.max_len
    }

    /// Discard any pending state
    pub fn reset(&mut self) {
        self.state = DecoderState::Ground;
        self.buf.clear();
    }

    fn enter_escape(&mut self) {
        self.state = DecoderState::Escape;
        self.buf.clear();
    }

    fn ground(&mut self, byte: u8, extra: ModifierSet) -> Option<KeyEvent> {
        let event = match byte {
            0x1B => {
                self.enter_escape();
                return None;
            }
            0x09 => KeyEvent::new(KeyCode::Tab, extra),
            0x0A | 0x0D => KeyEvent::new(KeyCode::Enter, extra),
            0x7F => KeyEvent::new(KeyCode::Backspace, extra),
            // Ctrl+A..Ctrl+Z
            0x01..=0x1A => KeyEvent::new(
                KeyCode::Char((byte + 0x60) as char),
                ModifierSet::CONTROL | extra,
            ),
            // Ctrl+@, Ctrl+\, Ctrl+], Ctrl+^, Ctrl+_
            0x00 | 0x1C..=0x1F => KeyEvent::new(
                KeyCode::Char((byte + 0x40) as char),
                ModifierSet::CONTROL | extra,
            ),
            0x20..=0x7E => KeyEvent::new(KeyCode::Char(byte as char), extra),
            0x80..=0xFF => return self.start_utf8(byte, extra.contains(ModifierSet::ALT)),
        };
        Some(event)
    }

    fn escape(&mut self, byte: u8) -> Option<KeyEvent> {
        match byte {
            b'[' | b'O' => {
                self.state = DecoderState::Sequence { intro: byte };
                self.buf.clear();
                None
            }
            0x1B => {
                self.reset();
                Some(KeyEvent::new(KeyCode::Escape, ModifierSet::ALT))
            }
            _ => {
                self.reset();
                self.ground(byte, ModifierSet::ALT)
            }
        }
    }

    fn sequence(&mut self, intro: u8, byte: u8) -> Option<KeyEvent> {
        match byte {
            // Parameter and intermediate bytes
            0x20..=0x3F => {
                if self.buf.len() >= self.max_len {
                    trace!(len = self.buf.len(), "sequence exceeds length bound, discarding");
                    self.buf.clear();
                    self.state = DecoderState::Discard;
                } else {
                    self.buf.push(byte);
                }
                None
            }
            // Final byte
            0x40..=0x7E => {
                let event = self.table.lookup(intro, &self.buf, byte);
                if event.is_none() {
                    trace!(
                        intro = %(intro as char),
                        body = %String::from_utf8_lossy(&self.buf),
                        final_byte = %(byte as char),
                        "absorbing unrecognized sequence"
                    );
                }
                self.reset();
                event
            }
            0x1B => {
                trace!("sequence interrupted by ESC");
                self.enter_escape();
                None
            }
            _ => {
                trace!(byte, "malformed sequence byte, discarding");
                self.reset();
                None
            }
        }
    }

    fn discard(&mut self, byte: u8) -> Option<KeyEvent> {
        match byte {
            0x20..=0x3F => {}
            0x1B => self.enter_escape(),
            _ => self.reset(),
        }
        None
    }

    fn start_utf8(&mut self, lead: u8, alt: bool) -> Option<KeyEvent> {
        let expected = match lead {
            0xC2..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF4 => 4,
            _ => {
                trace!(lead, "invalid UTF-8 lead byte");
                self.reset();
                return None;
            }
        };
        self.buf.clear();
        self.buf.push(lead);
        self.state = DecoderState::Utf8 { expected, alt };
        None
    }

    fn utf8(&mut self, byte: u8, expected: usize, alt: bool) -> Option<KeyEvent> {
        if byte & 0xC0 != 0x80 {
            // Truncated character: drop it and decode this byte afresh
            trace!(pending = ?self.buf, "truncated UTF-8 sequence");
            self.reset();
            return self.feed(byte);
        }

        self.buf.push(byte);
        if self.buf.len() < expected {
            return None;
        }

        let ch = std::str::from_utf8(&self.buf)
            .ok()
            .and_then(|s| s.chars().next());
        self.reset();

        let modifiers = if alt { ModifierSet::ALT } else { ModifierSet::NONE };
        ch.map(|ch| KeyEvent::new(KeyCode::Char(ch), modifiers))
    }
}
