//! Escape sequence lookup table
//!
//! Maps the signature of a CSI (`ESC [`) or SS3 (`ESC O`) sequence to a key.
//! A signature is the introducer byte, the key parameter (only for `~`
//! terminated sequences) and the final byte, so `ESC [ 5 ; 3 ~` and
//! `ESC [ 5 ~` both resolve through `[5~`. The modifier parameter is decoded
//! separately.

use std::collections::{BTreeMap, HashMap};

use super::event::{KeyCode, KeyEvent};
use super::modifiers::ModifierSet;
use crate::config::ConfigError;

/// ANSI / VT100 / VT220 / xterm defaults
static DEFAULT_KEYS: &[(&[u8], KeyCode)] = &[
    // Cursor keys (normal and application mode)
    (b"[A", KeyCode::Up),
    (b"[B", KeyCode::Down),
    (b"[C", KeyCode::Right),
    (b"[D", KeyCode::Left),
    (b"OA", KeyCode::Up),
    (b"OB", KeyCode::Down),
    (b"OC", KeyCode::Right),
    (b"OD", KeyCode::Left),
    // Home / End
    (b"[H", KeyCode::Home),
    (b"[F", KeyCode::End),
    (b"OH", KeyCode::Home),
    (b"OF", KeyCode::End),
    (b"[1~", KeyCode::Home),
    (b"[7~", KeyCode::Home),
    (b"[4~", KeyCode::End),
    (b"[8~", KeyCode::End),
    // Editing keys
    (b"[2~", KeyCode::Insert),
    (b"[3~", KeyCode::Delete),
    (b"[5~", KeyCode::PageUp),
    (b"[6~", KeyCode::PageDown),
    (b"OM", KeyCode::Enter),
    // F1-F4
    (b"OP", KeyCode::F(1)),
    (b"OQ", KeyCode::F(2)),
    (b"OR", KeyCode::F(3)),
    (b"OS", KeyCode::F(4)),
    (b"[P", KeyCode::F(1)),
    (b"[Q", KeyCode::F(2)),
    (b"[R", KeyCode::F(3)),
    (b"[S", KeyCode::F(4)),
    (b"[11~", KeyCode::F(1)),
    (b"[12~", KeyCode::F(2)),
    (b"[13~", KeyCode::F(3)),
    (b"[14~", KeyCode::F(4)),
    // F5-F20
    (b"[15~", KeyCode::F(5)),
    (b"[17~", KeyCode::F(6)),
    (b"[18~", KeyCode::F(7)),
    (b"[19~", KeyCode::F(8)),
    (b"[20~", KeyCode::F(9)),
    (b"[21~", KeyCode::F(10)),
    (b"[23~", KeyCode::F(11)),
    (b"[24~", KeyCode::F(12)),
    (b"[25~", KeyCode::F(13)),
    (b"[26~", KeyCode::F(14)),
    (b"[28~", KeyCode::F(15)),
    (b"[29~", KeyCode::F(16)),
    (b"[31~", KeyCode::F(17)),
    (b"[32~", KeyCode::F(18)),
    (b"[33~", KeyCode::F(19)),
    (b"[34~", KeyCode::F(20)),
];

/// Sequence signature to key mapping
#[derive(Debug, Clone)]
pub struct KeyTable {
    entries: HashMap<Vec<u8>, KeyEvent>,
}

impl Default for KeyTable {
    fn default() -> Self {
        Self::ansi()
    }
}

impl KeyTable {
    /// Table with the built-in ANSI/xterm entries
    pub fn ansi() -> Self {
        let mut entries: HashMap<Vec<u8>, KeyEvent> = DEFAULT_KEYS
            .iter()
            .map(|(sig, code)| (sig.to_vec(), KeyEvent::plain(*code)))
            .collect();
        entries.insert(b"[Z".to_vec(), KeyEvent::new(KeyCode::BackTab, ModifierSet::SHIFT));
        Self { entries }
    }

    /// Built-in table plus overrides from configuration.
    ///
    /// Keys are sequences without the leading ESC (`"[25~"`, `"O2P"`),
    /// values are key names accepted by [`KeyCode::from_str`](std::str::FromStr).
    pub fn with_overrides(overrides: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let mut table = Self::ansi();
        for (sequence, name) in overrides {
            let code: KeyCode = name
                .parse()
                .map_err(|_| ConfigError::UnknownKey(name.clone()))?;
            table.insert(sequence, code)?;
        }
        Ok(table)
    }

    /// Add or replace a mapping
    pub fn insert(&mut self, sequence: &str, code: KeyCode) -> Result<(), ConfigError> {
        let bytes = sequence.as_bytes();
        let valid = match bytes {
            [intro, middle @ .., last] => {
                matches!(intro, b'[' | b'O')
                    && middle.iter().all(|b| (0x20..=0x3F).contains(b))
                    && (0x40..=0x7E).contains(last)
            }
            _ => false,
        };
        if !valid {
            return Err(ConfigError::InvalidSequence(sequence.to_string()));
        }
        self.entries.insert(bytes.to_vec(), KeyEvent::plain(code));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a complete sequence.
    ///
    /// `body` holds the parameter and intermediate bytes between the
    /// introducer and the final byte. Returns `None` for sequences the
    /// table does not know.
    pub fn lookup(&self, intro: u8, body: &[u8], final_byte: u8) -> Option<KeyEvent> {
        let mut signature = Vec::with_capacity(body.len() + 2);
        signature.push(intro);
        signature.extend_from_slice(body);
        signature.push(final_byte);
        if let Some(event) = self.entries.get(&signature) {
            return Some(*event);
        }

        let mut fields = body.split(|b| *b == b';');
        let key_param = fields.next().unwrap_or_default();
        let mod_param = fields.next();
        if fields.next().is_some() || !key_param.iter().all(u8::is_ascii_digit) {
            return None;
        }

        let modifiers = match mod_param {
            Some(param) => ModifierSet::from_xterm_param(parse_param(param)?),
            None => ModifierSet::NONE,
        };

        signature.clear();
        signature.push(intro);
        if final_byte == b'~' {
            signature.extend_from_slice(key_param);
        } else if !(key_param.is_empty() || key_param == b"1") {
            return None;
        }
        signature.push(final_byte);

        self.entries
            .get(&signature)
            .map(|event| KeyEvent::new(event.code, event.modifiers | modifiers))
    }
}

fn parse_param(digits: &[u8]) -> Option<u16> {
    if digits.is_empty() || digits.len() > 5 || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}
