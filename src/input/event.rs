//! Decoded key events.

use std::fmt;
use std::str::FromStr;

use crossterm::event::{KeyCode as KeyCodeXT, KeyEvent as KeyEventXT};
use thiserror::Error;

use super::modifiers::ModifierSet;

/// Semantic key identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    /// Printable character (case is carried here, not as SHIFT)
    Char(char),
    Enter,
    Tab,
    /// Shift+Tab as reported by `CSI Z`
    BackTab,
    Backspace,
    Escape,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    Insert,
    Delete,
    /// Function key F1..F20
    F(u8),
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyCode::Char(' ') => f.write_str("Space"),
            KeyCode::Char(ch) => write!(f, "{}", ch),
            KeyCode::Enter => f.write_str("Enter"),
            KeyCode::Tab => f.write_str("Tab"),
            KeyCode::BackTab => f.write_str("BackTab"),
            KeyCode::Backspace => f.write_str("Backspace"),
            KeyCode::Escape => f.write_str("Escape"),
            KeyCode::Up => f.write_str("Up"),
            KeyCode::Down => f.write_str("Down"),
            KeyCode::Left => f.write_str("Left"),
            KeyCode::Right => f.write_str("Right"),
            KeyCode::Home => f.write_str("Home"),
            KeyCode::End => f.write_str("End"),
            KeyCode::PageUp => f.write_str("PageUp"),
            KeyCode::PageDown => f.write_str("PageDown"),
            KeyCode::Insert => f.write_str("Insert"),
            KeyCode::Delete => f.write_str("Delete"),
            KeyCode::F(n) => write!(f, "F{}", n),
        }
    }
}

/// Error returned when a key name cannot be parsed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown key name: {0:?}")]
pub struct UnknownKeyName(pub String);

impl FromStr for KeyCode {
    type Err = UnknownKeyName;

    /// Parse a key name such as `Up`, `PageDown`, `F5` or a single character
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        if let (Some(ch), None) = (chars.next(), chars.next()) {
            return Ok(KeyCode::Char(ch));
        }

        let code = match s.to_lowercase().as_str() {
            "space" => KeyCode::Char(' '),
            "enter" | "return" => KeyCode::Enter,
            "tab" => KeyCode::Tab,
            "backtab" => KeyCode::BackTab,
            "backspace" => KeyCode::Backspace,
            "escape" | "esc" => KeyCode::Escape,
            "up" => KeyCode::Up,
            "down" => KeyCode::Down,
            "left" => KeyCode::Left,
            "right" => KeyCode::Right,
            "home" => KeyCode::Home,
            "end" => KeyCode::End,
            "pageup" | "pgup" => KeyCode::PageUp,
            "pagedown" | "pgdn" => KeyCode::PageDown,
            "insert" | "ins" => KeyCode::Insert,
            "delete" | "del" => KeyCode::Delete,
            name => match name.strip_prefix('f').and_then(|n| n.parse::<u8>().ok()) {
                Some(n) if (1..=20).contains(&n) => KeyCode::F(n),
                _ => return Err(UnknownKeyName(s.to_string())),
            },
        };
        Ok(code)
    }
}

impl From<KeyCode> for KeyCodeXT {
    fn from(code: KeyCode) -> Self {
        match code {
            KeyCode::Char(ch) => KeyCodeXT::Char(ch),
            KeyCode::Enter => KeyCodeXT::Enter,
            KeyCode::Tab => KeyCodeXT::Tab,
            KeyCode::BackTab => KeyCodeXT::BackTab,
            KeyCode::Backspace => KeyCodeXT::Backspace,
            KeyCode::Escape => KeyCodeXT::Esc,
            KeyCode::Up => KeyCodeXT::Up,
            KeyCode::Down => KeyCodeXT::Down,
            KeyCode::Left => KeyCodeXT::Left,
            KeyCode::Right => KeyCodeXT::Right,
            KeyCode::Home => KeyCodeXT::Home,
            KeyCode::End => KeyCodeXT::End,
            KeyCode::PageUp => KeyCodeXT::PageUp,
            KeyCode::PageDown => KeyCodeXT::PageDown,
            KeyCode::Insert => KeyCodeXT::Insert,
            KeyCode::Delete => KeyCodeXT::Delete,
            KeyCode::F(n) => KeyCodeXT::F(n),
        }
    }
}

/// A decoded key press
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyEvent {
    pub code: KeyCode,
    pub modifiers: ModifierSet,
}

impl KeyEvent {
    pub const fn new(code: KeyCode, modifiers: ModifierSet) -> Self {
        Self { code, modifiers }
    }

    /// Plain key with no modifiers
    pub const fn plain(code: KeyCode) -> Self {
        Self::new(code, ModifierSet::NONE)
    }

    /// True for Ctrl+C, which raw mode delivers as a byte instead of SIGINT
    pub fn is_interrupt(&self) -> bool {
        self.modifiers == ModifierSet::CONTROL
            && matches!(self.code, KeyCode::Char('c') | KeyCode::Char('C'))
    }
}

impl fmt::Display for KeyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.modifiers.contains(ModifierSet::CONTROL) {
            f.write_str("Ctrl+")?;
        }
        if self.modifiers.contains(ModifierSet::ALT) {
            f.write_str("Alt+")?;
        }
        if self.modifiers.contains(ModifierSet::SHIFT) {
            f.write_str("Shift+")?;
        }
        write!(f, "{}", self.code)
    }
}

impl From<KeyEvent> for KeyEventXT {
    fn from(event: KeyEvent) -> Self {
        KeyEventXT::new(event.code.into(), event.modifiers.into())
    }
}
