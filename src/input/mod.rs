//! Key decoding.
//!
//! - **modifiers**: `ModifierSet` bit flags (Shift / Control / Alt)
//! - **event**: `KeyCode` and `KeyEvent` value types
//! - **table**: escape sequence signature to key lookup
//! - **decoder**: byte-fed state machine producing `KeyEvent`s
//!
//! ```text
//! raw bytes ──> SequenceDecoder ──> KeyEvent { code, modifiers }
//!                     │
//!                  KeyTable (CSI / SS3 signatures)
//! ```

pub mod decoder;
pub mod event;
pub mod modifiers;
pub mod table;

pub use decoder::{SequenceDecoder, DEFAULT_MAX_SEQUENCE_LEN};
pub use event::{KeyCode, KeyEvent, UnknownKeyName};
pub use modifiers::ModifierSet;
pub use table::KeyTable;
