//! Capture configuration.
//!
//! Settings can be built in code or loaded from TOML. The default file is
//! `~/.terminable/config.toml`, overridable with `$TERMINABLE_CONFIG`:
//!
//! ```toml
//! # How long a lone ESC waits for a continuation before it counts
//! # as the Escape key
//! escape_timeout_ms = 50
//!
//! # read() waits for input (false: return immediately with no event)
//! blocking = true
//!
//! # Ctrl+C closes the session and read() reports Interrupted
//! interrupt_on_ctrl_c = true
//!
//! # Longest escape sequence body kept before it is discarded
//! max_sequence_len = 32
//!
//! # Restore the terminal on SIGINT / SIGTERM / SIGHUP and on panic
//! restore_on_signal = false
//!
//! # Extra or replacement sequences (without the leading ESC)
//! [keys]
//! "[25~" = "F13"
//! "[1;5P" = "F13"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::input::{KeyTable, SequenceDecoder, DEFAULT_MAX_SEQUENCE_LEN};

/// Environment variable naming an alternative config file
pub const CONFIG_ENV: &str = "TERMINABLE_CONFIG";

/// Default escape ambiguity window
pub const DEFAULT_ESCAPE_TIMEOUT_MS: u64 = 50;

const MAX_ESCAPE_TIMEOUT_MS: u64 = 10_000;
const MAX_SEQUENCE_LEN_LIMIT: usize = 1024;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Unknown key name: {0}")]
    UnknownKey(String),

    #[error("Invalid escape sequence: {0:?}")]
    InvalidSequence(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Capture session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Escape ambiguity window in milliseconds
    pub escape_timeout_ms: u64,
    /// Whether read() waits for input
    pub blocking: bool,
    /// Treat Ctrl+C as an interrupt that ends the session
    pub interrupt_on_ctrl_c: bool,
    /// Bound on buffered escape sequence bytes
    pub max_sequence_len: usize,
    /// Install process-wide restore hooks when a session opens
    pub restore_on_signal: bool,
    /// Sequence overrides: body without ESC -> key name
    pub keys: BTreeMap<String, String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            escape_timeout_ms: DEFAULT_ESCAPE_TIMEOUT_MS,
            blocking: true,
            interrupt_on_ctrl_c: true,
            max_sequence_len: DEFAULT_MAX_SEQUENCE_LEN,
            restore_on_signal: false,
            keys: BTreeMap::new(),
        }
    }
}

impl CaptureConfig {
    /// Load configuration from the default location.
    ///
    /// Falls back to defaults when the file is missing or unusable.
    pub fn load() -> Self {
        if let Some(path) = Self::get_config_path() {
            if path.exists() {
                match Self::load_from(&path) {
                    Ok(config) => return config,
                    Err(e) => tracing::warn!("Ignoring {}: {}", path.display(), e),
                }
            }
        }
        Self::default()
    }

    /// Load and validate configuration from a file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check ranges and key overrides
    pub fn validate(&self) -> Result<()> {
        if self.escape_timeout_ms > MAX_ESCAPE_TIMEOUT_MS {
            return Err(ConfigError::InvalidValue(format!(
                "escape_timeout_ms must be at most {}, got {}",
                MAX_ESCAPE_TIMEOUT_MS, self.escape_timeout_ms
            )));
        }
        if self.max_sequence_len == 0 || self.max_sequence_len > MAX_SEQUENCE_LEN_LIMIT {
            return Err(ConfigError::InvalidValue(format!(
                "max_sequence_len must be between 1 and {}, got {}",
                MAX_SEQUENCE_LEN_LIMIT, self.max_sequence_len
            )));
        }
        self.key_table().map(|_| ())
    }

    pub fn escape_timeout(&self) -> Duration {
        Duration::from_millis(self.escape_timeout_ms)
    }

    pub fn with_escape_timeout(mut self, timeout: Duration) -> Self {
        self.escape_timeout_ms = timeout.as_millis().min(u64::MAX as u128) as u64;
        self
    }

    pub fn with_blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    pub fn with_interrupt_on_ctrl_c(mut self, interrupt: bool) -> Self {
        self.interrupt_on_ctrl_c = interrupt;
        self
    }

    pub fn with_restore_on_signal(mut self, restore: bool) -> Self {
        self.restore_on_signal = restore;
        self
    }

    /// Add a sequence override
    pub fn with_key(mut self, sequence: &str, key_name: &str) -> Self {
        self.keys.insert(sequence.to_string(), key_name.to_string());
        self
    }

    /// Lookup table with this config's overrides applied
    pub fn key_table(&self) -> Result<KeyTable> {
        KeyTable::with_overrides(&self.keys)
    }

    /// Fresh decoder for a session
    pub fn decoder(&self) -> Result<SequenceDecoder> {
        Ok(SequenceDecoder::with_table(self.key_table()?, self.max_sequence_len))
    }

    /// Get config file path
    fn get_config_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }
        home_dir().map(|home| home.join(".terminable").join("config.toml"))
    }
}

// Get home directory
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{KeyCode, KeyEvent};

    #[test]
    fn test_defaults() {
        let config = CaptureConfig::default();
        assert_eq!(config.escape_timeout(), Duration::from_millis(50));
        assert!(config.blocking);
        assert!(config.interrupt_on_ctrl_c);
        assert_eq!(config.max_sequence_len, 32);
        assert!(!config.restore_on_signal);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() -> anyhow::Result<()> {
        let config = CaptureConfig::from_toml("escape_timeout_ms = 120\n")?;
        assert_eq!(config.escape_timeout_ms, 120);
        assert!(config.blocking);
        assert_eq!(config.max_sequence_len, DEFAULT_MAX_SEQUENCE_LEN);
        Ok(())
    }

    #[test]
    fn test_key_overrides_reach_decoder() -> anyhow::Result<()> {
        let config = CaptureConfig::from_toml(
            r#"
            blocking = false
            restore_on_signal = true

            [keys]
            "[25~" = "Home"
            "#,
        )?;
        assert!(!config.blocking);
        assert!(config.restore_on_signal);

        let mut decoder = config.decoder()?;
        let events: Vec<_> = b"\x1b[25~".iter().filter_map(|b| decoder.feed(*b)).collect();
        assert_eq!(events, vec![KeyEvent::plain(KeyCode::Home)]);
        Ok(())
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            CaptureConfig::from_toml("max_sequence_len = 0"),
            Err(ConfigError::InvalidValue(_))
        ));
        assert!(matches!(
            CaptureConfig::from_toml("escape_timeout_ms = 60000"),
            Err(ConfigError::InvalidValue(_))
        ));
        assert!(matches!(
            CaptureConfig::from_toml("[keys]\n\"[25~\" = \"Meta\""),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(matches!(
            CaptureConfig::from_toml("blocking = \"yes\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_round_trip_through_file() -> anyhow::Result<()> {
        let config = CaptureConfig::default()
            .with_escape_timeout(Duration::from_millis(25))
            .with_interrupt_on_ctrl_c(false)
            .with_key("[200~", "Insert");

        let path = std::env::temp_dir().join(format!("terminable-config-{}.toml", std::process::id()));
        fs::write(&path, config.to_toml()?)?;
        let loaded = CaptureConfig::load_from(&path);
        let _ = fs::remove_file(&path);

        assert_eq!(loaded?, config);
        Ok(())
    }

    #[test]
    fn test_missing_file() {
        let err = CaptureConfig::load_from("/nonexistent/terminable/config.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
