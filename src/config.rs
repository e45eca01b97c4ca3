//! Machine configuration.
//!
//! Settings come from defaults, an optional JSON file, then command line
//! flags, in increasing priority:
//!
//! ```json
//! { "memory_size": 512, "clock_rate": 64, "image": "program.bin" }
//! ```

use crate::cpu::clock::{Clock, DEFAULT_CLOCK_RATE};
use crate::cpu::memory::{CELL_BYTES, DEFAULT_MEMORY_SIZE};
use crate::asm::image::WORD_BYTES;
use serde::{Serialize, Deserialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Start-up settings of a machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MachineConfig {
    /// Memory size in bytes.
    pub memory_size: usize,
    /// Ticks per second; 0 runs unthrottled.
    pub clock_rate: u32,
    /// Program image to load at start-up.
    pub image: Option<PathBuf>,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            memory_size: DEFAULT_MEMORY_SIZE,
            clock_rate: DEFAULT_CLOCK_RATE,
            image: None,
        }
    }
}

impl MachineConfig {
    /// Parse a JSON configuration. Missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_json(&text)
    }

    /// Check the settings describe a usable machine.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memory_size % CELL_BYTES != 0 {
            return Err(ConfigError::OddMemorySize(self.memory_size));
        }
        if self.memory_size < WORD_BYTES {
            return Err(ConfigError::MemoryTooSmall(self.memory_size));
        }
        Ok(())
    }

    /// Tick source for the configured rate.
    pub fn clock(&self) -> Clock {
        Clock::new(self.clock_rate)
    }
}

/// Errors in the machine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("invalid configuration: {0}")]
    Parse(String),

    #[error("memory size {0} is not a whole number of 16-bit cells")]
    OddMemorySize(usize),

    #[error("memory size {0} cannot hold the 4-byte image header")]
    MemoryTooSmall(usize),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_defaults() {
        let config = MachineConfig::default();
        assert_eq!(config.memory_size, 256);
        assert_eq!(config.clock_rate, 128);
        assert!(config.image.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let config = MachineConfig::from_json(r#"{ "memory_size": 1024 }"#).unwrap();
        assert_eq!(config.memory_size, 1024);
        assert_eq!(config.clock_rate, 128);
    }

    #[test]
    fn test_full_json() {
        let config = MachineConfig::from_json(
            r#"{ "memory_size": 64, "clock_rate": 0, "image": "prog.bin" }"#,
        )
        .unwrap();
        assert_eq!(config.image, Some(PathBuf::from("prog.bin")));
        assert_eq!(config.clock().period(), None);
    }

    #[test]
    fn test_clock_rate() {
        let config = MachineConfig { clock_rate: 10, ..Default::default() };
        assert_eq!(config.clock().period(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn test_rejects_bad_sizes() {
        assert_eq!(
            MachineConfig::from_json(r#"{ "memory_size": 255 }"#),
            Err(ConfigError::OddMemorySize(255))
        );
        assert_eq!(
            MachineConfig::from_json(r#"{ "memory_size": 2 }"#),
            Err(ConfigError::MemoryTooSmall(2))
        );
    }

    #[test]
    fn test_rejects_unknown_fields() {
        assert!(matches!(
            MachineConfig::from_json(r#"{ "ram": 12 }"#),
            Err(ConfigError::Parse(_))
        ));
    }
}
