//! # Pump Configuration
//!
//! Loaded once at startup from TOML. Every key is optional:
//!
//! ```toml
//! tick_interval_ms = 50
//! compression_level = 7
//! max_decompressed_size = 2097152
//! max_packets_per_batch = 1024
//! # outbound_capacity = 4096   # omit for an unbounded queue
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::protocol::{
    BatchLimits, CompressionLevel, DEFAULT_MAX_DECOMPRESSED_SIZE, DEFAULT_MAX_PACKETS_PER_BATCH,
    MAX_COMPRESSION_LEVEL,
};

/// Default outbound flush period in milliseconds.
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 50;

/// Session pump configuration.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PumpConfig {
    /// Outbound flush period.
    pub tick_interval_ms: u64,
    /// Initial DEFLATE level for new sessions (0-9).
    pub compression_level: u32,
    /// Decompressed batch ceiling in bytes.
    pub max_decompressed_size: usize,
    /// Entry ceiling per inbound batch.
    pub max_packets_per_batch: usize,
    /// Bound on the outbound queue; `None` keeps it unbounded.
    pub outbound_capacity: Option<usize>,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            compression_level: CompressionLevel::DEFAULT.get(),
            max_decompressed_size: DEFAULT_MAX_DECOMPRESSED_SIZE,
            max_packets_per_batch: DEFAULT_MAX_PACKETS_PER_BATCH,
            outbound_capacity: None,
        }
    }
}

impl PumpConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.compression_level > MAX_COMPRESSION_LEVEL {
            return Err(ConfigError::InvalidLevel(self.compression_level));
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidInterval);
        }
        if self.max_decompressed_size == 0 {
            return Err(ConfigError::InvalidLimit("max_decompressed_size"));
        }
        if self.max_packets_per_batch == 0 {
            return Err(ConfigError::InvalidLimit("max_packets_per_batch"));
        }
        if self.outbound_capacity == Some(0) {
            return Err(ConfigError::InvalidLimit("outbound_capacity"));
        }
        Ok(())
    }

    /// Outbound flush period.
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Initial compression level, clamped to the valid range.
    #[must_use]
    pub fn level(&self) -> CompressionLevel {
        CompressionLevel::new(self.compression_level.min(MAX_COMPRESSION_LEVEL))
            .unwrap_or_default()
    }

    /// Inbound decode ceilings.
    #[must_use]
    pub const fn limits(&self) -> BatchLimits {
        BatchLimits {
            max_decompressed_size: self.max_decompressed_size,
            max_packets: self.max_packets_per_batch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PumpConfig::default();
        assert_eq!(config.tick_interval(), Duration::from_millis(50));
        assert_eq!(config.level(), CompressionLevel::DEFAULT);
        assert_eq!(config.limits(), BatchLimits::default());
        assert!(config.outbound_capacity.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        assert_eq!(PumpConfig::from_toml_str("").unwrap(), PumpConfig::default());
    }

    #[test]
    fn test_partial_document() {
        let config = PumpConfig::from_toml_str(
            "compression_level = 1\noutbound_capacity = 256\n",
        )
        .unwrap();
        assert_eq!(config.compression_level, 1);
        assert_eq!(config.outbound_capacity, Some(256));
        assert_eq!(config.tick_interval_ms, DEFAULT_TICK_INTERVAL_MS);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            PumpConfig::from_toml_str("compression_level = 12"),
            Err(ConfigError::InvalidLevel(12))
        ));
        assert!(matches!(
            PumpConfig::from_toml_str("tick_interval_ms = 0"),
            Err(ConfigError::InvalidInterval)
        ));
        assert!(matches!(
            PumpConfig::from_toml_str("outbound_capacity = 0"),
            Err(ConfigError::InvalidLimit("outbound_capacity"))
        ));
        assert!(matches!(
            PumpConfig::from_toml_str("no_such_key = true"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("lodestone_pump_{}.toml", std::process::id()));
        std::fs::write(&path, "tick_interval_ms = 20\n").unwrap();
        let config = PumpConfig::load(&path).unwrap();
        assert_eq!(config.tick_interval(), Duration::from_millis(20));
        std::fs::remove_file(&path).ok();

        assert!(matches!(
            PumpConfig::load("/nonexistent/lodestone.toml"),
            Err(ConfigError::Io(_))
        ));
    }
}
