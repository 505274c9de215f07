//! Configuration loaded from defaults, environment variables and the host's
//! JSON init parameters (later layers win)

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{DriverError, Result};
use crate::hardware::{FREQUENCY_MAX_HZ, FREQUENCY_MIN_HZ};

/// Largest block one read may ask for, in I/Q pairs
pub const MAX_SAMPLES_PER_BLOCK: usize = 1 << 20;

/// Block-mode transfer parameters for one RX stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Number of buffers in the hardware transfer ring
    pub num_buffers: u32,

    /// Size of each buffer in samples (must be a multiple of 1024)
    pub buffer_size: u32,

    /// Number of USB transfers kept in flight
    pub num_transfers: u32,

    /// Stream-level timeout handed to the transfer subsystem
    pub stream_timeout_ms: u32,

    /// Samples requested per blocking read
    pub samples_per_block: usize,

    /// Timeout of a single blocking read
    pub read_timeout_ms: u32,

    /// During a run of failed reads, log one warning every N failures
    pub read_failure_log_interval: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            num_buffers: 32,
            buffer_size: 8192 * 4,
            num_transfers: 16,
            stream_timeout_ms: 5000,
            samples_per_block: 8192,
            read_timeout_ms: 5000,
            read_failure_log_interval: 100,
        }
    }
}

/// Driver configuration
#[derive(Debug, Clone, PartialEq)]
pub struct DriverConfig {
    pub stream: StreamConfig,

    /// Index into the sample-rate table used at startup
    pub preferred_sample_rate_index: usize,

    /// Startup center frequency, relative to the device's minimum
    pub startup_frequency_offset_hz: i64,

    /// Directory holding `hostedx40.rbf` / `hostedx115.rbf`
    pub fpga_image_dir: PathBuf,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            stream: StreamConfig::default(),
            preferred_sample_rate_index: 0,
            startup_frequency_offset_hz: 1_000_000,
            fpga_image_dir: PathBuf::from("."),
        }
    }
}

/// Host-supplied overrides; every field is optional
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InitParams {
    num_buffers: Option<u32>,
    buffer_size: Option<u32>,
    num_transfers: Option<u32>,
    stream_timeout_ms: Option<u32>,
    samples_per_block: Option<usize>,
    read_timeout_ms: Option<u32>,
    read_failure_log_interval: Option<u64>,
    sample_rate_index: Option<usize>,
    startup_frequency_offset_hz: Option<i64>,
    fpga_image_dir: Option<PathBuf>,
}

impl DriverConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` with a caller-supplied variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let stream = StreamConfig::default();

        Self {
            stream: StreamConfig {
                num_buffers: lookup("BLADERF_RX_NUM_BUFFERS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(stream.num_buffers),

                buffer_size: lookup("BLADERF_RX_BUFFER_SIZE")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(stream.buffer_size),

                num_transfers: lookup("BLADERF_RX_NUM_TRANSFERS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(stream.num_transfers),

                stream_timeout_ms: lookup("BLADERF_RX_STREAM_TIMEOUT_MS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(stream.stream_timeout_ms),

                samples_per_block: lookup("BLADERF_RX_SAMPLES_PER_BLOCK")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(stream.samples_per_block),

                read_timeout_ms: lookup("BLADERF_RX_READ_TIMEOUT_MS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(stream.read_timeout_ms),

                read_failure_log_interval: lookup("BLADERF_RX_READ_FAILURE_LOG_INTERVAL")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(stream.read_failure_log_interval),
            },

            preferred_sample_rate_index: lookup("BLADERF_RX_SAMPLE_RATE_INDEX")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.preferred_sample_rate_index),

            startup_frequency_offset_hz: lookup("BLADERF_RX_STARTUP_OFFSET_HZ")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.startup_frequency_offset_hz),

            fpga_image_dir: lookup("BLADERF_RX_FPGA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.fpga_image_dir),
        }
    }

    /// Apply the host's JSON init-parameter string on top of this config
    pub fn apply_init_params(&mut self, json: &str) -> Result<()> {
        if json.trim().is_empty() {
            return Ok(());
        }
        let params: InitParams = serde_json::from_str(json)?;

        if let Some(v) = params.num_buffers {
            self.stream.num_buffers = v;
        }
        if let Some(v) = params.buffer_size {
            self.stream.buffer_size = v;
        }
        if let Some(v) = params.num_transfers {
            self.stream.num_transfers = v;
        }
        if let Some(v) = params.stream_timeout_ms {
            self.stream.stream_timeout_ms = v;
        }
        if let Some(v) = params.samples_per_block {
            self.stream.samples_per_block = v;
        }
        if let Some(v) = params.read_timeout_ms {
            self.stream.read_timeout_ms = v;
        }
        if let Some(v) = params.read_failure_log_interval {
            self.stream.read_failure_log_interval = v;
        }
        if let Some(v) = params.sample_rate_index {
            self.preferred_sample_rate_index = v;
        }
        if let Some(v) = params.startup_frequency_offset_hz {
            self.startup_frequency_offset_hz = v;
        }
        if let Some(v) = params.fpga_image_dir {
            self.fpga_image_dir = v;
        }
        Ok(())
    }

    /// Reject values the transfer subsystem cannot work with
    pub fn validate(&self, sample_rate_count: usize) -> Result<()> {
        let s = &self.stream;
        if s.num_buffers == 0 || s.num_transfers == 0 {
            return Err(DriverError::Config(
                "num_buffers and num_transfers must be non-zero".to_string(),
            ));
        }
        if s.num_transfers >= s.num_buffers {
            return Err(DriverError::Config(format!(
                "num_transfers ({}) must be less than num_buffers ({})",
                s.num_transfers, s.num_buffers
            )));
        }
        if s.buffer_size == 0 || s.buffer_size % 1024 != 0 {
            return Err(DriverError::Config(format!(
                "buffer_size {} is not a non-zero multiple of 1024",
                s.buffer_size
            )));
        }
        if s.samples_per_block == 0 || s.samples_per_block > MAX_SAMPLES_PER_BLOCK {
            return Err(DriverError::Config(format!(
                "samples_per_block {} outside 1..={}",
                s.samples_per_block, MAX_SAMPLES_PER_BLOCK
            )));
        }
        if s.stream_timeout_ms == 0 || s.read_timeout_ms == 0 {
            return Err(DriverError::Config("timeouts must be non-zero".to_string()));
        }
        let max_offset = FREQUENCY_MAX_HZ - FREQUENCY_MIN_HZ;
        if !(0..=max_offset).contains(&self.startup_frequency_offset_hz) {
            return Err(DriverError::Config(format!(
                "startup frequency offset {} Hz outside 0..={} Hz",
                self.startup_frequency_offset_hz, max_offset
            )));
        }
        if self.preferred_sample_rate_index >= sample_rate_count {
            return Err(DriverError::Config(format!(
                "sample rate index {} out of range (table has {})",
                self.preferred_sample_rate_index, sample_rate_count
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_match_reference_configuration() {
        let config = DriverConfig::default();
        assert_eq!(config.stream.num_buffers, 32);
        assert_eq!(config.stream.buffer_size, 32768);
        assert_eq!(config.stream.num_transfers, 16);
        assert_eq!(config.stream.read_timeout_ms, 5000);
        assert_eq!(config.stream.samples_per_block, 8192);
        assert!(config.validate(7).is_ok());
    }

    #[test]
    fn test_from_lookup_overrides_and_ignores_garbage() {
        let vars: HashMap<&str, &str> = [
            ("BLADERF_RX_NUM_BUFFERS", "64"),
            ("BLADERF_RX_READ_TIMEOUT_MS", "not-a-number"),
            ("BLADERF_RX_FPGA_DIR", "/opt/fpga"),
        ]
        .into_iter()
        .collect();

        let config = DriverConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.stream.num_buffers, 64);
        assert_eq!(config.stream.read_timeout_ms, 5000);
        assert_eq!(config.fpga_image_dir, PathBuf::from("/opt/fpga"));
    }

    #[test]
    fn test_init_params_partial_override() {
        let mut config = DriverConfig::default();
        config
            .apply_init_params(r#"{"samples_per_block": 4096, "sample_rate_index": 2, "unrelated": true}"#)
            .unwrap();
        assert_eq!(config.stream.samples_per_block, 4096);
        assert_eq!(config.preferred_sample_rate_index, 2);
        assert_eq!(config.stream.num_buffers, 32);
    }

    #[test]
    fn test_init_params_empty_and_malformed() {
        let mut config = DriverConfig::default();
        assert!(config.apply_init_params("   ").is_ok());
        assert!(matches!(
            config.apply_init_params("{not json"),
            Err(DriverError::Config(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = DriverConfig::default();
        config.stream.buffer_size = 1000;
        assert!(config.validate(7).is_err());

        let mut config = DriverConfig::default();
        config.stream.num_transfers = 32;
        assert!(config.validate(7).is_err());

        let mut config = DriverConfig::default();
        config.preferred_sample_rate_index = 7;
        assert!(config.validate(7).is_err());
    }

    #[test]
    fn test_validate_bounds_startup_offset() {
        for offset in [i64::MAX, -1, FREQUENCY_MAX_HZ - FREQUENCY_MIN_HZ + 1] {
            let mut config = DriverConfig::default();
            config.startup_frequency_offset_hz = offset;
            assert!(
                matches!(config.validate(7), Err(DriverError::Config(_))),
                "offset {} accepted",
                offset
            );
        }

        let mut config = DriverConfig::default();
        config.startup_frequency_offset_hz = FREQUENCY_MAX_HZ - FREQUENCY_MIN_HZ;
        assert!(config.validate(7).is_ok());
    }

    #[test]
    fn test_validate_bounds_samples_per_block() {
        let mut config = DriverConfig::default();
        config
            .apply_init_params(r#"{"samples_per_block": 9223372036854775808}"#)
            .unwrap();
        assert!(matches!(config.validate(7), Err(DriverError::Config(_))));

        config.stream.samples_per_block = MAX_SAMPLES_PER_BLOCK;
        assert!(config.validate(7).is_ok());
        config.stream.samples_per_block = MAX_SAMPLES_PER_BLOCK + 1;
        assert!(config.validate(7).is_err());
    }
}
