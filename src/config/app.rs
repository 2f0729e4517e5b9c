//! Application configuration structures.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::probe::{DEFAULT_PROCESS_GRACE, MockProbeConfig, ProbeMode};

use super::validation::{ConfigError, expand_env_vars};

// =============================================================================
// Constants
// =============================================================================

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 5000;

/// Default probe target.
pub const DEFAULT_TARGET: &str = "8.8.8.8";

/// Default pause between sampling cycles (60 seconds).
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Minimum allowed pause between sampling cycles (1 second).
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Default probe timeout (5 seconds).
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default retention horizon in days.
pub const DEFAULT_CLEANUP_DAYS: u32 = 30;

/// Default partition directory.
pub const DEFAULT_DATA_DIR: &str = "./data";

/// Default upper bound for one store operation (10 seconds).
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(10);

/// Default window after local midnight in which retention runs (2 minutes).
pub const DEFAULT_SWEEP_WINDOW: Duration = Duration::from_secs(120);

// =============================================================================
// Server Configuration
// =============================================================================

/// Web server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address (default: "0.0.0.0").
    pub bind: String,

    /// Server port (default: 5000).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

// =============================================================================
// Storage Configuration
// =============================================================================

/// Partition storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding `ping_data_<date>.json` partitions (default: "./data").
    pub data_dir: PathBuf,

    /// IANA timezone used to derive date keys and the midnight window (default: UTC).
    pub timezone: Tz,

    /// Retention horizon in days (default: 30).
    pub cleanup_days: u32,

    /// Upper bound for one store operation issued by the sampler (default: 10s).
    #[serde(with = "humantime_serde")]
    pub io_timeout: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            timezone: Tz::UTC,
            cleanup_days: DEFAULT_CLEANUP_DAYS,
            io_timeout: DEFAULT_IO_TIMEOUT,
        }
    }
}

// =============================================================================
// Sampler Configuration
// =============================================================================

/// Sampling loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Host probed every cycle (default: "8.8.8.8").
    pub target: String,

    /// Pause after each cycle (default: 60s, minimum: 1s).
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Retention runs when a cycle starts within this long after local midnight (default: 2m).
    #[serde(with = "humantime_serde")]
    pub sweep_window: Duration,

    /// Also run retention on the first cycle after startup (default: false).
    pub sweep_on_start: bool,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            target: DEFAULT_TARGET.to_string(),
            interval: DEFAULT_INTERVAL,
            sweep_window: DEFAULT_SWEEP_WINDOW,
            sweep_on_start: false,
        }
    }
}

impl SamplerConfig {
    /// Interval clamped to [`MIN_INTERVAL`].
    pub fn effective_interval(&self) -> Duration {
        if self.interval < MIN_INTERVAL {
            tracing::warn!(min_interval = ?MIN_INTERVAL,
                "Interval duration is less than minimum allowed. Using minimum duration."
            );
            MIN_INTERVAL
        } else {
            self.interval
        }
    }
}

// =============================================================================
// Probe Configuration
// =============================================================================

/// Probe strategy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Which probe implementation to use (default: command).
    pub mode: ProbeMode,

    /// Timeout for the check itself (default: 5s).
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Extra budget for subprocess overhead in `command` mode (default: 5s).
    #[serde(with = "humantime_serde")]
    pub process_grace: Duration,

    /// Settings for `mock` mode.
    pub mock: MockProbeConfig,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            mode: ProbeMode::default(),
            timeout: DEFAULT_PROBE_TIMEOUT,
            process_grace: DEFAULT_PROCESS_GRACE,
            mock: MockProbeConfig::default(),
        }
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
///
/// Built once at startup and handed to each component; nothing reads
/// configuration from globals.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Web server configuration.
    pub server: ServerConfig,

    /// Partition storage configuration.
    pub storage: StorageConfig,

    /// Sampling loop configuration.
    pub sampler: SamplerConfig,

    /// Probe configuration.
    pub probe: ProbeConfig,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// `${VAR}` and `${VAR:-default}` references are expanded before parsing.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(&expand_env_vars(content))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.bind.parse::<IpAddr>().map_err(|_| {
            ConfigError::ValidationError(format!(
                "invalid server bind address: '{}'",
                self.server.bind
            ))
        })?;

        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server port must be non-zero".to_string(),
            ));
        }

        if self.sampler.target.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "sampler target cannot be empty".to_string(),
            ));
        }

        if self.probe.timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "probe timeout must be positive".to_string(),
            ));
        }

        if self.storage.io_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "storage io_timeout must be positive".to_string(),
            ));
        }

        let mock = &self.probe.mock;
        if !(0.0..=1.0).contains(&mock.success_rate) {
            return Err(ConfigError::ValidationError(format!(
                "mock success_rate must be within [0, 1], got {}",
                mock.success_rate
            )));
        }

        if !mock.min_latency_ms.is_finite()
            || !mock.max_latency_ms.is_finite()
            || mock.min_latency_ms < 0.0
            || mock.min_latency_ms > mock.max_latency_ms
        {
            return Err(ConfigError::ValidationError(format!(
                "mock latency range [{}, {}] is invalid",
                mock.min_latency_ms, mock.max_latency_ms
            )));
        }

        Ok(())
    }
}
