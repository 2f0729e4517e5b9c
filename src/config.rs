//! Configuration module for netpulse.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Server settings (port, bind address)
//! - Storage settings (data directory, timezone, retention horizon)
//! - Sampler settings (target, interval, midnight sweep window)
//! - Probe settings (mode, timeouts, mock distribution)

mod app;
mod validation;

pub use app::{
    AppConfig, ProbeConfig, SamplerConfig, ServerConfig, StorageConfig, DEFAULT_CLEANUP_DAYS,
    DEFAULT_DATA_DIR, DEFAULT_INTERVAL, DEFAULT_IO_TIMEOUT, DEFAULT_PORT, DEFAULT_PROBE_TIMEOUT,
    DEFAULT_SWEEP_WINDOW, DEFAULT_TARGET, MIN_INTERVAL,
};
pub use validation::{ConfigError, expand_env_vars, parse_duration, parse_timezone};
