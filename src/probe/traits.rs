//! Core probe trait and types.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Probe implementation selected at startup.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ProbeMode {
    /// Shell out to the system `ping` utility.
    #[default]
    Command,
    /// Raw-socket ICMP echo (needs `CAP_NET_RAW` or an unprivileged ICMP socket).
    Icmp,
    /// Synthetic samples, no network access.
    Mock,
}

/// Result of a single reachability check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProbeOutcome {
    /// Target answered; round-trip latency in milliseconds.
    Success { latency_ms: f64 },
    /// Target did not answer in time, or the check itself failed.
    Failure,
}

impl ProbeOutcome {
    /// Build an outcome from a measured latency.
    ///
    /// Non-finite or negative latencies are not measurements and yield
    /// [`ProbeOutcome::Failure`].
    pub fn from_latency(latency_ms: f64) -> Self {
        if latency_ms.is_finite() && latency_ms >= 0.0 {
            Self::Success { latency_ms }
        } else {
            Self::Failure
        }
    }

    /// Latency in milliseconds, if the probe succeeded.
    pub fn latency_ms(&self) -> Option<f64> {
        match self {
            Self::Success { latency_ms } => Some(*latency_ms),
            Self::Failure => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

impl std::fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success { latency_ms } => write!(f, "OK ({latency_ms}ms)"),
            Self::Failure => write!(f, "FAILED"),
        }
    }
}

/// A bounded-time reachability check against a network target.
///
/// # Error Handling Philosophy
///
/// Every failure cause (timeout, unreachable host, spawn or permission
/// errors, unparseable output) collapses into [`ProbeOutcome::Failure`].
/// A failed probe is a valid observation and gets recorded as such; callers
/// never see an error from here. Implementations log the cause themselves.
///
/// Implementations must return within roughly `timeout` and must release
/// any subprocess or socket they opened on every path, including timeout.
#[async_trait::async_trait]
pub trait Probe: Send + Sync + 'static {
    /// Which implementation this is.
    fn mode(&self) -> ProbeMode;

    /// Perform one check against `target`.
    async fn probe(&self, target: &str, timeout: Duration) -> ProbeOutcome;
}
