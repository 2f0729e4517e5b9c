//! Synthetic probe for tests and demos.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::probe::{Probe, ProbeMode, ProbeOutcome};

/// Default probability that a mock probe succeeds.
pub const DEFAULT_SUCCESS_RATE: f64 = 0.95;

/// Default lower latency bound in milliseconds.
pub const DEFAULT_MIN_LATENCY_MS: f64 = 10.0;

/// Default upper latency bound in milliseconds.
pub const DEFAULT_MAX_LATENCY_MS: f64 = 100.0;

fn default_success_rate() -> f64 {
    DEFAULT_SUCCESS_RATE
}

fn default_min_latency_ms() -> f64 {
    DEFAULT_MIN_LATENCY_MS
}

fn default_max_latency_ms() -> f64 {
    DEFAULT_MAX_LATENCY_MS
}

/// Configuration for the synthetic probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockProbeConfig {
    /// Probability in `[0, 1]` that a check succeeds (default: 0.95).
    #[serde(default = "default_success_rate")]
    pub success_rate: f64,
    /// Lower latency bound (default: 10ms).
    #[serde(default = "default_min_latency_ms")]
    pub min_latency_ms: f64,
    /// Upper latency bound (default: 100ms).
    #[serde(default = "default_max_latency_ms")]
    pub max_latency_ms: f64,
    /// Fixed RNG seed for reproducible series; entropy-seeded when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for MockProbeConfig {
    fn default() -> Self {
        Self {
            success_rate: DEFAULT_SUCCESS_RATE,
            min_latency_ms: DEFAULT_MIN_LATENCY_MS,
            max_latency_ms: DEFAULT_MAX_LATENCY_MS,
            seed: None,
        }
    }
}

impl MockProbeConfig {
    /// Set the success probability.
    pub fn with_success_rate(mut self, rate: f64) -> Self {
        self.success_rate = rate;
        self
    }

    /// Set the latency range.
    pub fn with_latency_range(mut self, min_ms: f64, max_ms: f64) -> Self {
        self.min_latency_ms = min_ms;
        self.max_latency_ms = max_ms;
        self
    }

    /// Set the RNG seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Produces uniformly distributed latencies with a fixed success rate,
/// without touching the network.
#[derive(Debug)]
pub struct MockProbe {
    config: MockProbeConfig,
    rng: Mutex<StdRng>,
}

impl MockProbe {
    pub fn new(config: MockProbeConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            config,
            rng: Mutex::new(rng),
        }
    }

    pub fn config(&self) -> &MockProbeConfig {
        &self.config
    }

    fn draw(&self) -> ProbeOutcome {
        let MockProbeConfig {
            success_rate,
            min_latency_ms,
            max_latency_ms,
            ..
        } = self.config;
        let lo = min_latency_ms.min(max_latency_ms);
        let hi = min_latency_ms.max(max_latency_ms);

        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        if !rng.gen_bool(success_rate.clamp(0.0, 1.0)) {
            return ProbeOutcome::Failure;
        }

        let latency = rng.gen_range(lo..=hi);
        // Two decimals, kept inside the configured range.
        let latency = ((latency * 100.0).round() / 100.0).clamp(lo, hi);
        ProbeOutcome::from_latency(latency)
    }
}

#[async_trait::async_trait]
impl Probe for MockProbe {
    fn mode(&self) -> ProbeMode {
        ProbeMode::Mock
    }

    async fn probe(&self, _target: &str, _timeout: Duration) -> ProbeOutcome {
        self.draw()
    }
}
