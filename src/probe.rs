//! Probe Layer
//!
//! Bounded-time reachability checks behind the [`Probe`] strategy trait.
//! The implementation is chosen once at startup from [`ProbeConfig`] and
//! injected into the sampler; nothing downstream branches on the mode.
//!
//! - [`CommandProbe`]: system `ping` subprocess
//! - [`IcmpProbe`]: raw-socket ICMP echo
//! - [`MockProbe`]: seeded synthetic latencies

mod command;
mod icmp;
mod mock;
mod traits;

use std::sync::Arc;

use crate::config::ProbeConfig;

pub use command::{CommandProbe, DEFAULT_PROCESS_GRACE, parse_latency};
pub use icmp::IcmpProbe;
pub use mock::{MockProbe, MockProbeConfig};
pub use traits::{Probe, ProbeMode, ProbeOutcome};

/// Build the probe selected by `config`.
pub fn build_probe(config: &ProbeConfig) -> Arc<dyn Probe> {
    match config.mode {
        ProbeMode::Command => Arc::new(CommandProbe::new(config.process_grace)),
        ProbeMode::Icmp => Arc::new(IcmpProbe::new()),
        ProbeMode::Mock => Arc::new(MockProbe::new(config.mock.clone())),
    }
}
