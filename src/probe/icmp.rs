//! ICMP echo probe over a raw (or unprivileged datagram) socket.

use std::net::IpAddr;
use std::time::Duration;

use surge_ping::{Client, Config, ICMP, PingIdentifier, PingSequence};
use tokio::time::timeout;

use crate::probe::{Probe, ProbeMode, ProbeOutcome};

/// Resolve hostname to IP address.
async fn resolve_host(host: &str) -> Result<IpAddr, std::io::Error> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }

    let addrs = tokio::net::lookup_host(format!("{host}:0")).await?;
    addrs
        .into_iter()
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses found"))
}

/// Sends one ICMP echo request per check via `surge-ping`.
///
/// The socket is owned by a per-check client and closed when the check
/// returns, timeout included.
#[derive(Debug, Clone, Default)]
pub struct IcmpProbe;

impl IcmpProbe {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl Probe for IcmpProbe {
    fn mode(&self) -> ProbeMode {
        ProbeMode::Icmp
    }

    async fn probe(&self, target: &str, probe_timeout: Duration) -> ProbeOutcome {
        let ip_addr = match timeout(probe_timeout, resolve_host(target)).await {
            Ok(Ok(ip)) => ip,
            Ok(Err(e)) => {
                tracing::warn!(host = %target, error = %e, "Failed to resolve hostname");
                return ProbeOutcome::Failure;
            }
            Err(_) => {
                tracing::warn!(host = %target, "Hostname resolution timed out");
                return ProbeOutcome::Failure;
            }
        };

        let client = match ip_addr {
            IpAddr::V4(_) => Client::new(&Config::default()),
            IpAddr::V6(_) => Client::new(&Config::builder().kind(ICMP::V6).build()),
        };

        let client = match client {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(host = %target, error = %e, "Failed to create ICMP client");
                return ProbeOutcome::Failure;
            }
        };

        let mut pinger = client.pinger(ip_addr, PingIdentifier(rand::random())).await;
        pinger.timeout(probe_timeout);

        match timeout(probe_timeout, pinger.ping(PingSequence(0), &[])).await {
            Ok(Ok((_, rtt))) => ProbeOutcome::from_latency(rtt.as_secs_f64() * 1000.0),
            Ok(Err(e)) => {
                tracing::warn!(host = %target, error = %e, "ICMP probe failed");
                ProbeOutcome::Failure
            }
            Err(_) => {
                tracing::warn!(
                    host = %target,
                    timeout_ms = probe_timeout.as_millis(),
                    "ICMP probe timed out"
                );
                ProbeOutcome::Failure
            }
        }
    }
}
