//! Probe backed by the system `ping` utility.
//!
//! Runs `ping -c 1 -W <secs> <target>` and parses the round-trip time from
//! its output. Works without raw-socket privileges on hosts where the
//! `ping` binary is setuid or has file capabilities.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;

use crate::probe::{Probe, ProbeMode, ProbeOutcome};

/// Default program name.
pub const DEFAULT_PROGRAM: &str = "ping";

/// Default extra budget for process startup and teardown.
pub const DEFAULT_PROCESS_GRACE: Duration = Duration::from_secs(5);

/// Extract the round-trip time in milliseconds from `ping` output.
///
/// Accepts `time=12.3 ms` with or without a space before the unit. Some
/// `ping` builds print `time<1 ms` for sub-resolution replies; that form is
/// read as its upper bound (`1.0` here), so the recorded latency is rounded up.
pub fn parse_latency(output: &str) -> Option<f64> {
    output.lines().find_map(|line| {
        let start = line
            .find("time=")
            .or_else(|| line.find("time<"))
            .map(|i| i + "time=".len())?;
        let token = line[start..].split_whitespace().next()?;
        token.trim_end_matches("ms").parse::<f64>().ok()
    })
}

/// Shells out to `ping` for each check.
#[derive(Debug, Clone)]
pub struct CommandProbe {
    program: String,
    process_grace: Duration,
}

impl Default for CommandProbe {
    fn default() -> Self {
        Self::new(DEFAULT_PROCESS_GRACE)
    }
}

impl CommandProbe {
    /// Create a probe whose hard wall-clock bound is `timeout + process_grace`.
    pub fn new(process_grace: Duration) -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            process_grace,
        }
    }

    /// Use a different executable (e.g., an absolute path to `ping`).
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn args(target: &str, probe_timeout: Duration) -> Vec<String> {
        let wait_secs = probe_timeout.as_secs().max(1);
        vec![
            "-c".to_string(),
            "1".to_string(),
            "-W".to_string(),
            wait_secs.to_string(),
            target.to_string(),
        ]
    }
}

#[async_trait::async_trait]
impl Probe for CommandProbe {
    fn mode(&self) -> ProbeMode {
        ProbeMode::Command
    }

    async fn probe(&self, target: &str, probe_timeout: Duration) -> ProbeOutcome {
        let child = Command::new(&self.program)
            .args(Self::args(target, probe_timeout))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(
                    program = %self.program,
                    host = %target,
                    error = %e,
                    "Failed to spawn ping"
                );
                return ProbeOutcome::Failure;
            }
        };

        // Dropping the child on timeout kills it.
        let bound = probe_timeout + self.process_grace;
        let output = match timeout(bound, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                tracing::warn!(host = %target, error = %e, "Ping process failed");
                return ProbeOutcome::Failure;
            }
            Err(_) => {
                tracing::warn!(
                    host = %target,
                    timeout_ms = bound.as_millis(),
                    "Ping process timed out"
                );
                return ProbeOutcome::Failure;
            }
        };

        if !output.status.success() {
            tracing::debug!(host = %target, status = %output.status, "Ping reported failure");
            return ProbeOutcome::Failure;
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        match parse_latency(&stdout) {
            Some(latency_ms) => ProbeOutcome::from_latency(latency_ms),
            None => {
                tracing::warn!(host = %target, "Could not parse latency from ping output");
                ProbeOutcome::Failure
            }
        }
    }
}
