//! netpulse - Network Stability Sampler
//!
//! Periodically probes a fixed target host, persists timestamped samples in
//! one JSON partition per calendar day, prunes partitions past a retention
//! horizon, and serves today's series and summary statistics over HTTP.
//!
//! # Architecture
//!
//! - **Probe**: bounded-time reachability check (system `ping`, raw ICMP, or mock)
//! - **Storage**: date-partitioned append-only store and retention sweeper
//! - **Sampler**: the single writer, a cancellable background loop
//! - **Query**: read-only aggregation for API handlers
//! - **Server**: Axum router exposing `/`, `/api/data` and `/api/stats`
//!
//! # Example
//!
//! ```rust,no_run
//! use netpulse::{AppConfig, QueryService, SampleStore, Sampler, build_probe};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::default();
//! let store = SampleStore::open(&config.storage.data_dir)?;
//!
//! let handle = Sampler::new(&config, build_probe(&config.probe), store.clone()).spawn();
//! let query = QueryService::new(store, config.storage.timezone);
//! println!("{:?}", query.today_stats());
//!
//! handle.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod probe;
pub mod query;
pub mod sampler;
pub mod server;
pub mod storage;

pub use config::{AppConfig, ConfigError};
pub use probe::{CommandProbe, IcmpProbe, MockProbe, Probe, ProbeMode, ProbeOutcome, build_probe};
pub use query::{QueryService, Stats};
pub use sampler::{Sampler, SamplerError, SamplerHandle, SweepSchedule};
pub use storage::{RetentionSweeper, Sample, SampleStore, StorageError};
