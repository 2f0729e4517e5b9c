//! Sampling loop: probe, persist, and prune on a fixed cadence.
//!
//! The loop is the only writer to the [`SampleStore`]. Each cycle:
//!
//! 1. takes the current time in the configured timezone,
//! 2. probes the target (bounded by the probe timeout),
//! 3. appends the sample to that day's partition (bounded by the I/O timeout),
//! 4. runs retention when the cycle starts inside the window after local
//!    midnight, at most once per calendar day,
//! 5. sleeps for the configured interval.
//!
//! Steps 2-3 and step 4 run in separate tasks. A failed or panicking sample
//! step costs that cycle's sample but never the sweep, and the day only
//! counts as swept once a sweep actually returned a report.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::AppConfig;
use crate::probe::Probe;
use crate::storage::{RetentionSweeper, Sample, SampleStore, StorageError, SweepReport};

/// Default timeout for graceful shutdown (5 seconds).
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors produced by a single sampling cycle.
#[derive(Debug, Error)]
pub enum SamplerError {
    /// Appending the sample or sweeping failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The cycle task panicked or was cancelled.
    #[error("sampling task failed: {0}")]
    Task(String),
}

/// Decides when retention runs.
///
/// A sweep is due when the local date has not been swept yet and either the
/// time falls inside the window after local midnight or a startup sweep is
/// still pending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepSchedule {
    window: Duration,
    pending_start: bool,
    last_swept: Option<NaiveDate>,
}

impl SweepSchedule {
    pub fn new(window: Duration, sweep_on_start: bool) -> Self {
        Self {
            window,
            pending_start: sweep_on_start,
            last_swept: None,
        }
    }

    /// Whether `now` falls inside the window after local midnight.
    pub fn in_window(&self, now: &DateTime<Tz>) -> bool {
        Duration::from_secs(u64::from(now.num_seconds_from_midnight())) < self.window
    }

    /// Whether a cycle starting at `now` should sweep.
    pub fn is_due(&self, now: &DateTime<Tz>) -> bool {
        self.last_swept != Some(now.date_naive()) && (self.pending_start || self.in_window(now))
    }

    /// Record a completed sweep for `date`.
    pub fn mark_swept(&mut self, date: NaiveDate) {
        self.last_swept = Some(date);
        self.pending_start = false;
    }

    /// Last local date a sweep completed on.
    pub fn last_swept(&self) -> Option<NaiveDate> {
        self.last_swept
    }
}

/// What one cycle did.
#[derive(Debug)]
pub struct CycleReport {
    /// Partition the sample was meant for.
    pub date: NaiveDate,
    /// The recorded sample, or why it was lost.
    pub sample: Result<Sample, SamplerError>,
    /// Retention result, when the cycle was due to sweep.
    pub sweep: Option<Result<SweepReport, SamplerError>>,
}

struct SamplerInner {
    target: String,
    probe_timeout: Duration,
    interval: Duration,
    sweep_window: Duration,
    sweep_on_start: bool,
    cleanup_days: u32,
    io_timeout: Duration,
    timezone: Tz,
    probe: Arc<dyn Probe>,
    store: SampleStore,
    sweeper: RetentionSweeper,
}

/// Drives probe, store, and sweeper for the lifetime of the process.
#[derive(Clone)]
pub struct Sampler {
    inner: Arc<SamplerInner>,
}

impl std::fmt::Debug for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sampler")
            .field("target", &self.inner.target)
            .field("interval", &self.inner.interval)
            .field("timezone", &self.inner.timezone)
            .field("probe", &self.inner.probe.mode())
            .finish_non_exhaustive()
    }
}

/// Run `fut` in its own task so a panic surfaces as [`SamplerError::Task`].
async fn isolated<T, F>(fut: F) -> Result<T, SamplerError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, SamplerError>> + Send + 'static,
{
    match tokio::spawn(fut).await {
        Ok(result) => result,
        Err(e) => Err(SamplerError::Task(e.to_string())),
    }
}

impl Sampler {
    /// Create a sampler writing to `store` with the injected `probe`.
    pub fn new(config: &AppConfig, probe: Arc<dyn Probe>, store: SampleStore) -> Self {
        let sweeper = RetentionSweeper::new(store.clone());
        Self {
            inner: Arc::new(SamplerInner {
                target: config.sampler.target.clone(),
                probe_timeout: config.probe.timeout,
                interval: config.sampler.effective_interval(),
                sweep_window: config.sampler.sweep_window,
                sweep_on_start: config.sampler.sweep_on_start,
                cleanup_days: config.storage.cleanup_days,
                io_timeout: config.storage.io_timeout,
                timezone: config.storage.timezone,
                probe,
                store,
                sweeper,
            }),
        }
    }

    /// Pause after each cycle, already clamped to the minimum.
    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Current time in the configured timezone.
    pub fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.inner.timezone)
    }

    /// Fresh schedule built from the sampler's configuration.
    pub fn sweep_schedule(&self) -> SweepSchedule {
        SweepSchedule::new(self.inner.sweep_window, self.inner.sweep_on_start)
    }

    /// Probe the target and append the sample to the partition for `now`'s
    /// local date.
    pub async fn record_at(&self, now: DateTime<Tz>) -> Result<Sample, SamplerError> {
        let inner = &self.inner;
        let date = now.date_naive();

        let outcome = inner.probe.probe(&inner.target, inner.probe_timeout).await;
        let sample = Sample::new(now.fixed_offset(), outcome.latency_ms());

        let store = inner.store.clone();
        let record = sample.clone();
        self.blocking(move || store.append(date, record)).await?;

        tracing::info!(
            host = %inner.target,
            date = %date,
            latency_ms = outcome.latency_ms(),
            "Ping {}: {}",
            inner.target,
            outcome
        );
        Ok(sample)
    }

    /// Delete partitions past the retention horizon as seen from `today`.
    pub async fn sweep_on(&self, today: NaiveDate) -> Result<SweepReport, SamplerError> {
        let sweeper = self.inner.sweeper.clone();
        let cutoff_days = self.inner.cleanup_days;
        let report = self
            .blocking(move || sweeper.sweep(cutoff_days, today))
            .await?;

        tracing::info!(
            date = %today,
            cutoff_days,
            deleted = report.deleted.len(),
            skipped = report.skipped,
            failed = report.failed,
            "Retention sweep complete"
        );
        Ok(report)
    }

    /// Run one cycle as if it started at `now`.
    ///
    /// The sweep step runs whenever `schedule` says it is due, regardless of
    /// how the sample step went. `schedule` is only advanced by a sweep that
    /// returned a report.
    pub async fn run_cycle_at(
        &self,
        now: DateTime<Tz>,
        schedule: &mut SweepSchedule,
    ) -> CycleReport {
        let date = now.date_naive();
        let sweep_due = schedule.is_due(&now);

        let sampler = self.clone();
        let sample = isolated(async move { sampler.record_at(now).await }).await;

        let sweep = if sweep_due {
            let sampler = self.clone();
            let result = isolated(async move { sampler.sweep_on(date).await }).await;
            if result.is_ok() {
                schedule.mark_swept(date);
            }
            Some(result)
        } else {
            None
        };

        CycleReport {
            date,
            sample,
            sweep,
        }
    }

    /// Start the loop on the Tokio runtime.
    pub fn spawn(self) -> SamplerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        SamplerHandle { shutdown_tx, task }
    }

    async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        let interval = self.inner.interval;
        tracing::info!(
            host = %self.inner.target,
            interval = ?interval,
            timezone = %self.inner.timezone,
            probe = %self.inner.probe.mode(),
            "Sampler started"
        );

        let mut schedule = self.sweep_schedule();
        // Set once the handle is dropped without a shutdown request.
        let mut detached = false;

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let report = self.run_cycle_at(self.now(), &mut schedule).await;
            match &report.sample {
                Ok(sample) => {
                    tracing::debug!(date = %report.date, success = sample.success, "Cycle complete");
                }
                Err(e) => {
                    tracing::error!(date = %report.date, error = %e, "Error in sampling cycle");
                }
            }
            if let Some(Err(e)) = &report.sweep {
                tracing::error!(date = %report.date, error = %e, "Retention sweep failed, will retry");
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = shutdown_rx.changed(), if !detached => {
                    if changed.is_err() {
                        detached = true;
                        tokio::time::sleep(interval).await;
                    }
                }
            }
        }

        tracing::info!("Sampler stopped");
    }

    /// Run store I/O on the blocking pool, bounded by the I/O timeout.
    async fn blocking<T, F>(&self, op: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, StorageError> + Send + 'static,
    {
        let io_timeout = self.inner.io_timeout;
        match tokio::time::timeout(io_timeout, tokio::task::spawn_blocking(op)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(StorageError::Internal(format!("store task failed: {e}"))),
            Err(_) => Err(StorageError::Timeout(io_timeout)),
        }
    }
}

/// Handle to a running sampling loop.
///
/// Dropping the handle detaches the loop; it then runs until the runtime
/// shuts down.
#[derive(Debug)]
pub struct SamplerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SamplerHandle {
    /// Whether the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Gracefully stop the loop with the default timeout.
    pub async fn shutdown(self) -> Result<(), SamplerError> {
        self.shutdown_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT).await
    }

    /// Signal shutdown and wait for the in-flight cycle to finish.
    ///
    /// The loop is aborted if it does not stop within `timeout`.
    pub async fn shutdown_with_timeout(self, timeout: Duration) -> Result<(), SamplerError> {
        let Self {
            shutdown_tx,
            mut task,
        } = self;

        // Fails only when the loop already exited.
        let _ = shutdown_tx.send(true);

        match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(())) => {
                tracing::info!("Sampler shutdown complete");
                Ok(())
            }
            Ok(Err(e)) => Err(SamplerError::Task(e.to_string())),
            Err(_) => {
                tracing::warn!(timeout = ?timeout, "Sampler shutdown timed out, aborting");
                task.abort();
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MIN_INTERVAL;
    use crate::probe::{MockProbe, MockProbeConfig, ProbeMode, ProbeOutcome};
    use chrono::{Days, TimeZone};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::{TempDir, tempdir};

    fn test_config(dir: &TempDir, timezone: Tz) -> AppConfig {
        let mut config = AppConfig::default();
        config.storage.data_dir = dir.path().to_path_buf();
        config.storage.timezone = timezone;
        config.storage.cleanup_days = 30;
        config.sampler.interval = Duration::from_secs(1);
        config
    }

    fn mock(success_rate: f64) -> Arc<dyn Probe> {
        Arc::new(MockProbe::new(
            MockProbeConfig::default()
                .with_success_rate(success_rate)
                .with_seed(3),
        ))
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Tz> {
        Tz::UTC.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    /// Counts calls and panics on the first one.
    struct FlakyProbe {
        calls: AtomicUsize,
    }

    impl FlakyProbe {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait::async_trait]
    impl Probe for FlakyProbe {
        fn mode(&self) -> ProbeMode {
            ProbeMode::Mock
        }

        async fn probe(&self, _target: &str, _timeout: Duration) -> ProbeOutcome {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("probe exploded");
            }
            ProbeOutcome::from_latency(1.0)
        }
    }

    #[tokio::test]
    async fn test_record_appends_success_sample() {
        let dir = tempdir().unwrap();
        let config = test_config(&dir, Tz::UTC);
        let store = SampleStore::open(dir.path()).unwrap();
        let sampler = Sampler::new(&config, mock(1.0), store.clone());

        let sample = sampler.record_at(utc(2024, 5, 1, 12, 0, 0)).await.unwrap();
        assert!(sample.success);

        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let series = store.read(date);
        assert_eq!(series, vec![sample]);
        let latency = series[0].response_time.unwrap();
        assert!((10.0..=100.0).contains(&latency));
    }

    #[tokio::test]
    async fn test_record_failure_sample() {
        let dir = tempdir().unwrap();
        let config = test_config(&dir, Tz::UTC);
        let store = SampleStore::open(dir.path()).unwrap();
        let sampler = Sampler::new(&config, mock(0.0), store.clone());

        let now = utc(2024, 5, 1, 12, 0, 0);
        sampler.record_at(now).await.unwrap();

        let series = store.read(now.date_naive());
        assert_eq!(series.len(), 1);
        assert!(!series[0].success);
        assert_eq!(series[0].response_time, None);
    }

    #[tokio::test]
    async fn test_record_partitions_by_configured_timezone() {
        let dir = tempdir().unwrap();
        let config = test_config(&dir, chrono_tz::Asia::Tokyo);
        let store = SampleStore::open(dir.path()).unwrap();
        let sampler = Sampler::new(&config, mock(1.0), store.clone());

        // 2024-05-01 16:00 UTC is already 2024-05-02 in Tokyo.
        let now = Utc
            .with_ymd_and_hms(2024, 5, 1, 16, 0, 0)
            .unwrap()
            .with_timezone(&chrono_tz::Asia::Tokyo);
        let sample = sampler.record_at(now).await.unwrap();

        assert_eq!(sample.timestamp.to_rfc3339(), "2024-05-02T01:00:00+09:00");
        let date = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        assert_eq!(store.read(date).len(), 1);
    }

    #[tokio::test]
    async fn test_cycle_sweep_prunes_expired_partitions() {
        let dir = tempdir().unwrap();
        let config = test_config(&dir, Tz::UTC);
        let store = SampleStore::open(dir.path()).unwrap();
        let sampler = Sampler::new(&config, mock(1.0), store.clone());
        let mut schedule = sampler.sweep_schedule();

        let now = utc(2024, 5, 1, 0, 0, 30);
        let today = now.date_naive();
        let expired = today - Days::new(31);
        let kept = today - Days::new(30);
        for date in [expired, kept] {
            store
                .append(date, Sample::failure(now.fixed_offset()))
                .unwrap();
        }

        let report = sampler.run_cycle_at(now, &mut schedule).await;
        assert!(report.sample.is_ok());
        let sweep = report.sweep.unwrap().unwrap();
        assert_eq!(sweep.deleted, vec![expired]);
        assert_eq!(schedule.last_swept(), Some(today));

        let keys = store.list_keys().unwrap();
        assert!(keys.contains(&kept.to_string()));
        assert!(keys.contains(&today.to_string()));
        assert!(!keys.contains(&expired.to_string()));
    }

    #[test]
    fn test_sweep_window() {
        let schedule = SweepSchedule::new(Duration::from_secs(120), false);

        assert!(schedule.in_window(&utc(2024, 5, 1, 0, 0, 0)));
        assert!(schedule.in_window(&utc(2024, 5, 1, 0, 1, 59)));
        assert!(!schedule.in_window(&utc(2024, 5, 1, 0, 2, 0)));
        assert!(!schedule.in_window(&utc(2024, 5, 1, 12, 0, 0)));
        assert!(!schedule.in_window(&utc(2024, 5, 1, 23, 59, 59)));
    }

    #[test]
    fn test_schedule_unswept_day_stays_due() {
        let mut schedule = SweepSchedule::new(Duration::from_secs(120), true);
        let noon = utc(2024, 5, 1, 12, 0, 0);

        // Startup sweep stays pending until one completes.
        assert!(schedule.is_due(&noon));
        assert!(schedule.is_due(&utc(2024, 5, 1, 12, 1, 0)));

        schedule.mark_swept(noon.date_naive());
        assert!(!schedule.is_due(&utc(2024, 5, 1, 12, 2, 0)));
        assert!(!schedule.is_due(&utc(2024, 5, 1, 23, 59, 0)));
        assert!(schedule.is_due(&utc(2024, 5, 2, 0, 0, 10)));
        assert!(!schedule.is_due(&utc(2024, 5, 2, 0, 5, 0)));
    }

    #[tokio::test]
    async fn test_cycles_sweep_once_per_day() {
        let dir = tempdir().unwrap();
        let config = test_config(&dir, Tz::UTC);
        let store = SampleStore::open(dir.path()).unwrap();
        let sampler = Sampler::new(&config, mock(1.0), store);
        let mut schedule = sampler.sweep_schedule();

        let swept = [
            (utc(2024, 5, 1, 12, 0, 0), false),
            (utc(2024, 5, 2, 0, 0, 30), true),
            (utc(2024, 5, 2, 0, 1, 30), false),
            (utc(2024, 5, 2, 13, 0, 0), false),
            (utc(2024, 5, 3, 0, 1, 0), true),
        ];
        for (now, expected) in swept {
            let report = sampler.run_cycle_at(now, &mut schedule).await;
            assert!(report.sample.is_ok());
            assert_eq!(report.sweep.is_some(), expected, "cycle at {now}");
        }
        assert_eq!(
            schedule.last_swept(),
            NaiveDate::from_ymd_opt(2024, 5, 3)
        );
    }

    #[tokio::test]
    async fn test_panicking_sample_step_still_sweeps() {
        let dir = tempdir().unwrap();
        let mut config = test_config(&dir, Tz::UTC);
        config.sampler.sweep_on_start = true;
        let store = SampleStore::open(dir.path()).unwrap();
        let sampler = Sampler::new(&config, FlakyProbe::new(), store.clone());
        let mut schedule = sampler.sweep_schedule();

        let now = utc(2024, 5, 1, 12, 0, 0);
        let expired = now.date_naive() - Days::new(400);
        store
            .append(expired, Sample::failure(now.fixed_offset()))
            .unwrap();

        let report = sampler.run_cycle_at(now, &mut schedule).await;
        assert!(matches!(report.sample, Err(SamplerError::Task(_))));
        assert_eq!(report.sweep.unwrap().unwrap().deleted, vec![expired]);
        assert!(!store.list_keys().unwrap().contains(&expired.to_string()));

        let report = sampler.run_cycle_at(now, &mut schedule).await;
        assert!(report.sample.is_ok());
        assert!(report.sweep.is_none());
    }

    #[tokio::test]
    async fn test_failed_append_still_sweeps() {
        let dir = tempdir().unwrap();
        let data_dir = dir.path().join("data");
        let mut config = test_config(&dir, Tz::UTC);
        config.storage.data_dir = data_dir.clone();
        let store = SampleStore::open(&data_dir).unwrap();
        let sampler = Sampler::new(&config, mock(1.0), store);
        let mut schedule = sampler.sweep_schedule();

        // Appends cannot create their temp file once the directory is gone.
        std::fs::remove_dir_all(&data_dir).unwrap();

        let now = utc(2024, 5, 1, 0, 0, 5);
        let report = sampler.run_cycle_at(now, &mut schedule).await;
        assert!(matches!(report.sample, Err(SamplerError::Storage(_))));
        assert!(report.sweep.unwrap().is_ok());
        assert_eq!(schedule.last_swept(), Some(now.date_naive()));
    }

    #[test]
    fn test_interval_clamped_once() {
        let dir = tempdir().unwrap();
        let mut config = test_config(&dir, Tz::UTC);
        config.sampler.interval = Duration::from_millis(10);
        let store = SampleStore::open(dir.path()).unwrap();

        let sampler = Sampler::new(&config, mock(1.0), store);
        assert_eq!(sampler.interval(), MIN_INTERVAL);
    }

    async fn wait_for_samples(store: &SampleStore, sampler: &Sampler, count: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            if store.read(sampler.now().date_naive()).len() >= count {
                return;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "sampler did not record {count} samples in time"
            );
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    #[tokio::test]
    async fn test_spawn_and_shutdown() {
        let dir = tempdir().unwrap();
        let config = test_config(&dir, Tz::UTC);
        let store = SampleStore::open(dir.path()).unwrap();
        let sampler = Sampler::new(&config, mock(1.0), store.clone());

        let handle = sampler.clone().spawn();
        wait_for_samples(&store, &sampler, 1).await;
        assert!(!handle.is_finished());

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_loop_survives_panic_and_still_sweeps() {
        let dir = tempdir().unwrap();
        let mut config = test_config(&dir, Tz::UTC);
        config.sampler.sweep_on_start = true;
        let store = SampleStore::open(dir.path()).unwrap();
        let probe = FlakyProbe::new();
        let sampler = Sampler::new(&config, probe.clone(), store.clone());

        let expired = sampler.now().date_naive() - Days::new(400);
        store
            .append(expired, Sample::failure(sampler.now().fixed_offset()))
            .unwrap();

        let handle = sampler.clone().spawn();
        wait_for_samples(&store, &sampler, 1).await;

        assert!(probe.calls.load(Ordering::SeqCst) >= 2);
        assert!(
            !store.list_keys().unwrap().contains(&expired.to_string()),
            "expired partition survived"
        );
        handle.shutdown().await.unwrap();
    }
}
