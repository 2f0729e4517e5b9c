//! Retention sweeper.
//!
//! Deletes partitions whose date key falls strictly before `today - cutoff_days`.
//! Keys that do not parse as dates are left alone.

use chrono::{Days, NaiveDate};

use crate::storage::types::parse_partition_key;
use crate::storage::{SampleStore, StorageError};

/// Outcome of a single sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Partitions removed by this sweep.
    pub deleted: Vec<NaiveDate>,
    /// Keys skipped because they are not dates.
    pub skipped: usize,
    /// Partitions that were due but could not be removed.
    pub failed: usize,
}

/// Prunes partitions older than the retention horizon.
#[derive(Debug, Clone)]
pub struct RetentionSweeper {
    store: SampleStore,
}

impl RetentionSweeper {
    pub fn new(store: SampleStore) -> Self {
        Self { store }
    }

    /// First date that is kept when sweeping on `today`.
    pub fn cutoff(cutoff_days: u32, today: NaiveDate) -> NaiveDate {
        today
            .checked_sub_days(Days::new(u64::from(cutoff_days)))
            .unwrap_or(NaiveDate::MIN)
    }

    /// Delete every partition dated strictly before `today - cutoff_days`.
    ///
    /// Safe to call repeatedly; a second sweep on the same day finds nothing
    /// left to delete. Only listing errors are returned, a partition that
    /// fails to delete is logged and counted in [`SweepReport::failed`].
    pub fn sweep(&self, cutoff_days: u32, today: NaiveDate) -> Result<SweepReport, StorageError> {
        let cutoff = Self::cutoff(cutoff_days, today);
        let mut report = SweepReport::default();

        for key in self.store.list_keys()? {
            let Some(date) = parse_partition_key(&key) else {
                tracing::debug!(key = %key, "Skipping partition with unparseable key");
                report.skipped += 1;
                continue;
            };

            if date >= cutoff {
                continue;
            }

            match self.store.delete(date) {
                Ok(true) => {
                    tracing::info!(date = %key, "Cleaned up old partition");
                    report.deleted.push(date);
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(date = %key, error = %e, "Failed to delete old partition");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}
