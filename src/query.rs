//! Read-only aggregation over the sample store.
//!
//! Every call reads the partition afresh; there is no cached or incremental
//! state, so two calls over the same data always agree.

use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::storage::{Sample, SampleStore};

/// Summary statistics for one day's series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub total_pings: usize,
    pub successful_pings: usize,
    pub failed_pings: usize,
    /// Percentage of successful samples, `0` for an empty series.
    pub success_rate: f64,
    /// Mean latency of successful samples in ms, two decimals, `0` when none.
    pub avg_response_time: f64,
}

impl Stats {
    /// Compute statistics from a series.
    pub fn from_samples(samples: &[Sample]) -> Self {
        let total = samples.len();
        if total == 0 {
            return Self::default();
        }

        let latencies: Vec<f64> = samples.iter().filter_map(|s| s.response_time).collect();
        let successful = latencies.len();

        let avg = if successful == 0 {
            0.0
        } else {
            latencies.iter().sum::<f64>() / successful as f64
        };

        Self {
            total_pings: total,
            successful_pings: successful,
            failed_pings: total - successful,
            success_rate: successful as f64 / total as f64 * 100.0,
            avg_response_time: (avg * 100.0).round() / 100.0,
        }
    }
}

/// Answers API reads for "today" in the configured timezone.
#[derive(Debug, Clone)]
pub struct QueryService {
    store: SampleStore,
    timezone: Tz,
}

impl QueryService {
    pub fn new(store: SampleStore, timezone: Tz) -> Self {
        Self { store, timezone }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Today's date in the configured timezone, the same key the sampler writes to.
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.timezone).date_naive()
    }

    /// Today's samples in append order.
    pub fn today_series(&self) -> Vec<Sample> {
        self.series_for(self.today())
    }

    /// Statistics over today's samples.
    pub fn today_stats(&self) -> Stats {
        self.stats_for(self.today())
    }

    /// Samples recorded for `date`, in append order.
    pub fn series_for(&self, date: NaiveDate) -> Vec<Sample> {
        self.store.read(date)
    }

    /// Statistics over the samples recorded for `date`.
    pub fn stats_for(&self, date: NaiveDate) -> Stats {
        Stats::from_samples(&self.series_for(date))
    }
}
