//! Core data types for the storage layer.
//!
//! - [`Sample`]: one probe observation, the unit appended to a partition
//! - [`partition_key`]: the `YYYY-MM-DD` identifier of a day's partition

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

/// Date format used for partition keys.
pub const DATE_KEY_FORMAT: &str = "%Y-%m-%d";

/// Format a calendar date as a partition key.
pub fn partition_key(date: NaiveDate) -> String {
    date.format(DATE_KEY_FORMAT).to_string()
}

/// Parse a partition key back into a calendar date.
pub fn parse_partition_key(key: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(key, DATE_KEY_FORMAT).ok()
}

/// One probe observation.
///
/// `success` is always equal to `response_time.is_some()`. The only
/// constructor enforces it, and deserialization re-derives the flag from
/// the latency so hand-edited or stale files cannot break it.
///
/// Serialized shape:
///
/// ```json
/// {"timestamp": "2024-05-01T12:00:00+02:00", "response_time": 12.5, "success": true}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "SampleRecord")]
pub struct Sample {
    /// Instant the probe was issued, in the configured timezone.
    pub timestamp: DateTime<FixedOffset>,
    /// Round-trip latency in milliseconds; `None` when the probe failed.
    pub response_time: Option<f64>,
    /// Whether the probe succeeded.
    pub success: bool,
}

impl Sample {
    /// Create a sample from a probe timestamp and optional latency.
    pub fn new(timestamp: DateTime<FixedOffset>, response_time: Option<f64>) -> Self {
        Self {
            timestamp,
            response_time,
            success: response_time.is_some(),
        }
    }

    /// Create a failed sample.
    pub fn failure(timestamp: DateTime<FixedOffset>) -> Self {
        Self::new(timestamp, None)
    }
}

/// On-disk shape. The stored `success` flag is ignored and re-derived.
#[derive(Deserialize)]
struct SampleRecord {
    timestamp: DateTime<FixedOffset>,
    #[serde(default)]
    response_time: Option<f64>,
}

impl From<SampleRecord> for Sample {
    fn from(record: SampleRecord) -> Self {
        Sample::new(record.timestamp, record.response_time)
    }
}
