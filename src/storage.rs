//! Storage Layer
//!
//! Flat-file persistence of probe samples, one JSON partition per calendar day:
//! - **Writer**: the sampling loop, serialized by a single-writer lock
//! - **Readers**: API handlers, lock-free thanks to atomic temp-file renames
//!
//! # Components
//!
//! - [`SampleStore`]: append / read / delete / list over day partitions
//! - [`RetentionSweeper`]: prunes partitions beyond the retention horizon
//! - [`Sample`]: the persisted observation

mod error;
mod retention;
mod store;
mod types;

pub use error::StorageError;
pub use retention::{RetentionSweeper, SweepReport};
pub use store::{FILE_PREFIX, FILE_SUFFIX, SampleStore};
pub use types::{DATE_KEY_FORMAT, Sample, parse_partition_key, partition_key};
