//! Date-partitioned sample store backed by one JSON file per day.
//!
//! Single-writer discipline: appends are serialized by a mutex and land via
//! write-to-temp-then-rename, so readers only ever observe a complete
//! partition (the state before or after an append, never a mix).

use std::collections::BTreeSet;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{NaiveDate, Utc};
use tempfile::NamedTempFile;

use crate::storage::StorageError;
use crate::storage::types::{Sample, partition_key};

/// Partition file name prefix.
pub const FILE_PREFIX: &str = "ping_data_";

/// Partition file name suffix.
pub const FILE_SUFFIX: &str = ".json";

/// Marker inserted into the name of a quarantined partition.
const QUARANTINE_MARKER: &str = ".corrupt-";

/// Result of loading a partition file.
enum Loaded {
    Missing,
    Samples(Vec<Sample>),
    Corrupt(String),
}

fn load_partition(path: &Path) -> Loaded {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Loaded::Missing,
        Err(e) => return Loaded::Corrupt(e.to_string()),
    };

    match serde_json::from_slice(&bytes) {
        Ok(samples) => Loaded::Samples(samples),
        Err(e) => Loaded::Corrupt(e.to_string()),
    }
}

struct StoreInner {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

/// Append-only, date-partitioned persistence of [`Sample`]s.
///
/// Cheap to clone; clones share the same directory and writer lock.
#[derive(Clone)]
pub struct SampleStore {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for SampleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleStore")
            .field("dir", &self.inner.dir)
            .finish_non_exhaustive()
    }
}

impl SampleStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| {
            StorageError::Internal(format!(
                "failed to create data directory '{}': {}",
                dir.display(),
                e
            ))
        })?;

        Ok(Self {
            inner: Arc::new(StoreInner {
                dir,
                write_lock: Mutex::new(()),
            }),
        })
    }

    /// Root directory holding the partition files.
    pub fn data_dir(&self) -> &Path {
        &self.inner.dir
    }

    /// Path of the partition file for `date`.
    pub fn partition_path(&self, date: NaiveDate) -> PathBuf {
        self.inner
            .dir
            .join(format!("{FILE_PREFIX}{}{FILE_SUFFIX}", partition_key(date)))
    }

    /// Append a sample to the partition for `date`.
    ///
    /// An unreadable or malformed partition is moved aside under a
    /// quarantine name and replaced by a fresh one holding just `sample`;
    /// the new sample is never dropped because of old data.
    pub fn append(&self, date: NaiveDate, sample: Sample) -> Result<(), StorageError> {
        let _guard = self
            .inner
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let path = self.partition_path(date);
        let mut samples = match load_partition(&path) {
            Loaded::Missing => Vec::new(),
            Loaded::Samples(samples) => samples,
            Loaded::Corrupt(reason) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %reason,
                    "Partition unreadable, starting a fresh one"
                );
                self.quarantine(&path);
                Vec::new()
            }
        };

        samples.push(sample);
        self.write_atomic(&path, &samples)
    }

    /// Read every sample recorded for `date`, in append order.
    ///
    /// Returns an empty series when the partition is absent or unreadable.
    pub fn read(&self, date: NaiveDate) -> Vec<Sample> {
        let path = self.partition_path(date);
        match load_partition(&path) {
            Loaded::Samples(samples) => samples,
            Loaded::Missing => Vec::new(),
            Loaded::Corrupt(reason) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %reason,
                    "Partition unreadable, returning empty series"
                );
                Vec::new()
            }
        }
    }

    /// Delete the partition for `date`.
    ///
    /// Returns `Ok(false)` when there was nothing to delete.
    pub fn delete(&self, date: NaiveDate) -> Result<bool, StorageError> {
        match fs::remove_file(self.partition_path(date)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Enumerate the keys of all partitions currently on disk.
    ///
    /// Keys are returned raw; a file such as `ping_data_backup.json` yields
    /// the key `backup`, which callers are expected to reject when parsing.
    pub fn list_keys(&self) -> Result<BTreeSet<String>, StorageError> {
        let entries = match fs::read_dir(&self.inner.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = BTreeSet::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }

            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };

            if let Some(key) = name
                .strip_prefix(FILE_PREFIX)
                .and_then(|rest| rest.strip_suffix(FILE_SUFFIX))
            {
                keys.insert(key.to_string());
            }
        }

        Ok(keys)
    }

    fn write_atomic(&self, path: &Path, samples: &[Sample]) -> Result<(), StorageError> {
        let json = serde_json::to_vec_pretty(samples)?;

        let mut tmp = NamedTempFile::new_in(&self.inner.dir)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path)?;
        Ok(())
    }

    fn quarantine(&self, path: &Path) {
        let mut target = path.as_os_str().to_owned();
        target.push(format!("{QUARANTINE_MARKER}{}", Utc::now().timestamp()));
        let target = PathBuf::from(target);

        match fs::rename(path, &target) {
            Ok(()) => tracing::warn!(
                path = %path.display(),
                quarantined = %target.display(),
                "Quarantined corrupt partition"
            ),
            Err(e) => tracing::error!(
                path = %path.display(),
                error = %e,
                "Failed to quarantine corrupt partition, it will be overwritten"
            ),
        }
    }
}
