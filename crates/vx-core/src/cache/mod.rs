//! Year-partitioned persistence for CVE records.
//!
//! Records live in one partition per publication year (everything before
//! 2002 folds into "2002"), plus a derived "modified" partition holding
//! whatever changed during the last seven days. Each partition is a gzipped
//! JSON envelope with a sidecar carrying sizes and a digest; the
//! `cache.properties` manifest ties the set together.

mod partition;
mod properties;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use time::{Duration, OffsetDateTime};
use vx_nvd::{Cve, CveItem};

pub use partition::PartitionMeta;
pub use properties::CacheProperties;

use properties::{KEY_LAST_MODIFIED, KEY_PREFIX};

pub const DEFAULT_PREFIX: &str = "nvdcve-";
pub const MODIFIED_PARTITION: &str = "modified";
/// Records published before this year land in the first partition.
pub const FIRST_PARTITION_YEAR: i32 = 2002;
/// How far back a change keeps a record in the "modified" partition.
const MODIFIED_WINDOW: Duration = Duration::days(7);

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to decode cached partition {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("unable to encode partition {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid cache manifest: {0}")]
    Manifest(String),
}

/// In-memory view of the on-disk cache for the duration of one run.
///
/// Owned exclusively by the orchestrator; loading, merging, and writing are
/// single-threaded. Nothing is written back to disk until [`CacheStore::write`].
pub struct CacheStore {
    directory: PathBuf,
    prefix: String,
    properties: CacheProperties,
    years: BTreeMap<i32, BTreeMap<String, Cve>>,
    now: OffsetDateTime,
}

impl CacheStore {
    /// Opens (or initializes) the cache under `directory`.
    pub fn open(directory: &Path, prefix: Option<&str>) -> Result<Self, CacheError> {
        Self::open_at(directory, prefix, OffsetDateTime::now_utc())
    }

    /// As [`CacheStore::open`], with an explicit run clock.
    pub fn open_at(
        directory: &Path,
        prefix: Option<&str>,
        now: OffsetDateTime,
    ) -> Result<Self, CacheError> {
        fs::create_dir_all(directory).map_err(|source| CacheError::Io {
            path: directory.to_path_buf(),
            source,
        })?;
        let mut properties = CacheProperties::load(directory)?;
        let prefix = prefix
            .or_else(|| properties.get(KEY_PREFIX))
            .unwrap_or(DEFAULT_PREFIX)
            .to_string();
        properties.set(KEY_PREFIX, prefix.clone());

        let mut years = BTreeMap::new();
        for year in FIRST_PARTITION_YEAR..=now.year() {
            let path = directory.join(format!("{prefix}{year}.json.gz"));
            if let Some(envelope) = partition::read_partition(&path)? {
                let records: BTreeMap<String, Cve> = envelope
                    .vulnerabilities
                    .into_iter()
                    .map(|item| (item.cve.id.clone(), item.cve))
                    .collect();
                if !records.is_empty() {
                    years.insert(year, records);
                }
            }
        }
        let loaded: usize = years.values().map(BTreeMap::len).sum();
        tracing::debug!(
            directory = %directory.display(),
            partitions = years.len(),
            records = loaded,
            "cache loaded"
        );

        Ok(Self {
            directory: directory.to_path_buf(),
            prefix,
            properties,
            years,
            now,
        })
    }

    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The run clock captured when the store was opened.
    #[must_use]
    pub fn run_clock(&self) -> OffsetDateTime {
        self.now
    }

    #[must_use]
    pub fn record_count(&self) -> usize {
        self.years.values().map(BTreeMap::len).sum()
    }

    /// Manifest-wide `lastModifiedDate`, if a previous run recorded one.
    pub fn last_modified(&self) -> Result<Option<OffsetDateTime>, CacheError> {
        self.properties.timestamp(KEY_LAST_MODIFIED)
    }

    /// Raises the manifest `lastModifiedDate`; values older than the current
    /// one are ignored so the manifest stays monotonic.
    pub fn note_last_modified(&mut self, value: OffsetDateTime) -> Result<(), CacheError> {
        let current = self.last_modified()?;
        if current.map_or(true, |existing| value > existing) {
            self.properties.set_timestamp(KEY_LAST_MODIFIED, value)?;
        }
        Ok(())
    }

    /// Upserts records by id, last write wins.
    pub fn merge<I>(&mut self, items: I)
    where
        I: IntoIterator<Item = CveItem>,
    {
        for item in items {
            let cve = item.cve;
            let year = cve.published.year().max(FIRST_PARTITION_YEAR);
            self.years.entry(year).or_default().insert(cve.id.clone(), cve);
        }
    }

    /// Ids held by a year partition, ascending. Mostly useful to inspect the
    /// store after a merge.
    #[must_use]
    pub fn partition_ids(&self, year: i32) -> Vec<&str> {
        self.years
            .get(&year)
            .map(|records| records.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Records currently inside the seven-day modified window, ascending by
    /// id.
    #[must_use]
    pub fn modified_ids(&self) -> Vec<&str> {
        let cutoff = self.now - MODIFIED_WINDOW;
        let mut ids: Vec<&str> = self
            .years
            .values()
            .flat_map(|records| records.values())
            .filter(|cve| cve.last_modified >= cutoff)
            .map(|cve| cve.id.as_str())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Rewrites every populated partition, rebuilds "modified", and persists
    /// the manifest.
    pub fn write(&mut self) -> Result<(), CacheError> {
        let manifest_fallback = self.last_modified()?.unwrap_or(self.now);

        for (year, records) in &self.years {
            let stamp = records
                .values()
                .map(|cve| cve.last_modified)
                .max()
                .unwrap_or(manifest_fallback);
            let stem = format!("{}{year}", self.prefix);
            partition::write_partition(&self.directory, &stem, stamp, records.values())?;
            self.properties
                .set_timestamp(format!("{KEY_LAST_MODIFIED}.{year}"), stamp)?;
        }

        let cutoff = self.now - MODIFIED_WINDOW;
        let modified: BTreeMap<&str, &Cve> = self
            .years
            .values()
            .flat_map(|records| records.values())
            .filter(|cve| cve.last_modified >= cutoff)
            .map(|cve| (cve.id.as_str(), cve))
            .collect();
        let stamp = modified
            .values()
            .map(|cve| cve.last_modified)
            .max()
            .unwrap_or(manifest_fallback);
        let stem = format!("{}{MODIFIED_PARTITION}", self.prefix);
        partition::write_partition(&self.directory, &stem, stamp, modified.values().copied())?;
        self.properties
            .set_timestamp(format!("{KEY_LAST_MODIFIED}.{MODIFIED_PARTITION}"), stamp)?;

        self.properties.save()?;
        tracing::info!(
            partitions = self.years.len() + 1,
            records = self.record_count(),
            "cache written"
        );
        Ok(())
    }
}
