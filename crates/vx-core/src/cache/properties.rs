use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use time::format_description::well_known::Rfc3339;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

use super::CacheError;

pub(crate) const PROPERTIES_FILE: &str = "cache.properties";
pub(crate) const KEY_PREFIX: &str = "prefix";
pub(crate) const KEY_LAST_MODIFIED: &str = "lastModifiedDate";

/// Timestamps in the manifest are whole-second UTC, `2024-01-01T10:00:00Z`.
const TIMESTAMP: &[BorrowedFormatItem<'_>] =
    format_description!(version = 2, "[year]-[month]-[day]T[hour]:[minute]:[second]Z");

pub(crate) fn format_timestamp(value: OffsetDateTime) -> Result<String, CacheError> {
    value
        .to_offset(UtcOffset::UTC)
        .format(TIMESTAMP)
        .map_err(|err| CacheError::Manifest(format!("unrepresentable timestamp: {err}")))
}

pub(crate) fn parse_timestamp(value: &str) -> Result<OffsetDateTime, CacheError> {
    OffsetDateTime::parse(value, &Rfc3339)
        .map(|ts| ts.to_offset(UtcOffset::UTC))
        .map_err(|err| CacheError::Manifest(format!("malformed timestamp `{value}`: {err}")))
}

/// The `cache.properties` manifest: sorted `key=value` lines.
#[derive(Debug)]
pub struct CacheProperties {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl CacheProperties {
    /// Loads the manifest from `directory`; a missing file yields an empty
    /// manifest.
    pub fn load(directory: &Path) -> Result<Self, CacheError> {
        let path = directory.join(PROPERTIES_FILE);
        let mut entries = BTreeMap::new();
        match fs::read_to_string(&path) {
            Ok(contents) => {
                for line in contents.lines() {
                    let line = line.trim();
                    if line.is_empty() || line.starts_with('#') {
                        continue;
                    }
                    if let Some((key, value)) = line.split_once('=') {
                        entries.insert(key.trim().to_string(), value.trim().to_string());
                    }
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(CacheError::Io {
                    path,
                    source,
                })
            }
        }
        Ok(Self { path, entries })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn timestamp(&self, key: &str) -> Result<Option<OffsetDateTime>, CacheError> {
        self.get(key).map(parse_timestamp).transpose()
    }

    pub fn set_timestamp(
        &mut self,
        key: impl Into<String>,
        value: OffsetDateTime,
    ) -> Result<(), CacheError> {
        let text = format_timestamp(value)?;
        self.set(key, text);
        Ok(())
    }

    /// Writes the manifest atomically next to the partitions it describes.
    pub fn save(&self) -> Result<(), CacheError> {
        let directory = self.path.parent().unwrap_or_else(|| Path::new("."));
        let io_err = |source| CacheError::Io {
            path: self.path.clone(),
            source,
        };
        let mut tmp = tempfile::NamedTempFile::new_in(directory).map_err(io_err)?;
        for (key, value) in &self.entries {
            writeln!(tmp, "{key}={value}").map_err(io_err)?;
        }
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&self.path).map_err(|err| CacheError::Io {
            path: self.path.clone(),
            source: err.error,
        })?;
        Ok(())
    }
}
