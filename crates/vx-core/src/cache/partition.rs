use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use vx_nvd::{timestamp, Cve, CveApiResponse, ENVELOPE_FORMAT, ENVELOPE_VERSION};

use super::properties::{format_timestamp, parse_timestamp};
use super::CacheError;

/// Sidecar describing one written partition.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionMeta {
    pub last_modified: OffsetDateTime,
    /// Uncompressed size of the JSON envelope in bytes.
    pub size: u64,
    /// On-disk size of the gzipped payload in bytes.
    pub gz_size: u64,
    /// Lowercase hex SHA-256 of the compressed bytes.
    pub sha256: String,
}

impl PartitionMeta {
    pub fn to_sidecar_text(&self) -> Result<String, CacheError> {
        Ok(format!(
            "lastModifiedDate:{}\nsize:{}\ngzSize:{}\nsha256:{}\n",
            format_timestamp(self.last_modified)?,
            self.size,
            self.gz_size,
            self.sha256
        ))
    }

    pub fn parse(text: &str) -> Result<Self, CacheError> {
        let mut last_modified = None;
        let mut size = None;
        let mut gz_size = None;
        let mut sha256 = None;
        for line in text.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            match key {
                "lastModifiedDate" => last_modified = Some(parse_timestamp(value)?),
                "size" => size = value.parse().ok(),
                "gzSize" => gz_size = value.parse().ok(),
                "sha256" => sha256 = Some(value.to_string()),
                _ => {}
            }
        }
        match (last_modified, size, gz_size, sha256) {
            (Some(last_modified), Some(size), Some(gz_size), Some(sha256)) => Ok(Self {
                last_modified,
                size,
                gz_size,
                sha256,
            }),
            _ => Err(CacheError::Manifest(
                "sidecar is missing one of lastModifiedDate/size/gzSize/sha256".to_string(),
            )),
        }
    }
}

/// Serialization view over a sorted record set; avoids cloning payloads when
/// writing a partition.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeView<'a> {
    results_per_page: u32,
    start_index: u32,
    total_results: u32,
    format: &'static str,
    version: &'static str,
    #[serde(serialize_with = "serialize_timestamp")]
    timestamp: OffsetDateTime,
    vulnerabilities: Vec<ItemView<'a>>,
}

#[derive(Serialize)]
struct ItemView<'a> {
    cve: &'a Cve,
}

fn serialize_timestamp<S>(value: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    timestamp::serialize(value, serializer)
}

struct DigestWriter<W: Write> {
    inner: W,
    hasher: Sha256,
    written: u64,
}

impl<W: Write> DigestWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            written: 0,
        }
    }

    fn into_parts(self) -> (W, String, u64) {
        (self.inner, hex::encode(self.hasher.finalize()), self.written)
    }
}

impl<W: Write> Write for DigestWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        self.written += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct CountingWriter<W: Write> {
    inner: W,
    written: u64,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.written += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Streams `records` (already sorted by id) into `<stem>.json.gz` plus its
/// `.meta` sidecar, accumulating the digest over the compressed bytes.
///
/// Both files are staged as temporaries, fsynced, and renamed into place, so
/// a failure mid-write leaves the previous pair untouched.
pub(crate) fn write_partition<'a, I>(
    directory: &Path,
    stem: &str,
    timestamp: OffsetDateTime,
    records: I,
) -> Result<PartitionMeta, CacheError>
where
    I: ExactSizeIterator<Item = &'a Cve>,
{
    let payload_path = directory.join(format!("{stem}.json.gz"));
    let count = records.len() as u32;
    let envelope = EnvelopeView {
        results_per_page: count,
        start_index: 0,
        total_results: count,
        format: ENVELOPE_FORMAT,
        version: ENVELOPE_VERSION,
        timestamp,
        vulnerabilities: records.map(|cve| ItemView { cve }).collect(),
    };

    let io_err = |path: &PathBuf| {
        let path = path.clone();
        move |source| CacheError::Io {
            path,
            source,
        }
    };

    let tmp = tempfile::NamedTempFile::new_in(directory).map_err(io_err(&payload_path))?;
    let digest = DigestWriter::new(tmp);
    let encoder = GzEncoder::new(digest, Compression::default());
    let mut counter = CountingWriter::new(encoder);
    serde_json::to_writer(&mut counter, &envelope).map_err(|source| CacheError::Encode {
        path: payload_path.clone(),
        source,
    })?;
    let uncompressed = counter.written;
    let digest = counter
        .inner
        .finish()
        .map_err(io_err(&payload_path))?;
    let (tmp, sha256, gz_size) = digest.into_parts();
    tmp.as_file().sync_all().map_err(io_err(&payload_path))?;
    tmp.persist(&payload_path).map_err(|err| CacheError::Io {
        path: payload_path.clone(),
        source: err.error,
    })?;

    let meta = PartitionMeta {
        last_modified: timestamp,
        size: uncompressed,
        gz_size,
        sha256,
    };
    let meta_path = directory.join(format!("{stem}.meta"));
    let mut tmp = tempfile::NamedTempFile::new_in(directory).map_err(io_err(&meta_path))?;
    tmp.write_all(meta.to_sidecar_text()?.as_bytes())
        .map_err(io_err(&meta_path))?;
    tmp.as_file().sync_all().map_err(io_err(&meta_path))?;
    tmp.persist(&meta_path).map_err(|err| CacheError::Io {
        path: meta_path.clone(),
        source: err.error,
    })?;

    tracing::debug!(
        partition = stem,
        records = count,
        size = meta.size,
        gz_size = meta.gz_size,
        "partition written"
    );
    Ok(meta)
}

/// Reads a gzipped partition envelope; a missing file is an empty partition,
/// an unreadable or undecodable file is fatal.
pub(crate) fn read_partition(path: &Path) -> Result<Option<CveApiResponse>, CacheError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(CacheError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let decoder = GzDecoder::new(BufReader::new(file));
    serde_json::from_reader(decoder)
        .map(Some)
        .map_err(|source| CacheError::Decode {
            path: path.to_path_buf(),
            source,
        })
}
