//! Streaming JSON emission for non-cache runs.
//!
//! The envelope is a single object: an array of records under a
//! caller-chosen field, then a trailing `results` summary:
//!
//! ```json
//! {"cves":[...],"results":{"success":true,"count":3,"lastModifiedDate":"..."}}
//! ```

use std::io::Write;

use anyhow::{Context, Result};
use serde::Serialize;
use time::OffsetDateTime;
use vx_nvd::timestamp;

#[derive(Debug, Serialize)]
struct RunResults {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    count: u64,
    #[serde(
        rename = "lastModifiedDate",
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_optional_timestamp"
    )]
    last_modified: Option<OffsetDateTime>,
}

fn serialize_optional_timestamp<S>(
    value: &Option<OffsetDateTime>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match value {
        Some(value) => timestamp::serialize(value, serializer),
        None => serializer.serialize_none(),
    }
}

/// Writes records into the envelope as they arrive, then closes the object
/// with the run summary.
pub struct StreamingOutput<W: Write> {
    sink: W,
    pretty: bool,
    wrote_record: bool,
    batches: u64,
    count: u64,
    failure: Option<String>,
    last_modified: Option<OffsetDateTime>,
}

impl<W: Write> StreamingOutput<W> {
    pub fn new(mut sink: W, field: &str, pretty: bool) -> Result<Self> {
        if pretty {
            write!(sink, "{{\n  \"{field}\": [")
        } else {
            write!(sink, "{{\"{field}\":[")
        }
        .context("failed to open output envelope")?;
        Ok(Self {
            sink,
            pretty,
            wrote_record: false,
            batches: 0,
            count: 0,
            failure: None,
            last_modified: None,
        })
    }

    /// Appends one record to the array.
    pub fn record<T: Serialize>(&mut self, record: &T) -> Result<()> {
        if self.wrote_record {
            write!(self.sink, ",").context("failed to write separator")?;
        }
        self.wrote_record = true;
        if self.pretty {
            let text = serde_json::to_string_pretty(record).context("failed to encode record")?;
            write!(self.sink, "\n{}", indent(&text, 4)).context("failed to write record")?;
        } else {
            serde_json::to_writer(&mut self.sink, record).context("failed to write record")?;
        }
        self.count += 1;
        Ok(())
    }

    /// Marks one successfully received batch and folds in its server
    /// timestamp.
    pub fn batch_received(&mut self, server_timestamp: Option<OffsetDateTime>) {
        self.batches += 1;
        if server_timestamp > self.last_modified {
            self.last_modified = server_timestamp;
        }
    }

    /// Records a terminal upstream status; the summary reports failure.
    pub fn upstream_failed(&mut self, status: u16) {
        self.failure = Some(format!("Received HTTP Status Code: {status}"));
    }

    #[must_use]
    pub fn failed(&self) -> bool {
        self.failure.is_some()
    }

    /// Closes the array and the envelope, emitting the `results` summary.
    pub fn finish(mut self) -> Result<()> {
        let results = RunResults {
            success: self.failure.is_none() && self.batches > 0,
            reason: self.failure.take(),
            count: self.count,
            last_modified: self.last_modified,
        };
        if self.pretty {
            let text =
                serde_json::to_string_pretty(&results).context("failed to encode summary")?;
            write!(
                self.sink,
                "\n  ],\n  \"results\": {}\n}}\n",
                indent_tail(&text, 2)
            )
            .context("failed to close envelope")?;
        } else {
            write!(self.sink, "],\"results\":").context("failed to close array")?;
            serde_json::to_writer(&mut self.sink, &results).context("failed to write summary")?;
            writeln!(self.sink, "}}").context("failed to close envelope")?;
        }
        self.sink.flush().context("failed to flush output")?;
        Ok(())
    }
}

fn indent(text: &str, spaces: usize) -> String {
    let pad = " ".repeat(spaces);
    text.lines()
        .map(|line| format!("{pad}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Indents every line but the first; used when the opening brace continues
/// an existing line.
fn indent_tail(text: &str, spaces: usize) -> String {
    let pad = " ".repeat(spaces);
    let mut lines = text.lines();
    let mut out = lines.next().unwrap_or_default().to_string();
    for line in lines {
        out.push('\n');
        out.push_str(&pad);
        out.push_str(line);
    }
    out
}
