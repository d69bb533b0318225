use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

/// `format` value stamped on every API envelope.
pub const ENVELOPE_FORMAT: &str = "NVD_CVE";
/// `version` value stamped on every API envelope.
pub const ENVELOPE_VERSION: &str = "2.0";

/// Timestamp (de)serialization for the NVD wire format.
///
/// The API emits offset-less local-style timestamps that are documented to be
/// UTC (`2024-03-01T10:12:00.437`); RFC 3339 values with an explicit offset
/// are accepted as well and normalized to UTC. Values are always written back
/// with millisecond precision and no offset, matching what the API serves.
pub mod timestamp {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use time::format_description::well_known::Rfc3339;
    use time::format_description::BorrowedFormatItem;
    use time::macros::format_description;
    use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

    const READ: &[BorrowedFormatItem<'_>] = format_description!(
        version = 2,
        "[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]][optional [Z]]"
    );
    const WRITE: &[BorrowedFormatItem<'_>] = format_description!(
        version = 2,
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]"
    );

    /// Parses an NVD timestamp, assuming UTC when no offset is present.
    pub fn parse(value: &str) -> Result<OffsetDateTime, time::error::Parse> {
        if let Ok(primitive) = PrimitiveDateTime::parse(value, READ) {
            return Ok(primitive.assume_utc());
        }
        OffsetDateTime::parse(value, &Rfc3339).map(|ts| ts.to_offset(UtcOffset::UTC))
    }

    /// Formats a timestamp the way the API serves them.
    pub fn format(value: OffsetDateTime) -> Result<String, time::error::Format> {
        value.to_offset(UtcOffset::UTC).format(WRITE)
    }

    pub fn serialize<S>(value: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let text = format(*value).map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&text)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        parse(&text).map_err(D::Error::custom)
    }
}

/// One CVE record.
///
/// Only the identity and the two lifecycle timestamps are modeled; everything
/// else the API sends rides along untouched in `extra` and is written back
/// verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cve {
    pub id: String,
    #[serde(with = "timestamp")]
    pub published: OffsetDateTime,
    #[serde(rename = "lastModified", with = "timestamp")]
    pub last_modified: OffsetDateTime,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Wrapper the API uses for each entry of `vulnerabilities`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CveItem {
    pub cve: Cve,
}

/// The paged response envelope, also reused as the on-disk partition format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CveApiResponse {
    pub results_per_page: u32,
    pub start_index: u32,
    pub total_results: u32,
    pub format: String,
    pub version: String,
    #[serde(with = "timestamp")]
    pub timestamp: OffsetDateTime,
    pub vulnerabilities: Vec<CveItem>,
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn parses_offsetless_timestamps_as_utc() {
        let parsed = timestamp::parse("2024-03-01T10:12:00.437").expect("parse");
        assert_eq!(parsed, datetime!(2024-03-01 10:12:00.437 UTC));
    }

    #[test]
    fn parses_whole_second_and_zulu_variants() {
        assert_eq!(
            timestamp::parse("2023-12-05T08:15:07").expect("parse"),
            datetime!(2023-12-05 08:15:07 UTC)
        );
        assert_eq!(
            timestamp::parse("2023-12-05T08:15:07Z").expect("parse"),
            datetime!(2023-12-05 08:15:07 UTC)
        );
        assert_eq!(
            timestamp::parse("2023-12-05T09:15:07+01:00").expect("parse"),
            datetime!(2023-12-05 08:15:07 UTC)
        );
    }

    #[test]
    fn formats_with_millisecond_precision() {
        let formatted = timestamp::format(datetime!(2024-03-01 10:12:00.437 UTC)).expect("format");
        assert_eq!(formatted, "2024-03-01T10:12:00.437");
        let whole = timestamp::format(datetime!(2024-03-01 10:12:00 UTC)).expect("format");
        assert_eq!(whole, "2024-03-01T10:12:00.000");
    }

    #[test]
    fn unknown_payload_fields_survive_a_round_trip() {
        let raw = serde_json::json!({
            "id": "CVE-2024-0001",
            "published": "2024-01-15T09:00:00.000",
            "lastModified": "2024-02-01T12:30:00.000",
            "vulnStatus": "Analyzed",
            "descriptions": [{"lang": "en", "value": "sample"}],
            "metrics": {"cvssMetricV31": []}
        });
        let cve: Cve = serde_json::from_value(raw.clone()).expect("decode");
        assert_eq!(cve.id, "CVE-2024-0001");
        assert_eq!(cve.extra["vulnStatus"], "Analyzed");

        let back = serde_json::to_value(&cve).expect("encode");
        assert_eq!(back, raw);
    }

    #[test]
    fn envelope_decodes_camel_case_fields() {
        let body = serde_json::json!({
            "resultsPerPage": 1,
            "startIndex": 0,
            "totalResults": 7,
            "format": ENVELOPE_FORMAT,
            "version": ENVELOPE_VERSION,
            "timestamp": "2024-03-01T10:12:00.437",
            "vulnerabilities": [{
                "cve": {
                    "id": "CVE-2024-0001",
                    "published": "2024-01-15T09:00:00.000",
                    "lastModified": "2024-02-01T12:30:00.000"
                }
            }]
        })
        .to_string();
        let envelope: CveApiResponse = serde_json::from_str(&body).expect("decode");
        assert_eq!(envelope.total_results, 7);
        assert_eq!(envelope.vulnerabilities.len(), 1);
        assert_eq!(envelope.vulnerabilities[0].cve.id, "CVE-2024-0001");
    }
}
