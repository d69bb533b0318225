use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::GhsaApiError;

/// One security advisory node.
///
/// As with CVE records, only identity and lifecycle timestamps are modeled;
/// the rest of the node is preserved verbatim in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Advisory {
    pub ghsa_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub published_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Advisory classification accepted by the `classifications` filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    General,
    Malware,
}

impl Classification {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::General => "GENERAL",
            Self::Malware => "MALWARE",
        }
    }

    /// Parses a comma-separated list such as `GENERAL,MALWARE`.
    pub fn parse_list(value: &str) -> Result<Vec<Self>, GhsaApiError> {
        value
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Classification {
    type Err = GhsaApiError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_uppercase().as_str() {
            "GENERAL" => Ok(Self::General),
            "MALWARE" => Ok(Self::Malware),
            other => Err(GhsaApiError::Config(format!(
                "unknown classification `{other}`; expected GENERAL or MALWARE"
            ))),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlResponse {
    pub(crate) data: Option<ResponseData>,
    #[serde(default)]
    pub(crate) errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlError {
    pub(crate) message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ResponseData {
    pub(crate) security_advisories: AdvisoryConnection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AdvisoryConnection {
    pub(crate) total_count: u32,
    pub(crate) page_info: PageInfo,
    pub(crate) nodes: Vec<Advisory>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PageInfo {
    pub(crate) has_next_page: bool,
    pub(crate) end_cursor: Option<String>,
}
