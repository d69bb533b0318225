use std::fmt;
use std::str::FromStr;

use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};
use url::Url;

use crate::NvdApiError;

/// Longest span the API accepts for a lastModified range.
pub(crate) const MAX_MODIFIED_RANGE: Duration = Duration::days(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CvssV2Severity {
    Low,
    Medium,
    High,
}

impl CvssV2Severity {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }
}

impl fmt::Display for CvssV2Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CvssV2Severity {
    type Err = NvdApiError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_uppercase().as_str() {
            "LOW" => Ok(Self::Low),
            "MEDIUM" => Ok(Self::Medium),
            "HIGH" => Ok(Self::High),
            other => Err(NvdApiError::Config(format!(
                "unknown CVSSv2 severity `{other}`; expected LOW, MEDIUM, or HIGH"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CvssV3Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl CvssV3Severity {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for CvssV3Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CvssV3Severity {
    type Err = NvdApiError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_uppercase().as_str() {
            "LOW" => Ok(Self::Low),
            "MEDIUM" => Ok(Self::Medium),
            "HIGH" => Ok(Self::High),
            "CRITICAL" => Ok(Self::Critical),
            other => Err(NvdApiError::Config(format!(
                "unknown CVSSv3 severity `{other}`; expected LOW, MEDIUM, HIGH, or CRITICAL"
            ))),
        }
    }
}

/// Whether a version range bound is inclusive or exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionBoundType {
    Including,
    Excluding,
}

impl VersionBoundType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Including => "INCLUDING",
            Self::Excluding => "EXCLUDING",
        }
    }
}

impl FromStr for VersionBoundType {
    type Err = NvdApiError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_uppercase().as_str() {
            "INCLUDING" => Ok(Self::Including),
            "EXCLUDING" => Ok(Self::Excluding),
            other => Err(NvdApiError::Config(format!(
                "unknown version bound type `{other}`; expected INCLUDING or EXCLUDING"
            ))),
        }
    }
}

/// One querystring filter understood by the CVE API.
///
/// Filters serialize themselves onto the request URL; [`CveFilter::validate`]
/// enforces the cross-field constraints before any request is built.
#[derive(Debug, Clone, PartialEq)]
pub enum CveFilter {
    CpeName(String),
    CveId(String),
    CvssV2Metrics(String),
    CvssV3Metrics(String),
    CweId(String),
    KeywordExactMatch(String),
    KeywordSearch(String),
    HasCertAlerts,
    HasCertNotes,
    HasKev,
    HasOval,
    IsVulnerable,
    NoRejected,
    CvssV2Severity(CvssV2Severity),
    CvssV3Severity(CvssV3Severity),
    LastModifiedRange {
        start: OffsetDateTime,
        end: OffsetDateTime,
    },
    PublishedRange {
        start: OffsetDateTime,
        end: OffsetDateTime,
    },
    VirtualMatchString(String),
    VersionStart {
        version: String,
        bound: VersionBoundType,
    },
    VersionEnd {
        version: String,
        bound: VersionBoundType,
    },
}

impl CveFilter {
    /// Checks the constraints the API documents for filter combinations.
    pub fn validate(filters: &[CveFilter]) -> Result<(), NvdApiError> {
        for filter in filters {
            match filter {
                CveFilter::LastModifiedRange { start, end } => {
                    if end < start {
                        return Err(NvdApiError::Config(
                            "lastModEndDate precedes lastModStartDate".to_string(),
                        ));
                    }
                    if *end - *start > MAX_MODIFIED_RANGE {
                        return Err(NvdApiError::Config(format!(
                            "lastModified range spans more than {} days",
                            MAX_MODIFIED_RANGE.whole_days()
                        )));
                    }
                }
                CveFilter::PublishedRange { start, end } => {
                    if end < start {
                        return Err(NvdApiError::Config(
                            "pubEndDate precedes pubStartDate".to_string(),
                        ));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub(crate) fn append_to(&self, url: &mut Url) -> Result<(), NvdApiError> {
        let mut pairs = url.query_pairs_mut();
        match self {
            CveFilter::CpeName(value) => {
                pairs.append_pair("cpeName", value);
            }
            CveFilter::CveId(value) => {
                pairs.append_pair("cveId", value);
            }
            CveFilter::CvssV2Metrics(value) => {
                pairs.append_pair("cvssV2Metrics", value);
            }
            CveFilter::CvssV3Metrics(value) => {
                pairs.append_pair("cvssV3Metrics", value);
            }
            CveFilter::CweId(value) => {
                pairs.append_pair("cweId", value);
            }
            CveFilter::KeywordExactMatch(value) => {
                pairs.append_pair("keywordExactMatch", value);
            }
            CveFilter::KeywordSearch(value) => {
                pairs.append_pair("keywordSearch", value);
            }
            CveFilter::HasCertAlerts => {
                pairs.append_key_only("hasCertAlerts");
            }
            CveFilter::HasCertNotes => {
                pairs.append_key_only("hasCertNotes");
            }
            CveFilter::HasKev => {
                pairs.append_key_only("hasKev");
            }
            CveFilter::HasOval => {
                pairs.append_key_only("hasOval");
            }
            CveFilter::IsVulnerable => {
                pairs.append_key_only("isVulnerable");
            }
            CveFilter::NoRejected => {
                pairs.append_key_only("noRejected");
            }
            CveFilter::CvssV2Severity(severity) => {
                pairs.append_pair("cvssV2Severity", severity.as_str());
            }
            CveFilter::CvssV3Severity(severity) => {
                pairs.append_pair("cvssV3Severity", severity.as_str());
            }
            CveFilter::LastModifiedRange { start, end } => {
                pairs.append_pair("lastModStartDate", &query_timestamp(*start)?);
                pairs.append_pair("lastModEndDate", &query_timestamp(*end)?);
            }
            CveFilter::PublishedRange { start, end } => {
                pairs.append_pair("pubStartDate", &query_timestamp(*start)?);
                pairs.append_pair("pubEndDate", &query_timestamp(*end)?);
            }
            CveFilter::VirtualMatchString(value) => {
                pairs.append_pair("virtualMatchString", value);
            }
            CveFilter::VersionStart { version, bound } => {
                pairs.append_pair("versionStart", version);
                pairs.append_pair("versionStartType", bound.as_str());
            }
            CveFilter::VersionEnd { version, bound } => {
                pairs.append_pair("versionEnd", version);
                pairs.append_pair("versionEndType", bound.as_str());
            }
        }
        Ok(())
    }
}

fn query_timestamp(value: OffsetDateTime) -> Result<String, NvdApiError> {
    value
        .format(&Rfc3339)
        .map_err(|err| NvdApiError::Config(format!("unrepresentable filter timestamp: {err}")))
}
