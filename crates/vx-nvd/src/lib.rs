//! Client for the NVD CVE 2.0 API.
//!
//! Construct an [`NvdClientConfig`] with the desired [`CveFilter`]s and drain
//! the resulting [`CvePages`] iterator:
//!
//! ```no_run
//! use vx_nvd::{CvePages, NvdClientConfig};
//!
//! # fn main() -> Result<(), vx_nvd::NvdApiError> {
//! let mut pages = CvePages::new(NvdClientConfig::default())?;
//! for page in &mut pages {
//!     let page = page?;
//!     println!("{} of {} records", page.items.len(), page.total_results);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! The first request discovers the total result count; the remaining pages
//! are fetched concurrently through a shared rate meter and delivered in
//! completion order.

mod config;
mod filter;
mod model;
mod pages;

pub use config::{NvdClientConfig, DEFAULT_ENDPOINT, MAX_RESULTS_PER_PAGE};
pub use filter::{CveFilter, CvssV2Severity, CvssV3Severity, VersionBoundType};
pub use model::{
    timestamp, Cve, CveApiResponse, CveItem, ENVELOPE_FORMAT, ENVELOPE_VERSION,
};
pub use pages::{CvePage, CvePages};

use thiserror::Error;

/// Failures surfaced while configuring or draining the paged client.
///
/// A non-2xx upstream status is not an `Err`: the iterator simply stops and
/// records the code, readable through [`CvePages::last_status`].
#[derive(Debug, Error)]
pub enum NvdApiError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Http(#[from] vx_http::ClientError),
    #[error("failed to decode response for startIndex {start_index}: {source}")]
    Decode {
        start_index: u32,
        #[source]
        source: serde_json::Error,
    },
}
