//! Client for GitHub Security Advisories over the GraphQL API.
//!
//! The consumer contract matches the CVE side: build a config, iterate
//! pages, read the terminal status from the iterator afterwards. Cursor
//! pagination rules out fan-out, so pages are fetched strictly one at a
//! time, each gated by the rate-limited transport.

mod client;
mod model;

pub use client::{
    AdvisoryPage, AdvisoryPages, GhsaClientConfig, DEFAULT_ENDPOINT, MAX_PAGE_SIZE,
};
pub use model::{Advisory, Classification};

use thiserror::Error;

/// Failures surfaced while configuring or draining the advisory client.
#[derive(Debug, Error)]
pub enum GhsaApiError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Http(#[from] vx_http::ClientError),
    #[error("failed to decode GraphQL response: {source}")]
    Decode {
        #[source]
        source: serde_json::Error,
    },
    #[error("GraphQL query rejected: {0}")]
    GraphQl(String),
}
