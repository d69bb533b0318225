//! Rate-limited blocking HTTP plumbing shared by the vx API clients.
//!
//! The pieces layer as follows: a [`RateMeter`] bounds how many requests may
//! be issued inside a rolling window, a [`RateLimitedClient`] combines that
//! meter with a minimum inter-request delay on a single worker, and a
//! [`ClientPool`] fans requests out across several workers that all share one
//! meter. Completed responses are delivered through the pool's completion
//! channel in whatever order the upstream finishes them.

mod client;
mod pool;
mod rate;
mod request;

pub use client::{ClientConfig, RateLimitedClient};
pub use pool::{ClientPool, Completion, PoolConfig};
pub use rate::{Interrupted, RateMeter, Ticket};
pub use request::{ApiRequest, ApiResponse, Method};

use thiserror::Error;

/// Errors surfaced by the rate-limited transport layer.
///
/// Non-2xx responses are not errors at this level; they come back as an
/// [`ApiResponse`] carrying the status code so callers can decide whether the
/// code is terminal.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to spawn pool worker: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("request cancelled")]
    Cancelled,
    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

/// Cooperative cancellation flag handed to every blocking wait in this crate.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(std::sync::Arc<std::sync::atomic::AtomicBool>);

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, std::sync::atomic::Ordering::Release);
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        self.0.load(std::sync::atomic::Ordering::Acquire)
    }
}

#[cfg(test)]
pub(crate) mod stub;
