use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::rate::RateMeter;
use crate::request::{ApiRequest, ApiResponse, Method};
use crate::{CancelFlag, ClientError};

/// Statuses worth retrying when a retry budget is configured.
const RETRYABLE_STATUSES: [u16; 2] = [429, 503];
/// Floor for the linear backoff step between retries.
const BACKOFF_FLOOR: Duration = Duration::from_millis(500);

/// Per-worker transport settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Minimum gap between consecutive sends on this worker.
    pub delay: Duration,
    /// Whole-request timeout applied to the underlying HTTP client.
    pub timeout: Duration,
    /// Retry budget for 429/503 responses.
    pub max_retries: u32,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            delay: Duration::ZERO,
            timeout: Duration::from_secs(60),
            max_retries: 0,
            user_agent: concat!("vx/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// A single-lane caller that spaces its requests by a minimum delay and
/// gates every send through a shared [`RateMeter`] ticket.
///
/// One instance serializes its own sends; parallelism comes from running
/// several instances against the same meter (see [`crate::ClientPool`]).
pub struct RateLimitedClient {
    http: reqwest::blocking::Client,
    meter: Arc<RateMeter>,
    delay: Duration,
    max_retries: u32,
    last_request: Option<Instant>,
}

impl RateLimitedClient {
    pub fn new(config: &ClientConfig, meter: Arc<RateMeter>) -> Result<Self, ClientError> {
        let http = reqwest::blocking::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .build()
            .map_err(ClientError::Build)?;
        tracing::debug!(delay_ms = config.delay.as_millis() as u64, "worker ready");
        Ok(Self {
            http,
            meter,
            delay: config.delay,
            max_retries: config.max_retries,
            last_request: None,
        })
    }

    /// Executes one request: wait out the delay gap, take a ticket, send.
    ///
    /// The ticket is held until the response (or failure) is complete and is
    /// released on every exit path. Retryable statuses are re-attempted with
    /// a linear backoff while the budget lasts.
    pub fn execute(
        &mut self,
        request: &ApiRequest,
        cancel: &CancelFlag,
    ) -> Result<ApiResponse, ClientError> {
        let mut attempt: u32 = 0;
        loop {
            if cancel.is_set() {
                return Err(ClientError::Cancelled);
            }
            self.wait_for_delay();
            let ticket = self.meter.acquire(cancel)?;
            if cancel.is_set() {
                return Err(ClientError::Cancelled);
            }
            tracing::trace!(url = %request.url, attempt, "sending request");
            let outcome = self.send_once(request);
            self.last_request = Some(Instant::now());
            ticket.close();

            match outcome {
                Ok(response)
                    if RETRYABLE_STATUSES.contains(&response.status)
                        && attempt < self.max_retries =>
                {
                    attempt += 1;
                    let pause = self.delay.max(BACKOFF_FLOOR) * attempt;
                    tracing::warn!(
                        status = response.status,
                        attempt,
                        pause_ms = pause.as_millis() as u64,
                        "retrying after transient upstream status"
                    );
                    std::thread::sleep(pause);
                }
                other => return other,
            }
        }
    }

    fn wait_for_delay(&self) {
        if self.delay.is_zero() {
            return;
        }
        if let Some(last) = self.last_request {
            let since = last.elapsed();
            if since < self.delay {
                let wait = self.delay - since;
                tracing::trace!(wait_ms = wait.as_millis() as u64, "honoring request delay");
                std::thread::sleep(wait);
            }
        }
    }

    fn send_once(&self, request: &ApiRequest) -> Result<ApiResponse, ClientError> {
        let mut builder = match request.method {
            Method::Get => self.http.get(&request.url),
            Method::Post => self.http.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        let response = builder.send().map_err(|source| ClientError::Transport {
            url: request.url.clone(),
            source,
        })?;
        let status = response.status().as_u16();
        let body = response.text().map_err(|source| ClientError::Transport {
            url: request.url.clone(),
            source,
        })?;
        Ok(ApiResponse { status, body })
    }
}
