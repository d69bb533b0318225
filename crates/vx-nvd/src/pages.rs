use std::sync::Arc;

use time::OffsetDateTime;
use url::Url;
use vx_http::{ApiRequest, ClientConfig, ClientPool, PoolConfig};

use crate::config::NvdClientConfig;
use crate::model::{CveApiResponse, CveItem};
use crate::NvdApiError;

/// Header carrying the NVD API key.
const API_KEY_HEADER: &str = "apiKey";

/// One decoded page of results, in upstream order.
#[derive(Debug, Clone)]
pub struct CvePage {
    pub items: Vec<CveItem>,
    /// Total matching records reported by the server for the whole query.
    pub total_results: u32,
    /// The server's snapshot timestamp for this response.
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Fresh,
    Streaming,
    Drained,
    Terminated,
    Closed,
}

/// Lazy sequence of CVE pages.
///
/// The first `next` call issues the discovery request at `startIndex=0`,
/// learns `totalResults`, and queues every remaining page on the worker
/// pool. Subsequent calls yield pages in completion order, so consumers that
/// need a deterministic order must sort afterwards.
///
/// A non-2xx status ends the sequence: `next` returns `None` and the code is
/// left in [`CvePages::last_status`]. Decode and transport failures surface
/// as `Err` items and are equally terminal.
pub struct CvePages {
    config: NvdClientConfig,
    endpoint: Url,
    pool: ClientPool,
    phase: Phase,
    in_flight: usize,
    fanned_out: bool,
    total_results: Option<u32>,
    last_updated: Option<OffsetDateTime>,
    last_status: u16,
}

impl CvePages {
    pub fn new(config: NvdClientConfig) -> Result<Self, NvdApiError> {
        config.validate()?;
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|err| NvdApiError::Config(format!("invalid endpoint: {err}")))?;
        let meter = Arc::new(config.meter());
        let pool = ClientPool::new(
            &PoolConfig {
                workers: config.effective_threads(),
                client: ClientConfig {
                    delay: config.effective_delay(),
                    timeout: config.timeout,
                    max_retries: config.max_retry_count,
                    ..ClientConfig::default()
                },
            },
            meter,
        )?;
        Ok(Self {
            config,
            endpoint,
            pool,
            phase: Phase::Fresh,
            in_flight: 0,
            fanned_out: false,
            total_results: None,
            last_updated: None,
            last_status: 200,
        })
    }

    /// Total matching records, known once the discovery page has arrived.
    #[must_use]
    pub fn total_results(&self) -> Option<u32> {
        self.total_results
    }

    /// Latest server-reported snapshot time seen across fetched pages.
    #[must_use]
    pub fn last_updated(&self) -> Option<OffsetDateTime> {
        self.last_updated
    }

    /// The most recent HTTP status; stays 200 unless the upstream degrades.
    #[must_use]
    pub fn last_status(&self) -> u16 {
        self.last_status
    }

    /// Cancels outstanding page requests and releases the worker pool.
    pub fn close(&mut self) {
        if self.phase != Phase::Closed {
            self.pool.shutdown();
            self.phase = Phase::Closed;
        }
    }

    fn page_request(&self, start_index: u32) -> Result<ApiRequest, NvdApiError> {
        let mut url = self.endpoint.clone();
        for filter in &self.config.filters {
            filter.append_to(&mut url)?;
        }
        url.query_pairs_mut()
            .append_pair("resultsPerPage", &self.config.results_per_page.to_string())
            .append_pair("startIndex", &start_index.to_string());
        let mut request = ApiRequest::get(url.as_str());
        if let Some(key) = &self.config.api_key {
            request = request.header(API_KEY_HEADER, key);
        }
        Ok(request)
    }

    fn fan_out(&mut self, total_results: u32) -> Result<(), NvdApiError> {
        let per_page = self.config.results_per_page;
        let mut pages = 1usize;
        let mut start_index = per_page;
        while start_index < total_results {
            if self.config.max_page_count > 0 && pages >= self.config.max_page_count {
                break;
            }
            let request = self.page_request(start_index)?;
            self.pool.submit(u64::from(start_index), request)?;
            self.in_flight += 1;
            pages += 1;
            start_index += per_page;
        }
        tracing::debug!(
            total_results,
            queued = self.in_flight,
            workers = self.pool.worker_count(),
            "queued remaining pages"
        );
        Ok(())
    }

    fn fail(&mut self, error: NvdApiError) -> Option<Result<CvePage, NvdApiError>> {
        self.phase = Phase::Terminated;
        Some(Err(error))
    }
}

impl Iterator for CvePages {
    type Item = Result<CvePage, NvdApiError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.phase {
            Phase::Closed | Phase::Drained | Phase::Terminated => return None,
            Phase::Fresh => {
                let request = match self.page_request(0) {
                    Ok(request) => request,
                    Err(err) => return self.fail(err),
                };
                if let Err(err) = self.pool.submit(0, request) {
                    return self.fail(err.into());
                }
                self.in_flight = 1;
                self.phase = Phase::Streaming;
            }
            Phase::Streaming => {}
        }

        if self.in_flight == 0 {
            self.phase = Phase::Drained;
            return None;
        }

        let completion = match self.pool.next_completion() {
            Ok(completion) => completion,
            Err(err) => return self.fail(err.into()),
        };
        self.in_flight -= 1;
        let start_index = completion.tag as u32;

        let response = match completion.result {
            Ok(response) => response,
            Err(err) => return self.fail(err.into()),
        };
        if response.status != 200 {
            self.last_status = response.status;
            tracing::warn!(
                status = response.status,
                start_index,
                "upstream ended the fetch with a non-success status"
            );
            self.phase = Phase::Terminated;
            return None;
        }

        let page: CveApiResponse = match serde_json::from_str(&response.body) {
            Ok(page) => page,
            Err(source) => {
                return self.fail(NvdApiError::Decode {
                    start_index,
                    source,
                })
            }
        };

        self.total_results = Some(page.total_results);
        if self.last_updated.map_or(true, |seen| page.timestamp > seen) {
            self.last_updated = Some(page.timestamp);
        }
        if !self.fanned_out {
            self.fanned_out = true;
            if let Err(err) = self.fan_out(page.total_results) {
                return self.fail(err);
            }
        }

        Some(Ok(CvePage {
            items: page.vulnerabilities,
            total_results: page.total_results,
            timestamp: page.timestamp,
        }))
    }
}

impl Drop for CvePages {
    fn drop(&mut self) {
        self.close();
    }
}
