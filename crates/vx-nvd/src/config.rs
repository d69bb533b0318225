use std::time::Duration;

use url::Url;
use vx_http::RateMeter;

use crate::filter::CveFilter;
use crate::NvdApiError;

pub const DEFAULT_ENDPOINT: &str = "https://services.nvd.nist.gov/rest/json/cves/2.0";
pub const MAX_RESULTS_PER_PAGE: u32 = 2000;

/// Published NVD rate limits, padded the way the service actually enforces
/// them: 5 requests per rolling 30s window without a key, 50 with one.
const KEYLESS_METER: (usize, Duration) = (5, Duration::from_millis(32_500));
const KEYED_METER: (usize, Duration) = (50, Duration::from_millis(32_500));
const KEYLESS_DELAY: Duration = Duration::from_millis(6_500);
const KEYED_DELAY: Duration = Duration::from_millis(600);

/// Configuration for [`crate::CvePages`].
///
/// Optional knobs default as documented on each field; `filters` carries the
/// querystring filter set verbatim.
#[derive(Debug, Clone)]
pub struct NvdClientConfig {
    /// Sent as the `apiKey` header when present. Absence forces a single
    /// worker and the slower keyless rate limits.
    pub api_key: Option<String>,
    pub endpoint: String,
    /// Minimum per-worker gap between sends; defaults to 600 ms with an API
    /// key and 6500 ms without.
    pub delay: Option<Duration>,
    /// Requested worker count; honored only when an API key is present.
    pub thread_count: usize,
    /// Upper bound on fetched pages, counting the discovery page. 0 means
    /// unlimited.
    pub max_page_count: usize,
    /// Page size, 1..=2000.
    pub results_per_page: u32,
    /// Retry budget for 429/503 responses.
    pub max_retry_count: u32,
    pub timeout: Duration,
    pub filters: Vec<CveFilter>,
}

impl Default for NvdClientConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            delay: None,
            thread_count: 1,
            max_page_count: 0,
            results_per_page: MAX_RESULTS_PER_PAGE,
            max_retry_count: 0,
            timeout: Duration::from_secs(60),
            filters: Vec::new(),
        }
    }
}

impl NvdClientConfig {
    pub fn validate(&self) -> Result<(), NvdApiError> {
        if self.results_per_page == 0 || self.results_per_page > MAX_RESULTS_PER_PAGE {
            return Err(NvdApiError::Config(format!(
                "resultsPerPage must be between 1 and {MAX_RESULTS_PER_PAGE}, got {}",
                self.results_per_page
            )));
        }
        Url::parse(&self.endpoint)
            .map_err(|err| NvdApiError::Config(format!("invalid endpoint: {err}")))?;
        CveFilter::validate(&self.filters)
    }

    pub(crate) fn effective_delay(&self) -> Duration {
        self.delay.unwrap_or(if self.api_key.is_some() {
            KEYED_DELAY
        } else {
            KEYLESS_DELAY
        })
    }

    pub(crate) fn effective_threads(&self) -> usize {
        let requested = self.thread_count.max(1);
        if self.api_key.is_none() && requested > 1 {
            tracing::warn!(
                requested,
                "no API key provided; thread count reset to 1"
            );
            return 1;
        }
        requested
    }

    pub(crate) fn meter(&self) -> RateMeter {
        let (quantity, window) = if self.api_key.is_some() {
            KEYED_METER
        } else {
            KEYLESS_METER
        };
        RateMeter::new(quantity, window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_key_presence() {
        let keyless = NvdClientConfig::default();
        assert_eq!(keyless.effective_delay(), KEYLESS_DELAY);
        assert_eq!(keyless.meter().quantity(), 5);

        let keyed = NvdClientConfig {
            api_key: Some("secret".to_string()),
            ..NvdClientConfig::default()
        };
        assert_eq!(keyed.effective_delay(), KEYED_DELAY);
        assert_eq!(keyed.meter().quantity(), 50);
    }

    #[test]
    fn thread_count_is_clamped_without_a_key() {
        let config = NvdClientConfig {
            thread_count: 8,
            ..NvdClientConfig::default()
        };
        assert_eq!(config.effective_threads(), 1);

        let keyed = NvdClientConfig {
            api_key: Some("secret".to_string()),
            thread_count: 8,
            ..NvdClientConfig::default()
        };
        assert_eq!(keyed.effective_threads(), 8);
    }

    #[test]
    fn out_of_range_page_size_is_a_config_error() {
        for results_per_page in [0, 2001] {
            let config = NvdClientConfig {
                results_per_page,
                ..NvdClientConfig::default()
            };
            assert!(matches!(
                config.validate(),
                Err(NvdApiError::Config(_))
            ));
        }
    }

    #[test]
    fn explicit_delay_wins_over_defaults() {
        let config = NvdClientConfig {
            delay: Some(Duration::from_millis(50)),
            ..NvdClientConfig::default()
        };
        assert_eq!(config.effective_delay(), Duration::from_millis(50));
    }
}
