use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use vx_http::{ApiRequest, CancelFlag, ClientConfig, RateLimitedClient, RateMeter};

use crate::model::{Advisory, Classification, GraphQlResponse};
use crate::GhsaApiError;

pub const DEFAULT_ENDPOINT: &str = "https://api.github.com/graphql";
pub const MAX_PAGE_SIZE: u32 = 100;

/// Configuration for [`AdvisoryPages`].
#[derive(Debug, Clone)]
pub struct GhsaClientConfig {
    /// Bearer token for the GraphQL API; requests are refused without one.
    pub token: Option<String>,
    pub endpoint: String,
    pub updated_since: Option<OffsetDateTime>,
    pub published_since: Option<OffsetDateTime>,
    pub classifications: Vec<Classification>,
    /// Nodes requested per page, 1..=100.
    pub page_size: u32,
    /// Minimum gap between consecutive requests.
    pub delay: Duration,
    pub max_retry_count: u32,
    pub timeout: Duration,
}

impl Default for GhsaClientConfig {
    fn default() -> Self {
        Self {
            token: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            updated_since: None,
            published_since: None,
            classifications: Vec::new(),
            page_size: MAX_PAGE_SIZE,
            delay: Duration::ZERO,
            max_retry_count: 0,
            timeout: Duration::from_secs(60),
        }
    }
}

impl GhsaClientConfig {
    pub fn validate(&self) -> Result<(), GhsaApiError> {
        if self.token.as_deref().map_or(true, str::is_empty) {
            return Err(GhsaApiError::Config(
                "a GitHub token is required; set GITHUB_TOKEN".to_string(),
            ));
        }
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(GhsaApiError::Config(format!(
                "page size must be between 1 and {MAX_PAGE_SIZE}, got {}",
                self.page_size
            )));
        }
        Ok(())
    }
}

/// One decoded page of advisories.
#[derive(Debug, Clone)]
pub struct AdvisoryPage {
    pub advisories: Vec<Advisory>,
    pub total_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Fresh,
    Streaming,
    Drained,
    Terminated,
}

/// Lazy sequence of advisory pages, fetched one cursor step at a time.
///
/// The server dictates page availability through `pageInfo`; a non-2xx
/// status ends the sequence with the code left in
/// [`AdvisoryPages::last_status`].
pub struct AdvisoryPages {
    config: GhsaClientConfig,
    client: RateLimitedClient,
    cancel: CancelFlag,
    cursor: Option<String>,
    phase: Phase,
    total_count: Option<u32>,
    last_updated: Option<OffsetDateTime>,
    last_status: u16,
}

impl AdvisoryPages {
    pub fn new(config: GhsaClientConfig) -> Result<Self, GhsaApiError> {
        config.validate()?;
        // Mirrors the transport defaults of the CVE side; GitHub's secondary
        // limits are enforced by the per-request delay rather than a window.
        let meter = Arc::new(RateMeter::new(100, Duration::from_millis(5)));
        let client = RateLimitedClient::new(
            &ClientConfig {
                delay: config.delay,
                timeout: config.timeout,
                max_retries: config.max_retry_count,
                ..ClientConfig::default()
            },
            meter,
        )?;
        Ok(Self {
            config,
            client,
            cancel: CancelFlag::new(),
            cursor: None,
            phase: Phase::Fresh,
            total_count: None,
            last_updated: None,
            last_status: 200,
        })
    }

    #[must_use]
    pub fn total_count(&self) -> Option<u32> {
        self.total_count
    }

    /// Newest `updatedAt` seen across all fetched advisories.
    #[must_use]
    pub fn last_updated(&self) -> Option<OffsetDateTime> {
        self.last_updated
    }

    #[must_use]
    pub fn last_status(&self) -> u16 {
        self.last_status
    }

    /// Stops the sequence; any blocked request observes the cancellation.
    pub fn close(&mut self) {
        self.cancel.set();
        self.phase = Phase::Terminated;
    }

    fn query_document(&self) -> Result<String, GhsaApiError> {
        let mut args = vec![
            format!("first: {}", self.config.page_size),
            "after: $after".to_string(),
        ];
        if let Some(since) = self.config.updated_since {
            args.push(format!("updatedSince: \"{}\"", graphql_timestamp(since)?));
        }
        if let Some(since) = self.config.published_since {
            args.push(format!("publishedSince: \"{}\"", graphql_timestamp(since)?));
        }
        if !self.config.classifications.is_empty() {
            let list: Vec<&str> = self
                .config
                .classifications
                .iter()
                .map(|classification| classification.as_str())
                .collect();
            args.push(format!("classifications: [{}]", list.join(", ")));
        }
        Ok(format!(
            "query($after: String) {{ securityAdvisories({}) {{ \
             totalCount pageInfo {{ hasNextPage endCursor }} \
             nodes {{ ghsaId summary description severity publishedAt updatedAt withdrawnAt \
             identifiers {{ type value }} references {{ url }} }} }} }}",
            args.join(", ")
        ))
    }

    fn page_request(&self) -> Result<ApiRequest, GhsaApiError> {
        let body = json!({
            "query": self.query_document()?,
            "variables": { "after": self.cursor },
        });
        let token = self.config.token.as_deref().unwrap_or_default();
        Ok(
            ApiRequest::post_json(self.config.endpoint.as_str(), body.to_string())
                .header("Authorization", format!("Bearer {token}")),
        )
    }

    fn fail(&mut self, error: GhsaApiError) -> Option<Result<AdvisoryPage, GhsaApiError>> {
        self.phase = Phase::Terminated;
        Some(Err(error))
    }
}

impl Iterator for AdvisoryPages {
    type Item = Result<AdvisoryPage, GhsaApiError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.phase {
            Phase::Drained | Phase::Terminated => return None,
            Phase::Fresh | Phase::Streaming => {}
        }

        let request = match self.page_request() {
            Ok(request) => request,
            Err(err) => return self.fail(err),
        };
        let response = match self.client.execute(&request, &self.cancel) {
            Ok(response) => response,
            Err(err) => return self.fail(err.into()),
        };
        if response.status != 200 {
            self.last_status = response.status;
            tracing::warn!(
                status = response.status,
                "GitHub ended the fetch with a non-success status"
            );
            self.phase = Phase::Terminated;
            return None;
        }

        let decoded: GraphQlResponse = match serde_json::from_str(&response.body) {
            Ok(decoded) => decoded,
            Err(source) => return self.fail(GhsaApiError::Decode { source }),
        };
        if !decoded.errors.is_empty() {
            let messages: Vec<String> = decoded
                .errors
                .into_iter()
                .map(|error| error.message)
                .collect();
            return self.fail(GhsaApiError::GraphQl(messages.join("; ")));
        }
        let Some(data) = decoded.data else {
            return self.fail(GhsaApiError::GraphQl(
                "response carried neither data nor errors".to_string(),
            ));
        };

        let connection = data.security_advisories;
        self.total_count = Some(connection.total_count);
        for advisory in &connection.nodes {
            if self
                .last_updated
                .map_or(true, |seen| advisory.updated_at > seen)
            {
                self.last_updated = Some(advisory.updated_at);
            }
        }

        if connection.page_info.has_next_page && connection.page_info.end_cursor.is_some() {
            self.cursor = connection.page_info.end_cursor;
            self.phase = Phase::Streaming;
        } else {
            self.phase = Phase::Drained;
        }

        Some(Ok(AdvisoryPage {
            advisories: connection.nodes,
            total_count: connection.total_count,
        }))
    }
}

fn graphql_timestamp(value: OffsetDateTime) -> Result<String, GhsaApiError> {
    value
        .format(&Rfc3339)
        .map_err(|err| GhsaApiError::Config(format!("unrepresentable filter timestamp: {err}")))
}
