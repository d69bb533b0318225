//! Top-level mirror flow: load the cache, fetch what changed, write it back.

use thiserror::Error;
use time::{Duration, OffsetDateTime};
use vx_nvd::{CveFilter, CvePages, NvdApiError, NvdClientConfig};

use crate::cache::{CacheError, CacheStore};

/// Widest lastModified range the API accepts, and therefore the oldest a
/// cache may be while still qualifying for a delta fetch.
pub const MAX_DELTA: Duration = Duration::days(120);

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error(transparent)]
    Api(#[from] NvdApiError),
    #[error("upstream ended the fetch with HTTP status {0}")]
    Status(u16),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// What a completed mirror run did.
#[derive(Debug, Clone, Default)]
pub struct MirrorSummary {
    pub pages: usize,
    pub records: usize,
    pub total_results: Option<u32>,
    pub last_modified: Option<OffsetDateTime>,
}

/// Computes the incremental fetch range, or `None` when the cache is too
/// stale and only a full fetch will do.
#[must_use]
pub fn delta_window(
    last_modified: OffsetDateTime,
    now: OffsetDateTime,
) -> Option<(OffsetDateTime, OffsetDateTime)> {
    if now - last_modified > MAX_DELTA {
        return None;
    }
    let end = (last_modified + MAX_DELTA).min(now);
    Some((last_modified, end))
}

/// Drains the CVE API into `store` and persists the result.
///
/// The range filter is derived from the manifest: a cache updated within the
/// last 120 days gets a delta fetch, anything older triggers a warned full
/// fetch. A terminal iterator failure aborts before any partition is
/// written, leaving the previous snapshot intact.
pub fn mirror_cves(
    store: &mut CacheStore,
    mut config: NvdClientConfig,
) -> Result<MirrorSummary, MirrorError> {
    let now = store.run_clock();
    match store.last_modified()? {
        Some(last_modified) => match delta_window(last_modified, now) {
            Some((start, end)) => {
                tracing::info!(%start, %end, "fetching modified records since the last run");
                config
                    .filters
                    .push(CveFilter::LastModifiedRange { start, end });
            }
            None => {
                tracing::warn!(
                    %last_modified,
                    "cache is older than {} days; falling back to a full fetch",
                    MAX_DELTA.whole_days()
                );
            }
        },
        None => tracing::info!("no previous snapshot; performing a full fetch"),
    }

    let mut pages = CvePages::new(config)?;
    let mut summary = MirrorSummary::default();
    for page in &mut pages {
        let page = page?;
        summary.pages += 1;
        summary.records += page.items.len();
        summary.total_results = Some(page.total_results);
        store.merge(page.items);
        tracing::debug!(
            pages = summary.pages,
            records = summary.records,
            total = page.total_results,
            "page merged"
        );
    }
    if pages.last_status() != 200 {
        return Err(MirrorError::Status(pages.last_status()));
    }

    if let Some(last_updated) = pages.last_updated() {
        store.note_last_modified(last_updated)?;
        summary.last_modified = Some(last_updated);
    }
    store.write()?;
    Ok(summary)
}
