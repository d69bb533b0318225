#![deny(clippy::all, warnings)]

//! Mirror core: the year-partitioned CVE cache, the orchestration flow that
//! keeps it current, and the streaming JSON output used when no cache is in
//! play.

pub mod cache;
pub mod mirror;
pub mod output;
pub mod secrets;

pub use cache::{CacheError, CacheStore, PartitionMeta, DEFAULT_PREFIX, MODIFIED_PARTITION};
pub use mirror::{delta_window, mirror_cves, MirrorError, MirrorSummary};
pub use output::StreamingOutput;
pub use secrets::env_secret;
