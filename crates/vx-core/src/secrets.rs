//! Credential lookup from the environment.

use std::env;

/// Reads a secret from the environment.
///
/// Empty values are treated as absent. A value starting with `op://` is an
/// unexpanded secret-manager reference, not a credential; it is warned about
/// and dropped rather than sent upstream.
#[must_use]
pub fn env_secret(name: &str) -> Option<String> {
    let value = env::var(name).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.starts_with("op://") {
        tracing::warn!(
            variable = name,
            "value looks like an unexpanded secret reference and will not be used"
        );
        return None;
    }
    Some(trimmed.to_string())
}
