//! Typed failure taxonomy for the provider-facing edges of the engine.
//!
//! Embedding and completion failures are always recovered locally by
//! falling back one level (vector → lexical, provider A → B →
//! deterministic), so these types exist to make the fallback decision
//! explicit rather than to propagate to callers. The rest of the crate
//! uses `anyhow::Result` at application seams.

use thiserror::Error;

/// Failure from an embedding provider.
#[derive(Debug, Error)]
pub enum EmbedError {
    /// Quota or rate limit. Signals "switch to the lexical fallback",
    /// not an application error.
    #[error("embedding quota exceeded: {0}")]
    Quota(String),

    /// No embedding provider is configured.
    #[error("embedding provider is disabled")]
    Disabled,

    /// Any other provider failure (network, auth, bad response).
    #[error("embedding provider error: {0}")]
    Provider(String),
}

impl EmbedError {
    /// Whether the failure is the quota/rate-limit kind (spec'd to be
    /// distinguishable from a generic failure).
    pub fn is_quota(&self) -> bool {
        matches!(self, EmbedError::Quota(_))
    }
}

/// Failure from a language-model provider. A malformed response is
/// treated identically to a transport failure for fallback purposes.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    /// Provider returned output that does not parse as the required
    /// JSON shape.
    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("provider error: {0}")]
    Other(String),
}

/// Classified failure from the source-hosting API during repository
/// sync. Each variant maps onto a terminal sync state persisted on the
/// repository record.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("sync failed: {0}")]
    Other(String),
}
