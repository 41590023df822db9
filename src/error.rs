//! Error taxonomy for stream resolution
//!
//! None of these ever crosses the response boundary: resolvers turn them into
//! an empty candidate list, the aggregator turns a malformed id into an empty
//! response.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// The inbound id does not match any recognized prefix/shape
    #[error("malformed identifier '{0}'")]
    MalformedIdentifier(String),

    /// Network or process failure talking to one upstream
    #[error("upstream {upstream} unavailable: {reason}")]
    UpstreamUnavailable { upstream: String, reason: String },

    /// Full channel listing could not be fetched or parsed
    #[error("channel cache refresh failed: {0}")]
    CacheRefreshFailed(String),

    /// Snapshot could not be written to disk
    #[error("cache snapshot persistence failed: {0}")]
    PersistenceFailed(String),
}

impl ResolveError {
    pub fn upstream(upstream: impl Into<String>, reason: impl ToString) -> Self {
        Self::UpstreamUnavailable {
            upstream: upstream.into(),
            reason: reason.to_string(),
        }
    }
}
