use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::OneOrMany;

/// On-disk form of the channel-link cache: `{ "timestamp": ms, "links": {...} }`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    /// Epoch millis of the last successful full refresh, 0 when never refreshed
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    /// Kept in listing order; variant numbering follows it
    pub links: IndexMap<String, OneOrMany>,
}

/// Lifecycle of the channel-link cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheState {
    Empty,
    Loaded,
    Refreshing,
}

/// One URL found by variant matching, with the cache key it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantLink {
    pub key: String,
    pub url: String,
}

/// Summary exposed on the health and admin routes
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub state: CacheState,
    pub channels: usize,
    pub timestamp: i64,
    pub age_secs: Option<i64>,
    pub stale: bool,
}
