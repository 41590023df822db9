//! Prometheus metrics, exposed on `/metrics`

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, HistogramVec,
    IntCounter, IntCounterVec,
};

lazy_static! {
    pub static ref STREAM_REQUESTS: IntCounterVec = register_int_counter_vec!(
        "streamvix_stream_requests_total",
        "Stream requests by source kind",
        &["kind"]
    )
    .unwrap();
    pub static ref STREAM_CANDIDATES: IntCounter = register_int_counter!(
        "streamvix_stream_candidates_total",
        "Stream candidates returned after deduplication"
    )
    .unwrap();
    pub static ref RESOLVE_DURATION: HistogramVec = register_histogram_vec!(
        "streamvix_resolve_duration_seconds",
        "Time spent resolving one stream request",
        &["kind"]
    )
    .unwrap();
    pub static ref CACHE_REFRESHES: IntCounterVec = register_int_counter_vec!(
        "streamvix_cache_refreshes_total",
        "Channel-link cache refreshes by outcome",
        &["outcome"]
    )
    .unwrap();
}
