//! Background refresh of the channel-link cache
//!
//! Runs once shortly after startup, then periodically. A refresh that
//! finds another one running is skipped; a failed refresh keeps the
//! previous table.

use std::time::Duration;
use tokio::time;

use crate::services::channel_cache::{ChannelCache, RefreshOutcome};

/// Configuration for the refresh task
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Delay before the first refresh, so startup is not blocked
    pub startup_delay: Duration,
    pub interval: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            startup_delay: Duration::from_secs(2),
            interval: Duration::from_secs(12 * 60 * 60),
        }
    }
}

/// Run a single refresh cycle and log how it went
pub async fn run_refresh(cache: &ChannelCache) -> Option<RefreshOutcome> {
    match cache.refresh().await {
        Ok(outcome) => {
            match &outcome {
                RefreshOutcome::Refreshed { channels } => {
                    tracing::info!("Refresh: {} channels cached", channels)
                }
                RefreshOutcome::AlreadyInProgress => {
                    tracing::debug!("Refresh: skipped, another refresh is running")
                }
            }
            Some(outcome)
        }
        Err(e) => {
            tracing::error!("Refresh: channel cache refresh failed: {}", e);
            None
        }
    }
}

/// Start the background refresh task
///
/// This should be spawned with `tokio::spawn`; it never returns.
pub async fn start_refresh_task(cache: ChannelCache, config: RefreshConfig) {
    tracing::info!(
        "Starting channel cache refresh task (delay: {:?}, interval: {:?})",
        config.startup_delay,
        config.interval
    );

    time::sleep(config.startup_delay).await;
    run_refresh(&cache).await;

    let mut interval = time::interval(config.interval.max(Duration::from_secs(1)));
    // The first tick completes immediately
    interval.tick().await;

    loop {
        interval.tick().await;
        run_refresh(&cache).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::channel_cache::tests::{FakeListing, FixedClock};
    use crate::services::channel_cache::CacheOptions;
    use crate::services::listing::ListedChannel;
    use std::sync::Arc;

    fn cache(dir: &tempfile::TempDir, listing: Arc<FakeListing>) -> ChannelCache {
        ChannelCache::new(
            dir.path().join("cache.json"),
            listing,
            FixedClock::at(1_700_000_000_000),
            CacheOptions::default(),
        )
    }

    #[tokio::test]
    async fn test_run_refresh_reports_channels() {
        let dir = tempfile::tempdir().unwrap();
        let listing = Arc::new(FakeListing::with_channels(vec![
            ListedChannel::new("RAI 1 .c", "https://vavoo.to/play/1/index.m3u8"),
            ListedChannel::new("RAI 2 .b", "https://vavoo.to/play/2/index.m3u8"),
        ]));
        let cache = cache(&dir, listing);

        assert_eq!(
            run_refresh(&cache).await,
            Some(RefreshOutcome::Refreshed { channels: 2 })
        );
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_running() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir, Arc::new(FakeListing::failing()));
        assert_eq!(run_refresh(&cache).await, None);
        assert_eq!(cache.stats().await.channels, 0);
    }
}
