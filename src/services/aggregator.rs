//! Result aggregation
//!
//! One resolver family per source kind. Resolvers in a family run
//! concurrently and are all awaited; their results are concatenated in
//! family order, then deduplicated by URL keeping the first title.

use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::AddonSettings;
use crate::models::{SourceKind, StreamCandidate, StreamsResponse};
use crate::services::identifier;
use crate::services::metrics::{RESOLVE_DURATION, STREAM_CANDIDATES, STREAM_REQUESTS};
use crate::services::resolvers::{ResolveContext, StreamResolver};

pub struct Aggregator {
    live: Arc<dyn StreamResolver>,
    /// Anime sources in output order
    anime: Vec<Arc<dyn StreamResolver>>,
    media: Arc<dyn StreamResolver>,
}

impl Aggregator {
    pub fn new(
        live: Arc<dyn StreamResolver>,
        anime: Vec<Arc<dyn StreamResolver>>,
        media: Arc<dyn StreamResolver>,
    ) -> Self {
        Self { live, anime, media }
    }

    /// Resolvers for a source kind, in output order. IMDb/TMDB ids also go
    /// to the anime sources, ahead of the media extraction.
    fn family(&self, kind: SourceKind) -> Vec<&Arc<dyn StreamResolver>> {
        match kind {
            SourceKind::LiveChannel => vec![&self.live],
            SourceKind::EpisodicExternal => self.anime.iter().collect(),
            SourceKind::DirectMedia | SourceKind::ProxiedMedia => {
                self.anime.iter().chain(std::iter::once(&self.media)).collect()
            }
        }
    }

    /// Resolve an inbound id. Never fails: a malformed id or a failing
    /// upstream yields fewer (possibly zero) streams.
    pub async fn resolve(&self, raw_id: &str, settings: &AddonSettings) -> StreamsResponse {
        let request = match identifier::parse(raw_id) {
            Ok(request) => request,
            Err(e) => {
                warn!("Rejected stream request: {}", e);
                STREAM_REQUESTS.with_label_values(&["malformed"]).inc();
                return StreamsResponse::default();
            }
        };

        let ctx = ResolveContext::new(settings.clone());
        let kind = request
            .source_kind
            .with_proxy(ctx.settings.media_flow().is_some());
        STREAM_REQUESTS.with_label_values(&[kind.as_str()]).inc();
        let _timer = RESOLVE_DURATION
            .with_label_values(&[kind.as_str()])
            .start_timer();

        let family: Vec<_> = self
            .family(kind)
            .into_iter()
            .filter(|resolver| resolver.applies(&ctx))
            .collect();
        debug!(
            kind = %kind,
            resolvers = ?family.iter().map(|r| r.name()).collect::<Vec<_>>(),
            "Dispatching {}",
            raw_id
        );

        let results = join_all(family.iter().map(|resolver| resolver.resolve(&request, &ctx))).await;
        let streams = dedupe_by_url(results.into_iter().flatten());

        STREAM_CANDIDATES.inc_by(streams.len() as u64);
        info!(kind = %kind, count = streams.len(), "Resolved {}", raw_id);

        StreamsResponse { streams }
    }
}

/// Keep the first candidate for each URL
pub fn dedupe_by_url(candidates: impl IntoIterator<Item = StreamCandidate>) -> Vec<StreamCandidate> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|candidate| seen.insert(candidate.url.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResolutionRequest;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Returns fixed candidates after a delay and counts calls
    struct StaticResolver {
        name: &'static str,
        urls: Vec<&'static str>,
        delay: Duration,
        enabled: bool,
        calls: AtomicUsize,
    }

    impl StaticResolver {
        fn new(name: &'static str, urls: &[&'static str]) -> Arc<Self> {
            Self::delayed(name, urls, Duration::ZERO)
        }

        fn delayed(name: &'static str, urls: &[&'static str], delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                name,
                urls: urls.to_vec(),
                delay,
                enabled: true,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl StreamResolver for StaticResolver {
        fn name(&self) -> &'static str {
            self.name
        }

        fn applies(&self, _ctx: &ResolveContext) -> bool {
            self.enabled
        }

        async fn resolve(
            &self,
            _request: &ResolutionRequest,
            _ctx: &ResolveContext,
        ) -> Vec<StreamCandidate> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.urls
                .iter()
                .map(|url| StreamCandidate::new(self.name, format!("{} {}", self.name, url), *url))
                .collect()
        }
    }

    fn aggregator(
        live: Arc<StaticResolver>,
        anime: Vec<Arc<StaticResolver>>,
        media: Arc<StaticResolver>,
    ) -> Aggregator {
        Aggregator::new(
            live,
            anime
                .into_iter()
                .map(|r| r as Arc<dyn StreamResolver>)
                .collect(),
            media,
        )
    }

    #[tokio::test]
    async fn test_duplicate_urls_keep_first_title() {
        let agg = aggregator(
            StaticResolver::new("live", &[]),
            vec![
                StaticResolver::new("au", &["https://a", "https://shared"]),
                StaticResolver::new("as", &["https://shared", "https://b"]),
            ],
            StaticResolver::new("media", &[]),
        );

        let out = agg.resolve("kitsu:1:1", &AddonSettings::default()).await;
        let urls: Vec<_> = out.streams.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a", "https://shared", "https://b"]);
        assert_eq!(out.streams[1].title, "au https://shared");
    }

    #[tokio::test]
    async fn test_malformed_id_yields_empty_streams() {
        let media = StaticResolver::new("media", &["https://m"]);
        let agg = aggregator(StaticResolver::new("live", &[]), vec![], media.clone());

        let out = agg.resolve("tt0000000:abc", &AddonSettings::default()).await;
        assert!(out.streams.is_empty());
        assert_eq!(media.calls.load(Ordering::SeqCst), 0);

        assert!(agg.resolve("nonsense", &AddonSettings::default()).await.streams.is_empty());
    }

    #[tokio::test]
    async fn test_family_order_ignores_completion_order() {
        let agg = aggregator(
            StaticResolver::new("live", &["https://live"]),
            vec![
                StaticResolver::delayed("au", &["https://slow-au"], Duration::from_millis(50)),
                StaticResolver::new("as", &["https://fast-as"]),
            ],
            StaticResolver::new("media", &["https://media"]),
        );

        let out = agg.resolve("tt0944947:1:1", &AddonSettings::default()).await;
        let urls: Vec<_> = out.streams.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(urls, vec!["https://slow-au", "https://fast-as", "https://media"]);
    }

    #[tokio::test]
    async fn test_dispatch_by_source_kind() {
        let live = StaticResolver::new("live", &["https://live"]);
        let media = StaticResolver::new("media", &["https://media"]);
        let anime = StaticResolver::new("au", &["https://au"]);
        let agg = aggregator(live.clone(), vec![anime.clone()], media.clone());

        let out = agg.resolve("tv:rai1", &AddonSettings::default()).await;
        assert_eq!(out.streams.len(), 1);
        assert_eq!(out.streams[0].url, "https://live");

        let out = agg.resolve("mal:21:3", &AddonSettings::default()).await;
        assert_eq!(out.streams[0].url, "https://au");

        assert_eq!(live.calls.load(Ordering::SeqCst), 1);
        assert_eq!(anime.calls.load(Ordering::SeqCst), 1);
        assert_eq!(media.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_disabled_resolvers_are_skipped() {
        let disabled = Arc::new(StaticResolver {
            name: "au",
            urls: vec!["https://au"],
            delay: Duration::ZERO,
            enabled: false,
            calls: AtomicUsize::new(0),
        });
        let agg = aggregator(
            StaticResolver::new("live", &[]),
            vec![disabled.clone()],
            StaticResolver::new("media", &["https://media"]),
        );

        let out = agg.resolve("tmdb:603", &AddonSettings::default()).await;
        assert_eq!(out.streams.len(), 1);
        assert_eq!(disabled.calls.load(Ordering::SeqCst), 0);
    }
}
