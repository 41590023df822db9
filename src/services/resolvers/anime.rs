//! Episodic-external (anime) resolution
//!
//! A title is looked up through the metadata chain, searched on the anime
//! source in every language variant, filtered against the searched title,
//! and the requested episode of each remaining hit is turned into
//! candidates. Sources only implement search / episodes / stream.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{ResolveContext, StreamResolver};
use crate::config::AddonSettings;
use crate::error::ResolveError;
use crate::models::{ResolutionRequest, StreamCandidate};
use crate::services::classifier::language_variant;
use crate::services::metadata::MetadataLookup;
use crate::services::normalizer::{capitalize, search_title, strip_language_tags};

/// One search result on an anime source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnimeHit {
    pub title: String,
    /// Source-specific reference (numeric id or page URL)
    pub reference: String,
    pub slug: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnimeEpisode {
    pub reference: String,
    pub number: Option<u32>,
    pub title: String,
}

/// What a source returns for one episode
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamDescriptor {
    pub url: Option<String>,
    pub embed_url: Option<String>,
    pub headers: BTreeMap<String, String>,
}

#[async_trait]
pub trait AnimeSource: Send + Sync {
    fn name(&self) -> &'static str;

    fn source_tag(&self) -> &'static str;

    fn enabled(&self, settings: &AddonSettings) -> bool;

    /// Whether searches take a MyAnimeList id
    fn uses_mal_id(&self) -> bool {
        false
    }

    async fn search(&self, query: &str, mal_id: Option<&str>)
        -> Result<Vec<AnimeHit>, ResolveError>;

    /// Drop hits that are not the searched title
    fn filter_hits(&self, hits: Vec<AnimeHit>, query: &str, mal_id: Option<&str>) -> Vec<AnimeHit>;

    async fn episodes(&self, hit: &AnimeHit) -> Result<Vec<AnimeEpisode>, ResolveError>;

    fn select_episode<'a>(
        &self,
        episodes: &'a [AnimeEpisode],
        episode: u32,
    ) -> Option<&'a AnimeEpisode> {
        episodes.iter().find(|e| e.number == Some(episode))
    }

    async fn stream(
        &self,
        hit: &AnimeHit,
        episode: &AnimeEpisode,
        ctx: &ResolveContext,
    ) -> Result<StreamDescriptor, ResolveError>;

    /// Candidates for one resolved episode, titled `title`
    fn candidates(
        &self,
        descriptor: StreamDescriptor,
        title: &str,
        ctx: &ResolveContext,
    ) -> Vec<StreamCandidate>;
}

/// `{Name} {LANG} S{season}[E{episode}]`
pub fn stream_title(hit_title: &str, request: &ResolutionRequest) -> String {
    let name = capitalize(&strip_language_tags(hit_title));
    let mut title = format!(
        "{} {} S{}",
        name,
        language_variant(hit_title),
        request.season.unwrap_or(1)
    );
    if let Some(episode) = request.episode {
        title.push_str(&format!("E{}", episode));
    }
    title
}

/// `StreamResolver` over one anime source
pub struct EpisodicResolver<S> {
    source: S,
    metadata: Arc<dyn MetadataLookup>,
}

impl<S: AnimeSource> EpisodicResolver<S> {
    pub fn new(source: S, metadata: Arc<dyn MetadataLookup>) -> Self {
        Self { source, metadata }
    }

    async fn resolve_hit(
        &self,
        hit: &AnimeHit,
        request: &ResolutionRequest,
        ctx: &ResolveContext,
    ) -> Result<Vec<StreamCandidate>, ResolveError> {
        let episodes = self.source.episodes(hit).await?;

        let target = match request.episode {
            Some(episode) if !request.is_movie => self.source.select_episode(&episodes, episode),
            _ => episodes.first(),
        };
        let Some(target) = target else {
            debug!(
                source = self.source.name(),
                "No episode {:?} for {}",
                request.episode,
                hit.title
            );
            return Ok(Vec::new());
        };

        let descriptor = self.source.stream(hit, target, ctx).await?;
        let title = stream_title(&hit.title, request);
        Ok(self.source.candidates(descriptor, &title, ctx))
    }
}

#[async_trait]
impl<S: AnimeSource> StreamResolver for EpisodicResolver<S> {
    fn name(&self) -> &'static str {
        self.source.name()
    }

    fn applies(&self, ctx: &ResolveContext) -> bool {
        self.source.enabled(&ctx.settings)
    }

    async fn resolve(
        &self,
        request: &ResolutionRequest,
        ctx: &ResolveContext,
    ) -> Vec<StreamCandidate> {
        let tmdb_key = ctx.settings.tmdb_key();
        let title = match self.metadata.english_title(&request.content_id, tmdb_key).await {
            Ok(title) => title,
            Err(e) => {
                warn!(source = self.source.name(), "No title for {}: {}", request.content_id.value(), e);
                return Vec::new();
            }
        };

        let query = search_title(&title);
        let mal_id = if self.source.uses_mal_id() {
            self.metadata
                .mal_id(&request.content_id, tmdb_key)
                .await
                .unwrap_or_else(|e| {
                    debug!("MAL id lookup failed: {}", e);
                    None
                })
        } else {
            None
        };

        let hits = match self.source.search(&query, mal_id.as_deref()).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(source = self.source.name(), "Search failed for '{}': {}", query, e);
                return Vec::new();
            }
        };
        let hits = self.source.filter_hits(hits, &query, mal_id.as_deref());
        if hits.is_empty() {
            info!(source = self.source.name(), "No results for '{}'", query);
            return Vec::new();
        }

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for hit in &hits {
            match self.resolve_hit(hit, request, ctx).await {
                Ok(candidates) => out.extend(
                    candidates
                        .into_iter()
                        .filter(|c| seen.insert(c.url.clone())),
                ),
                Err(e) => warn!(source = self.source.name(), "Failed on '{}': {}", hit.title, e),
            }
        }

        debug!(source = self.source.name(), count = out.len(), "Anime streams resolved");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::identifier::parse;
    use crate::services::resolvers::media::tests::FakeMetadata;
    use std::sync::Mutex;

    struct FakeSource {
        hits: Vec<AnimeHit>,
        episodes: Vec<AnimeEpisode>,
        searched: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AnimeSource for FakeSource {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn source_tag(&self) -> &'static str {
            "StreamViX Fake"
        }

        fn enabled(&self, _settings: &AddonSettings) -> bool {
            true
        }

        async fn search(
            &self,
            query: &str,
            _mal_id: Option<&str>,
        ) -> Result<Vec<AnimeHit>, ResolveError> {
            self.searched.lock().unwrap().push(query.to_string());
            Ok(self.hits.clone())
        }

        fn filter_hits(
            &self,
            hits: Vec<AnimeHit>,
            _query: &str,
            _mal_id: Option<&str>,
        ) -> Vec<AnimeHit> {
            hits
        }

        async fn episodes(&self, _hit: &AnimeHit) -> Result<Vec<AnimeEpisode>, ResolveError> {
            Ok(self.episodes.clone())
        }

        async fn stream(
            &self,
            hit: &AnimeHit,
            episode: &AnimeEpisode,
            _ctx: &ResolveContext,
        ) -> Result<StreamDescriptor, ResolveError> {
            if hit.reference == "broken" {
                return Err(ResolveError::upstream("fake", "boom"));
            }
            Ok(StreamDescriptor {
                url: Some(format!("https://cdn/{}/{}.mp4", hit.reference, episode.reference)),
                ..Default::default()
            })
        }

        fn candidates(
            &self,
            descriptor: StreamDescriptor,
            title: &str,
            _ctx: &ResolveContext,
        ) -> Vec<StreamCandidate> {
            descriptor
                .url
                .map(|url| vec![StreamCandidate::new(self.source_tag(), title, url)])
                .unwrap_or_default()
        }
    }

    fn hit(title: &str, reference: &str) -> AnimeHit {
        AnimeHit {
            title: title.into(),
            reference: reference.into(),
            slug: None,
        }
    }

    fn episode(number: u32) -> AnimeEpisode {
        AnimeEpisode {
            reference: format!("ep{}", number),
            number: Some(number),
            title: format!("Episodio {}", number),
        }
    }

    fn metadata(title: Option<&str>) -> Arc<FakeMetadata> {
        Arc::new(FakeMetadata {
            tmdb_id: None,
            title: None,
            english_title: title.map(str::to_string),
            mal_id: None,
        })
    }

    #[test]
    fn test_stream_title() {
        let request = parse("kitsu:1376:5").unwrap();
        assert_eq!(stream_title("one piece (ITA)", &request), "One piece ITA S1E5");

        let movie = parse("mal:5114").unwrap();
        assert_eq!(stream_title("Fullmetal Alchemist", &movie), "Fullmetal Alchemist SUB S1");
    }

    #[tokio::test]
    async fn test_resolves_each_variant_and_skips_failures() {
        let source = FakeSource {
            hits: vec![
                hit("Attack on Titan", "1"),
                hit("Attack on Titan (ITA)", "2"),
                hit("Attack on Titan (CR)", "broken"),
            ],
            episodes: vec![episode(1), episode(2), episode(3)],
            searched: Mutex::new(Vec::new()),
        };
        let resolver = EpisodicResolver::new(source, metadata(Some("Attack on Titan")));
        let ctx = ResolveContext::new(AddonSettings::default());

        let out = resolver.resolve(&parse("kitsu:7442:2").unwrap(), &ctx).await;

        assert_eq!(
            resolver.source.searched.lock().unwrap().as_slice(),
            ["L'attacco dei Giganti"]
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].title, "Attack on Titan SUB S1E2");
        assert_eq!(out[0].url, "https://cdn/1/ep2.mp4");
        assert_eq!(out[1].title, "Attack on Titan ITA S1E2");
    }

    #[tokio::test]
    async fn test_movie_takes_first_episode() {
        let source = FakeSource {
            hits: vec![hit("Your Name", "9")],
            episodes: vec![episode(1)],
            searched: Mutex::new(Vec::new()),
        };
        let resolver = EpisodicResolver::new(source, metadata(Some("Your Name")));
        let ctx = ResolveContext::new(AddonSettings::default());

        let out = resolver.resolve(&parse("mal:32281").unwrap(), &ctx).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].url, "https://cdn/9/ep1.mp4");
    }

    #[tokio::test]
    async fn test_missing_title_or_episode_yields_nothing() {
        let ctx = ResolveContext::new(AddonSettings::default());

        let untitled = EpisodicResolver::new(
            FakeSource {
                hits: vec![hit("Bleach", "1")],
                episodes: vec![episode(1)],
                searched: Mutex::new(Vec::new()),
            },
            metadata(None),
        );
        assert!(untitled.resolve(&parse("kitsu:1").unwrap(), &ctx).await.is_empty());
        assert!(untitled.source.searched.lock().unwrap().is_empty());

        let short = EpisodicResolver::new(
            FakeSource {
                hits: vec![hit("Bleach", "1")],
                episodes: vec![episode(1)],
                searched: Mutex::new(Vec::new()),
            },
            metadata(Some("Bleach")),
        );
        assert!(short.resolve(&parse("kitsu:1:40").unwrap(), &ctx).await.is_empty());
    }
}
