//! AnimeSaturn source, driven through its scraper script

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

use super::anime::{AnimeEpisode, AnimeHit, AnimeSource, StreamDescriptor};
use super::ResolveContext;
use crate::config::AddonSettings;
use crate::error::ResolveError;
use crate::models::StreamCandidate;
use crate::services::normalizer::{fold_punctuation, normalize, strip_language_tags, strip_parentheses};
use crate::services::script::{args, ScriptRunner};

pub const SOURCE_TAG: &str = "StreamViX AS";

lazy_static! {
    static ref EPISODE_NUMBER: Regex = Regex::new(r"(?i)E(\d+)").unwrap();
    static ref SUB_TAG: Regex = Regex::new(r"(?i)\bsub\b").unwrap();
}

#[derive(Debug, Clone, Deserialize)]
struct SearchResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
}

#[derive(Debug, Deserialize)]
struct EpisodeResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
}

#[derive(Debug, Default, Deserialize)]
struct StreamResult {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    headers: Option<BTreeMap<String, String>>,
}

/// Title with parentheses and language markers removed contains the query
pub fn contains_title(title: &str, query: &str) -> bool {
    let base = normalize(query);
    let cleaned = strip_language_tags(&strip_parentheses(&normalize(title)));
    let cleaned = SUB_TAG.replace_all(&cleaned, "");
    normalize(&cleaned).contains(&base)
}

/// Episode number from an `E12`-style title
fn episode_number(title: &str) -> Option<u32> {
    EPISODE_NUMBER
        .captures(title)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Append results whose URL is not already present
fn merge_by_url(mut results: Vec<SearchResult>, more: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut seen: HashSet<String> = results.iter().map(|r| r.url.clone()).collect();
    for result in more {
        if seen.insert(result.url.clone()) {
            results.push(result);
        }
    }
    results
}

pub struct AnimeSaturnSource {
    runner: ScriptRunner,
}

impl AnimeSaturnSource {
    pub fn new(runner: ScriptRunner) -> Self {
        Self { runner }
    }

    async fn run_search(
        &self,
        query: &str,
        mal_id: Option<&str>,
    ) -> Result<Vec<SearchResult>, ResolveError> {
        let mut search_args = args(["search", "--query", query]);
        if let Some(mal_id) = mal_id {
            search_args.extend(args(["--mal-id", mal_id]));
        }
        self.runner
            .run_json(&search_args)
            .await
            .map_err(|e| e.into_resolve_error("animesaturn"))
    }
}

#[async_trait]
impl AnimeSource for AnimeSaturnSource {
    fn name(&self) -> &'static str {
        "animesaturn"
    }

    fn source_tag(&self) -> &'static str {
        SOURCE_TAG
    }

    fn enabled(&self, settings: &AddonSettings) -> bool {
        settings.anime_saturn_enabled
    }

    fn uses_mal_id(&self) -> bool {
        true
    }

    /// The catalogue sometimes stores titles with a typographic apostrophe;
    /// a thin result set for a title with `'` is retried with `’`
    async fn search(
        &self,
        query: &str,
        mal_id: Option<&str>,
    ) -> Result<Vec<AnimeHit>, ResolveError> {
        let mut results = self.run_search(query, mal_id).await?;

        if results.len() <= 1 && query.contains('\'') {
            let typographic = query.replace('\'', "\u{2019}");
            match self.run_search(&typographic, mal_id).await {
                Ok(more) => results = merge_by_url(results, more),
                Err(e) => debug!("AnimeSaturn retry with typographic apostrophe failed: {}", e),
            }
        }

        Ok(results
            .into_iter()
            .filter(|r| !r.url.is_empty())
            .map(|r| AnimeHit {
                title: fold_punctuation(&r.title),
                reference: r.url,
                slug: None,
            })
            .collect())
    }

    /// Searches by MAL id are trusted as is
    fn filter_hits(&self, hits: Vec<AnimeHit>, query: &str, mal_id: Option<&str>) -> Vec<AnimeHit> {
        if mal_id.is_some() {
            return hits;
        }
        hits.into_iter()
            .filter(|hit| contains_title(&hit.title, query))
            .collect()
    }

    async fn episodes(&self, hit: &AnimeHit) -> Result<Vec<AnimeEpisode>, ResolveError> {
        let episodes: Vec<EpisodeResult> = self
            .runner
            .run_json(&args(["get_episodes", "--anime-url", hit.reference.as_str()]))
            .await
            .map_err(|e| e.into_resolve_error("animesaturn"))?;

        Ok(episodes
            .into_iter()
            .filter(|e| !e.url.is_empty())
            .map(|e| AnimeEpisode {
                number: episode_number(&e.title),
                reference: e.url,
                title: e.title,
            })
            .collect())
    }

    /// Numbered titles must match exactly; unnumbered ones match on the
    /// number appearing anywhere in the title
    fn select_episode<'a>(
        &self,
        episodes: &'a [AnimeEpisode],
        episode: u32,
    ) -> Option<&'a AnimeEpisode> {
        let wanted = episode.to_string();
        episodes.iter().find(|e| match e.number {
            Some(number) => number == episode,
            None => e.title.contains(&wanted),
        })
    }

    async fn stream(
        &self,
        _hit: &AnimeHit,
        episode: &AnimeEpisode,
        ctx: &ResolveContext,
    ) -> Result<StreamDescriptor, ResolveError> {
        let mut stream_args = args(["get_stream", "--episode-url", episode.reference.as_str()]);
        if let Some(proxy) = ctx.settings.media_flow() {
            stream_args.extend(args([
                "--mfp-proxy-url",
                proxy.base(),
                "--mfp-proxy-password",
                proxy.password(),
            ]));
        }

        let result: StreamResult = self
            .runner
            .run_json(&stream_args)
            .await
            .map_err(|e| e.into_resolve_error("animesaturn"))?;

        Ok(StreamDescriptor {
            url: result.url.filter(|u| !u.is_empty()),
            embed_url: None,
            headers: result.headers.unwrap_or_default(),
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
            .map(|url| {
                vec![StreamCandidate::new(self.source_tag(), title, url)
                    .with_headers(descriptor.headers)
                    .not_web_ready()]
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn episode(title: &str) -> AnimeEpisode {
        AnimeEpisode {
            reference: format!("https://as/{}", title),
            number: episode_number(title),
            title: title.to_string(),
        }
    }

    fn source() -> AnimeSaturnSource {
        AnimeSaturnSource::new(ScriptRunner::new(
            "python3",
            "animesaturn.py",
            std::time::Duration::from_secs(1),
        ))
    }

    #[test]
    fn test_contains_title() {
        assert!(contains_title("Dr. Stone (ITA)", "Dr. Stone"));
        assert!(contains_title("Dr. Stone: Stone Wars Sub ITA", "dr. stone"));
        assert!(contains_title("L’attacco dei Giganti", "L'attacco dei Giganti"));
        assert!(!contains_title("One Piece", "Dr. Stone"));
    }

    #[test]
    fn test_mal_id_searches_skip_filter() {
        let hits = vec![AnimeHit {
            title: "Shingeki no Kyojin".into(),
            reference: "https://as/snk".into(),
            slug: None,
        }];
        assert_eq!(
            source().filter_hits(hits.clone(), "L'attacco dei Giganti", Some("16498")),
            hits
        );
        assert!(source()
            .filter_hits(hits, "L'attacco dei Giganti", None)
            .is_empty());
    }

    #[test]
    fn test_episode_selection() {
        let episodes = vec![episode("Ep 1"), episode("E2"), episode("Episodio E10")];
        let source = source();
        assert_eq!(source.select_episode(&episodes, 2).unwrap().title, "E2");
        assert_eq!(source.select_episode(&episodes, 10).unwrap().title, "Episodio E10");
        assert_eq!(source.select_episode(&episodes, 1).unwrap().title, "Ep 1");
        assert!(source.select_episode(&episodes, 7).is_none());
    }

    #[test]
    fn test_merge_by_url() {
        let first = vec![SearchResult {
            title: "A".into(),
            url: "u1".into(),
        }];
        let more = vec![
            SearchResult {
                title: "A’".into(),
                url: "u1".into(),
            },
            SearchResult {
                title: "B".into(),
                url: "u2".into(),
            },
        ];
        let merged = merge_by_url(first, more);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[1].url, "u2");
    }

    #[test]
    fn test_candidates_carry_headers() {
        let mut headers = BTreeMap::new();
        headers.insert("Referer".to_string(), "https://www.animesaturn.cx/".to_string());
        let ctx = ResolveContext::new(AddonSettings::default());
        let out = source().candidates(
            StreamDescriptor {
                url: Some("https://cdn/ep.m3u8".into()),
                embed_url: None,
                headers,
            },
            "Dr. stone SUB S1E1",
            &ctx,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source_tag, SOURCE_TAG);
        assert_eq!(
            out[0].hints.headers.as_ref().unwrap()["Referer"],
            "https://www.animesaturn.cx/"
        );
    }
}
