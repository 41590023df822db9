//! AnimeUnity source, driven through its scraper script

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use tracing::debug;

use super::anime::{AnimeEpisode, AnimeHit, AnimeSource, StreamDescriptor};
use super::ResolveContext;
use crate::config::AddonSettings;
use crate::error::ResolveError;
use crate::models::StreamCandidate;
use crate::services::normalizer::normalize;
use crate::services::script::{args, ScriptRunner};

pub const SOURCE_TAG: &str = "StreamViX AU";

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    slug: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EpisodeResult {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    number: Value,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamResult {
    #[serde(default)]
    embed_url: Option<String>,
    #[serde(default)]
    mp4_url: Option<String>,
}

/// Scalar JSON id as text; null, empty and zero ids are absent
fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) if n.as_u64() != Some(0) => Some(n.to_string()),
        _ => None,
    }
}

/// Merge sub and dub results, dropping entries without name or id and
/// duplicates by name + id
fn merge_results(batches: Vec<Vec<SearchResult>>) -> Vec<AnimeHit> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for result in batches.into_iter().flatten() {
        let (Some(name), Some(id)) = (result.name.filter(|n| !n.is_empty()), id_text(&result.id))
        else {
            continue;
        };
        if !seen.insert(format!("{}|{}", name, id)) {
            continue;
        }
        out.push(AnimeHit {
            title: name,
            reference: id,
            slug: result.slug,
        });
    }
    out
}

/// Queries tried in order when the full title finds nothing
pub fn retry_queries(query: &str) -> Vec<String> {
    let mut out = Vec::new();
    if query.contains('\'') {
        out.push(query.replace('\'', ""));
    }
    if let Some((before, _)) = query.split_once('(') {
        out.push(before.trim().to_string());
    }
    let words: Vec<&str> = query.split(' ').collect();
    if words.len() > 3 {
        out.push(words[..3].join(" "));
    }

    let mut unique: Vec<String> = Vec::new();
    for candidate in out {
        if !candidate.is_empty() && candidate != query && !unique.contains(&candidate) {
            unique.push(candidate);
        }
    }
    unique
}

/// Hit title must be the query itself or its `(ITA)` / `(CR)` release
pub fn is_exact_release(title: &str, query: &str) -> bool {
    let base = normalize(query);
    let title = normalize(title);
    [
        base.clone(),
        format!("{} (ita)", base),
        format!("{} (cr)", base),
        format!("{} (ita) (cr)", base),
    ]
    .contains(&title)
}

pub struct AnimeUnitySource {
    runner: ScriptRunner,
}

impl AnimeUnitySource {
    pub fn new(runner: ScriptRunner) -> Self {
        Self { runner }
    }

    /// Sub and dub searches run together; either failing counts as empty
    async fn search_all(&self, query: &str) -> Vec<AnimeHit> {
        let sub_args = args(["search", "--query", query]);
        let dub_args = args(["search", "--query", query, "--dubbed"]);
        let (sub, dub) = tokio::join!(
            self.runner.run_json::<Vec<SearchResult>>(&sub_args),
            self.runner.run_json::<Vec<SearchResult>>(&dub_args),
        );

        let sub = sub.unwrap_or_else(|e| {
            debug!("AnimeUnity sub search failed for '{}': {}", query, e);
            Vec::new()
        });
        let dub = dub.unwrap_or_else(|e| {
            debug!("AnimeUnity dub search failed for '{}': {}", query, e);
            Vec::new()
        });
        debug!(sub = sub.len(), dub = dub.len(), "AnimeUnity search '{}'", query);

        merge_results(vec![sub, dub])
    }
}

#[async_trait]
impl AnimeSource for AnimeUnitySource {
    fn name(&self) -> &'static str {
        "animeunity"
    }

    fn source_tag(&self) -> &'static str {
        SOURCE_TAG
    }

    fn enabled(&self, settings: &AddonSettings) -> bool {
        settings.anime_unity_enabled
    }

    async fn search(
        &self,
        query: &str,
        _mal_id: Option<&str>,
    ) -> Result<Vec<AnimeHit>, ResolveError> {
        let hits = self.search_all(query).await;
        if !hits.is_empty() {
            return Ok(hits);
        }

        for retry in retry_queries(query) {
            let hits = self.search_all(&retry).await;
            if !hits.is_empty() {
                debug!("AnimeUnity found results with '{}'", retry);
                return Ok(hits);
            }
        }
        Ok(Vec::new())
    }

    fn filter_hits(&self, hits: Vec<AnimeHit>, query: &str, _mal_id: Option<&str>) -> Vec<AnimeHit> {
        hits.into_iter()
            .filter(|hit| is_exact_release(&hit.title, query))
            .collect()
    }

    async fn episodes(&self, hit: &AnimeHit) -> Result<Vec<AnimeEpisode>, ResolveError> {
        let episodes: Vec<EpisodeResult> = self
            .runner
            .run_json(&args(["get_episodes", "--anime-id", hit.reference.as_str()]))
            .await
            .map_err(|e| e.into_resolve_error("animeunity"))?;

        Ok(episodes
            .into_iter()
            .filter_map(|e| {
                let reference = id_text(&e.id)?;
                let number = id_text(&e.number)?;
                Some(AnimeEpisode {
                    reference,
                    number: number.parse().ok(),
                    title: e.name.unwrap_or_else(|| number.clone()),
                })
            })
            .collect())
    }

    async fn stream(
        &self,
        hit: &AnimeHit,
        episode: &AnimeEpisode,
        _ctx: &ResolveContext,
    ) -> Result<StreamDescriptor, ResolveError> {
        let slug = hit.slug.as_deref().unwrap_or_default();
        let result: StreamResult = self
            .runner
            .run_json(&args([
                "get_stream",
                "--anime-id",
                hit.reference.as_str(),
                "--anime-slug",
                slug,
                "--episode-id",
                episode.reference.as_str(),
            ]))
            .await
            .map_err(|e| e.into_resolve_error("animeunity"))?;

        Ok(StreamDescriptor {
            url: result.mp4_url.filter(|u| !u.is_empty()),
            embed_url: result.embed_url.filter(|u| !u.is_empty()),
            ..Default::default()
        })
    }

    /// mp4 through the MediaFlow stream proxy when configured, plus the
    /// embed page when both links were requested
    fn candidates(
        &self,
        descriptor: StreamDescriptor,
        title: &str,
        ctx: &ResolveContext,
    ) -> Vec<StreamCandidate> {
        let Some(mp4) = descriptor.url else {
            return Vec::new();
        };

        let url = match ctx.settings.media_flow() {
            Some(proxy) => proxy.stream_url(&mp4),
            None => mp4,
        };
        let mut out = vec![StreamCandidate::new(self.source_tag(), title, url).not_web_ready()];

        if ctx.settings.both_links {
            if let Some(embed) = descriptor.embed_url {
                out.push(
                    StreamCandidate::new(self.source_tag(), format!("[E] {}", title), embed).not_web_ready(),
                );
            }
        }
        out
    }
}
