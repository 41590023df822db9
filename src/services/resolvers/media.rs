//! Direct / proxied media resolver
//!
//! Movies and series by IMDb or TMDB id, extracted from the player page of
//! a single upstream site. The direct link is a short-lived signed playlist
//! URL; the proxied link goes through the MediaFlow extractor endpoint.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use super::{LinkPolicy, ResolveContext, StreamResolver};
use crate::error::ResolveError;
use crate::models::{ResolutionRequest, StreamCandidate};
use crate::services::http::PageFetcher;
use crate::services::metadata::{MetadataLookup, TmdbKind};
use crate::services::proxy::{ExtractorResponse, MediaFlowProxy};

pub const SOURCE_TAG: &str = "StreamViX Vx";
pub const DEFAULT_HOST: &str = "vixsrc.to";

const EXTRACTOR_HOST: &str = "VixCloud";
const VERSION_PATH: &str = "/richiedi-un-titolo";
const TITLE_SUFFIXES: [&str; 3] = [" - VixSrc", " - Guarda Online", " - Streaming"];

lazy_static! {
    static ref TOKEN: Regex = Regex::new(r"'token':\s*'(\w+)'").unwrap();
    static ref EXPIRES: Regex = Regex::new(r"'expires':\s*'(\d+)'").unwrap();
    static ref SERVER_URL: Regex = Regex::new(r"url:\s*'([^']+)'").unwrap();
    static ref AFTER_PIPE: Regex = Regex::new(r"\s*\|.*$").unwrap();
}

/// Signed playlist found in a player page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerStream {
    pub url: String,
}

// ============ PAGE PARSING ============

/// `version` from the Inertia `data-page` payload of `div#app`
pub fn site_version(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("div#app").ok()?;
    let data_page = document.select(&selector).next()?.value().attr("data-page")?;
    let page: Value = serde_json::from_str(data_page).ok()?;
    page.get("version")?.as_str().map(str::to_string)
}

/// `src` of the first iframe
pub fn iframe_src(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("iframe").ok()?;
    document
        .select(&selector)
        .next()?
        .value()
        .attr("src")
        .map(str::to_string)
}

/// Page `<title>` with the site suffixes removed
pub fn page_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("title").ok()?;
    let raw: String = document.select(&selector).next()?.text().collect();

    let mut title = raw.trim().to_string();
    for suffix in TITLE_SUFFIXES {
        title = title.replacen(suffix, "", 1);
    }
    let title = AFTER_PIPE.replace(&title, "").trim().to_string();
    (!title.is_empty()).then_some(title)
}

/// Build the signed playlist URL from the player script
pub fn player_stream(html: &str) -> Option<PlayerStream> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("body script").ok()?;
    let script: String = document
        .select(&selector)
        .map(|el| el.text().collect::<String>())
        .find(|text| text.contains("'token':") && text.contains("'expires':"))?;

    let token = TOKEN.captures(&script)?.get(1)?.as_str();
    let expires = EXPIRES.captures(&script)?.get(1)?.as_str();
    let server_url = SERVER_URL.captures(&script)?.get(1)?.as_str();

    let separator = if server_url.contains("?b=1") { '&' } else { '?' };
    let mut url = format!(
        "{}{}token={}&expires={}",
        server_url, separator, token, expires
    );
    if script.contains("window.canPlayFHD = true") {
        url.push_str("&h=1");
    }

    Some(PlayerStream { url })
}

// ============ RESOLVER ============

pub struct MediaResolver {
    origin: String,
    site: Arc<dyn PageFetcher>,
    extractor: Arc<dyn PageFetcher>,
    metadata: Arc<dyn MetadataLookup>,
}

impl MediaResolver {
    pub fn new(
        host: &str,
        site: Arc<dyn PageFetcher>,
        extractor: Arc<dyn PageFetcher>,
        metadata: Arc<dyn MetadataLookup>,
    ) -> Self {
        let host = host.trim().trim_end_matches('/');
        let origin = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{}", host)
        };
        Self {
            origin,
            site,
            extractor,
            metadata,
        }
    }

    fn kind(request: &ResolutionRequest) -> TmdbKind {
        if request.is_movie {
            TmdbKind::Movie
        } else {
            TmdbKind::Tv
        }
    }

    /// ` (S{s}E{e})` for series, empty for movies
    fn episode_suffix(request: &ResolutionRequest) -> String {
        if request.is_movie {
            return String::new();
        }
        format!(
            " (S{}E{})",
            request.season.unwrap_or(1),
            request.episode.unwrap_or(1)
        )
    }

    /// Canonical player page for a TMDB id
    pub fn target_url(&self, tmdb_id: &str, request: &ResolutionRequest) -> String {
        if request.is_movie {
            format!("{}/movie/{}/", self.origin, tmdb_id)
        } else {
            format!(
                "{}/tv/{}/{}/{}/",
                self.origin,
                tmdb_id,
                request.season.unwrap_or(1),
                request.episode.unwrap_or(1)
            )
        }
    }

    /// Whether the site lists the title; any failure counts as "not listed"
    async fn is_listed(&self, tmdb_id: &str, kind: TmdbKind) -> bool {
        let url = format!("{}/api/list/{}?lang=it", self.origin, kind.path());
        match self.site.fetch_json(&url).await {
            Ok(Value::Array(items)) => items.iter().any(|item| match item.get("tmdb_id") {
                Some(Value::Number(n)) => n.to_string() == tmdb_id,
                Some(Value::String(s)) => s == tmdb_id,
                _ => false,
            }),
            Ok(_) => {
                warn!("Unexpected availability list format for {}", kind.path());
                false
            }
            Err(e) => {
                warn!("Availability check failed: {}", e);
                false
            }
        }
    }

    async fn metadata_title(
        &self,
        tmdb_id: &str,
        kind: TmdbKind,
        ctx: &ResolveContext,
    ) -> Option<String> {
        match self
            .metadata
            .localized_title(tmdb_id, kind, ctx.settings.tmdb_key())
            .await
        {
            Ok(title) => title,
            Err(e) => {
                debug!("Metadata title lookup failed for {}: {}", tmdb_id, e);
                None
            }
        }
    }

    /// Proxied candidate. Without a proxy this is `None`, or the
    /// placeholder when both links were requested.
    async fn proxied(
        &self,
        target: &str,
        request: &ResolutionRequest,
        title: Option<&str>,
        ctx: &ResolveContext,
    ) -> Option<StreamCandidate> {
        let suffix = Self::episode_suffix(request);

        let Some(proxy) = ctx.settings.media_flow() else {
            if ctx.policy != LinkPolicy::Both {
                return None;
            }
            let name = match title {
                Some(title) => format!("{}{} (Proxy Missing)", title, suffix),
                None => "Proxy Missing".to_string(),
            };
            return Some(
                StreamCandidate::new(SOURCE_TAG, name, "")
                    .with_header("Referer", target)
                    .not_web_ready(),
            );
        };

        let name = match title {
            Some(title) => format!("{}{} (Proxy)", title, suffix),
            None if request.is_movie => "Movie Stream (Proxy)".to_string(),
            None => format!("Series Stream (Proxy){}", suffix),
        };
        let url = self.extract_through_proxy(&proxy, target).await;

        Some(
            StreamCandidate::new(SOURCE_TAG, name, url)
                .with_header("Referer", target)
                .not_web_ready(),
        )
    }

    /// Ask the extractor for the final playlist; fall back to the
    /// redirecting endpoint
    async fn extract_through_proxy(&self, proxy: &MediaFlowProxy, target: &str) -> String {
        let redirecting = proxy.extractor_url(EXTRACTOR_HOST, target, true);
        let descriptor = proxy.extractor_url(EXTRACTOR_HOST, target, false);

        let response = match self.extractor.fetch_json(&descriptor).await {
            Ok(value) => value,
            Err(e) => {
                warn!("Extractor request failed, using redirect URL: {}", e);
                return redirecting;
            }
        };

        match serde_json::from_value::<ExtractorResponse>(response)
            .ok()
            .and_then(ExtractorResponse::into_stream_url)
        {
            Some(url) => url,
            None => {
                warn!("Extractor response had no mediaflow_proxy_url, using redirect URL");
                redirecting
            }
        }
    }

    /// Player page HTML and the referer it must be played with
    async fn player_page(&self, target: &str) -> Result<(String, String), ResolveError> {
        if !target.contains("/iframe") {
            let html = self.site.fetch_text(target, &[]).await?;
            return Ok((html, target.to_string()));
        }

        let version_page = self
            .site
            .fetch_text(
                &format!("{}{}", self.origin, VERSION_PATH),
                &[
                    ("Referer", format!("{}/", self.origin)),
                    ("Origin", self.origin.clone()),
                ],
            )
            .await?;
        let version = site_version(&version_page)
            .ok_or_else(|| ResolveError::upstream("vixsrc", "site version not found"))?;

        let iframe_page = self
            .site
            .fetch_text(
                target,
                &[
                    ("x-inertia", "true".to_string()),
                    ("x-inertia-version", version.clone()),
                    ("Referer", format!("{}/", self.origin)),
                ],
            )
            .await?;
        let src = iframe_src(&iframe_page)
            .ok_or_else(|| ResolveError::upstream("vixsrc", "iframe src not found"))?;
        let player_url = Url::parse(&self.origin)
            .and_then(|origin| origin.join(&src))
            .map_err(|e| ResolveError::upstream("vixsrc", format!("bad iframe src: {}", e)))?
            .to_string();

        let html = self
            .site
            .fetch_text(
                &player_url,
                &[
                    ("x-inertia", "true".to_string()),
                    ("x-inertia-version", version),
                    ("Referer", target.to_string()),
                ],
            )
            .await?;
        Ok((html, player_url))
    }

    async fn direct(
        &self,
        target: &str,
        request: &ResolutionRequest,
        title: Option<&str>,
    ) -> Result<StreamCandidate, ResolveError> {
        let (html, referer) = self.player_page(target).await?;
        let stream = player_stream(&html)
            .ok_or_else(|| ResolveError::upstream("vixsrc", "player script with token/expires not found"))?;

        let suffix = Self::episode_suffix(request);
        let base = title.map(str::to_string).or_else(|| page_title(&html));
        let name = match base {
            Some(base) => format!("{}{}", base, suffix),
            None if request.is_movie => "Movie Stream (Direct)".to_string(),
            None => format!("Series Stream (Direct){}", suffix),
        };

        Ok(StreamCandidate::new(SOURCE_TAG, name, stream.url)
            .with_header("Referer", referer)
            .not_web_ready())
    }

    async fn try_resolve(
        &self,
        request: &ResolutionRequest,
        ctx: &ResolveContext,
    ) -> Result<Vec<StreamCandidate>, ResolveError> {
        let tmdb_id = self
            .metadata
            .tmdb_id(&request.content_id, ctx.settings.tmdb_key())
            .await
            .map_err(|e| ResolveError::upstream("tmdb", e))?;
        let Some(tmdb_id) = tmdb_id else {
            debug!("No TMDB id for {}", request.content_id.value());
            return Ok(Vec::new());
        };

        let kind = Self::kind(request);
        if !self.is_listed(&tmdb_id, kind).await {
            info!("TMDB {} not listed for {}", tmdb_id, kind.path());
            return Ok(Vec::new());
        }

        let target = self.target_url(&tmdb_id, request);
        let title = self.metadata_title(&tmdb_id, kind, ctx).await;
        let mut out = Vec::new();

        if ctx.policy.wants_proxied() {
            out.extend(self.proxied(&target, request, title.as_deref(), ctx).await);
        }
        if ctx.policy.wants_direct() {
            match self.direct(&target, request, title.as_deref()).await {
                Ok(candidate) => out.push(candidate),
                Err(e) => warn!("Direct extraction failed for {}: {}", target, e),
            }
        }

        Ok(out)
    }
}

#[async_trait]
impl StreamResolver for MediaResolver {
    fn name(&self) -> &'static str {
        "media"
    }

    async fn resolve(
        &self,
        request: &ResolutionRequest,
        ctx: &ResolveContext,
    ) -> Vec<StreamCandidate> {
        match self.try_resolve(request, ctx).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(source = self.name(), "Media resolution failed: {}", e);
                Vec::new()
            }
        }
    }
}
