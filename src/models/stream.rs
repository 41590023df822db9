use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which resolver family handles a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    LiveChannel,
    DirectMedia,
    ProxiedMedia,
    EpisodicExternal,
}

impl SourceKind {
    /// Media requests are served through the proxy whenever one is configured
    pub fn with_proxy(self, proxy_configured: bool) -> Self {
        match self {
            SourceKind::DirectMedia if proxy_configured => SourceKind::ProxiedMedia,
            SourceKind::ProxiedMedia if !proxy_configured => SourceKind::DirectMedia,
            other => other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::LiveChannel => "live-channel",
            SourceKind::DirectMedia => "direct-media",
            SourceKind::ProxiedMedia => "proxied-media",
            SourceKind::EpisodicExternal => "episodic-external",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content id namespace carried by the inbound identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentId {
    Channel(String),
    Imdb(String),
    Tmdb(String),
    Kitsu(String),
    Mal(String),
}

impl ContentId {
    pub fn value(&self) -> &str {
        match self {
            ContentId::Channel(v)
            | ContentId::Imdb(v)
            | ContentId::Tmdb(v)
            | ContentId::Kitsu(v)
            | ContentId::Mal(v) => v,
        }
    }

    pub fn source_kind(&self) -> SourceKind {
        match self {
            ContentId::Channel(_) => SourceKind::LiveChannel,
            ContentId::Imdb(_) | ContentId::Tmdb(_) => SourceKind::DirectMedia,
            ContentId::Kitsu(_) | ContentId::Mal(_) => SourceKind::EpisodicExternal,
        }
    }
}

/// Parsed, immutable form of an inbound stream request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionRequest {
    pub source_kind: SourceKind,
    pub content_id: ContentId,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    pub is_movie: bool,
}

impl ResolutionRequest {
    /// `S{season}E{episode}` with the season defaulting to 1
    pub fn episode_label(&self) -> Option<String> {
        self.episode
            .map(|ep| format!("S{}E{}", self.season.unwrap_or(1), ep))
    }
}

/// Playback hints attached to a candidate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorHints {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub not_web_ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
}

impl BehaviorHints {
    pub fn is_empty(&self) -> bool {
        !self.not_web_ready && self.headers.is_none()
    }
}

/// One playable option returned to the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamCandidate {
    #[serde(rename = "name")]
    pub source_tag: String,
    pub title: String,
    pub url: String,
    #[serde(
        rename = "behaviorHints",
        default,
        skip_serializing_if = "BehaviorHints::is_empty"
    )]
    pub hints: BehaviorHints,
}

impl StreamCandidate {
    pub fn new(source_tag: &str, title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            source_tag: source_tag.to_string(),
            title: title.into(),
            url: url.into(),
            hints: BehaviorHints::default(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.hints
            .headers
            .get_or_insert_with(BTreeMap::new)
            .insert(name.to_string(), value.into());
        self
    }

    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        if !headers.is_empty() {
            self.hints
                .headers
                .get_or_insert_with(BTreeMap::new)
                .extend(headers);
        }
        self
    }

    pub fn not_web_ready(mut self) -> Self {
        self.hints.not_web_ready = true;
        self
    }
}

/// Response body of the stream route
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamsResponse {
    pub streams: Vec<StreamCandidate>,
}
