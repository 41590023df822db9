//! Metadata client
//!
//! Title and id lookups against TMDB, Jikan (MyAnimeList), Kitsu and the
//! arm.haglund.dev id mapper.

use async_trait::async_trait;
use lru::LruCache;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::ContentId;

const TMDB_API_BASE_URL: &str = "https://api.themoviedb.org/3";
const JIKAN_API_BASE_URL: &str = "https://api.jikan.moe/v4";
const KITSU_API_BASE_URL: &str = "https://kitsu.io/api/edge";
const HAGLUND_API_BASE_URL: &str = "https://arm.haglund.dev/api/v2";

/// Entries kept in the IMDb -> TMDB memo
const TMDB_ID_MEMO_SIZE: usize = 2048;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP error: {0}")]
    Http(u16),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("TMDB API key not configured")]
    MissingApiKey,
    #[error("no title found for {0}")]
    NotFound(String),
}

/// TMDB media type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TmdbKind {
    Movie,
    Tv,
}

impl TmdbKind {
    pub fn path(&self) -> &'static str {
        match self {
            TmdbKind::Movie => "movie",
            TmdbKind::Tv => "tv",
        }
    }
}

#[async_trait]
pub trait MetadataLookup: Send + Sync {
    /// TMDB id for an IMDb or TMDB content id
    async fn tmdb_id(
        &self,
        content: &ContentId,
        api_key: Option<&str>,
    ) -> Result<Option<String>, MetadataError>;

    /// Italian display title from TMDB
    async fn localized_title(
        &self,
        tmdb_id: &str,
        kind: TmdbKind,
        api_key: Option<&str>,
    ) -> Result<Option<String>, MetadataError>;

    /// MyAnimeList id for any content id
    async fn mal_id(
        &self,
        content: &ContentId,
        api_key: Option<&str>,
    ) -> Result<Option<String>, MetadataError>;

    /// English title used to search anime catalogues. Each source in the
    /// chain is optional; the first that answers wins.
    async fn english_title(
        &self,
        content: &ContentId,
        api_key: Option<&str>,
    ) -> Result<String, MetadataError>;
}

// ============ WIRE TYPES ============

#[derive(Debug, Deserialize)]
struct TmdbRef {
    id: u64,
}

#[derive(Debug, Default, Deserialize)]
struct FindResponse {
    #[serde(default)]
    movie_results: Vec<TmdbRef>,
    #[serde(default)]
    tv_results: Vec<TmdbRef>,
}

impl FindResponse {
    fn first_id(&self) -> Option<String> {
        self.movie_results
            .first()
            .or_else(|| self.tv_results.first())
            .map(|r| r.id.to_string())
    }
}

#[derive(Debug, Default, Deserialize)]
struct TmdbDetails {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

impl TmdbDetails {
    fn display_title(self) -> Option<String> {
        self.title
            .or(self.name)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct JikanResponse {
    #[serde(default)]
    data: Option<JikanAnime>,
}

#[derive(Debug, Default, Deserialize)]
struct JikanAnime {
    #[serde(default)]
    titles: Vec<JikanTitle>,
    #[serde(default)]
    title_english: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    title_japanese: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JikanTitle {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    title: String,
}

impl JikanAnime {
    /// titles[type=English] -> title_english -> title -> title_japanese
    fn english_title(self) -> Option<String> {
        let listed = self
            .titles
            .into_iter()
            .find(|t| t.kind == "English" && !t.title.trim().is_empty())
            .map(|t| t.title);

        listed
            .or(self.title_english)
            .or(self.title)
            .or(self.title_japanese)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct KitsuMappings {
    #[serde(default)]
    data: Vec<KitsuMapping>,
}

#[derive(Debug, Deserialize)]
struct KitsuMapping {
    attributes: KitsuMappingAttributes,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KitsuMappingAttributes {
    #[serde(default)]
    external_site: String,
    #[serde(default)]
    external_id: serde_json::Value,
}

impl KitsuMappings {
    fn mal_id(&self) -> Option<String> {
        self.data
            .iter()
            .find(|m| m.attributes.external_site == "myanimelist/anime")
            .and_then(|m| match &m.attributes.external_id {
                serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
    }
}

#[derive(Debug, Deserialize)]
struct KitsuAnime {
    data: KitsuAnimeData,
}

#[derive(Debug, Deserialize)]
struct KitsuAnimeData {
    attributes: KitsuAnimeAttributes,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KitsuAnimeAttributes {
    #[serde(default)]
    titles: std::collections::HashMap<String, Option<String>>,
    #[serde(default)]
    canonical_title: Option<String>,
}

impl KitsuAnimeAttributes {
    fn english_title(self) -> Option<String> {
        let mut titles = self.titles;
        titles
            .remove("en")
            .flatten()
            .or(self.canonical_title)
            .filter(|t| !t.trim().is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct HaglundEntry {
    #[serde(default)]
    myanimelist: Option<u64>,
}

// ============ CLIENT ============

/// HTTP metadata client
pub struct MetadataClient {
    http: Client,
    tmdb_ids: Mutex<LruCache<String, String>>,
}

impl MetadataClient {
    pub fn new(http: Client) -> Self {
        let capacity = NonZeroUsize::new(TMDB_ID_MEMO_SIZE).unwrap_or(NonZeroUsize::MIN);
        Self {
            http,
            tmdb_ids: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// GET and decode JSON. `what` names the request in logs so that API
    /// keys in the URL are never written out.
    async fn get<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T, MetadataError> {
        debug!("Metadata request: {}", what);

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| MetadataError::Network(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MetadataError::Http(status.as_u16()));
        }

        let text = response
            .text()
            .await
            .map_err(|e| MetadataError::Network(e.without_url().to_string()))?;

        serde_json::from_str(&text).map_err(|e| {
            warn!("Failed to parse metadata response for {}: {}", what, e);
            MetadataError::Parse(e.to_string())
        })
    }

    fn memoized_tmdb_id(&self, imdb_id: &str) -> Option<String> {
        self.tmdb_ids
            .lock()
            .ok()
            .and_then(|mut memo| memo.get(imdb_id).cloned())
    }

    fn memoize_tmdb_id(&self, imdb_id: &str, tmdb_id: &str) {
        if let Ok(mut memo) = self.tmdb_ids.lock() {
            memo.put(imdb_id.to_string(), tmdb_id.to_string());
        }
    }

    async fn tmdb_details(
        &self,
        tmdb_id: &str,
        kind: TmdbKind,
        api_key: &str,
        language: Option<&str>,
    ) -> Result<Option<String>, MetadataError> {
        let mut url = format!(
            "{}/{}/{}?api_key={}",
            TMDB_API_BASE_URL,
            kind.path(),
            urlencoding::encode(tmdb_id),
            urlencoding::encode(api_key)
        );
        if let Some(language) = language {
            url.push_str("&language=");
            url.push_str(language);
        }
        let details: TmdbDetails = self
            .get(&url, &format!("tmdb {} {}", kind.path(), tmdb_id))
            .await?;
        Ok(details.display_title())
    }

    async fn haglund_mal_id(&self, tmdb_id: &str) -> Result<Option<String>, MetadataError> {
        let url = format!(
            "{}/themoviedb?id={}&include=kitsu,myanimelist",
            HAGLUND_API_BASE_URL,
            urlencoding::encode(tmdb_id)
        );
        let entries: Vec<HaglundEntry> = self.get(&url, &format!("haglund {}", tmdb_id)).await?;
        Ok(entries
            .first()
            .and_then(|e| e.myanimelist)
            .map(|id| id.to_string()))
    }

    async fn kitsu_mal_id(&self, kitsu_id: &str) -> Result<Option<String>, MetadataError> {
        let url = format!(
            "{}/anime/{}/mappings",
            KITSU_API_BASE_URL,
            urlencoding::encode(kitsu_id)
        );
        let mappings: KitsuMappings = self.get(&url, &format!("kitsu mappings {}", kitsu_id)).await?;
        Ok(mappings.mal_id())
    }

    async fn kitsu_title(&self, kitsu_id: &str) -> Result<Option<String>, MetadataError> {
        let url = format!("{}/anime/{}", KITSU_API_BASE_URL, urlencoding::encode(kitsu_id));
        let anime: KitsuAnime = self.get(&url, &format!("kitsu anime {}", kitsu_id)).await?;
        Ok(anime.data.attributes.english_title())
    }

    async fn jikan_title(&self, mal_id: &str) -> Result<Option<String>, MetadataError> {
        let url = format!("{}/anime/{}", JIKAN_API_BASE_URL, urlencoding::encode(mal_id));
        let response: JikanResponse = self.get(&url, &format!("jikan {}", mal_id)).await?;
        Ok(response.data.and_then(JikanAnime::english_title))
    }
}

#[async_trait]
impl MetadataLookup for MetadataClient {
    async fn tmdb_id(
        &self,
        content: &ContentId,
        api_key: Option<&str>,
    ) -> Result<Option<String>, MetadataError> {
        let imdb_id = match content {
            ContentId::Tmdb(id) => return Ok(Some(id.clone())),
            ContentId::Imdb(id) => id,
            _ => return Ok(None),
        };

        if let Some(tmdb_id) = self.memoized_tmdb_id(imdb_id) {
            return Ok(Some(tmdb_id));
        }

        let api_key = api_key.ok_or(MetadataError::MissingApiKey)?;
        let url = format!(
            "{}/find/{}?api_key={}&external_source=imdb_id",
            TMDB_API_BASE_URL,
            urlencoding::encode(imdb_id),
            urlencoding::encode(api_key)
        );
        let found: FindResponse = self.get(&url, &format!("tmdb find {}", imdb_id)).await?;

        let tmdb_id = found.first_id();
        match &tmdb_id {
            Some(id) => self.memoize_tmdb_id(imdb_id, id),
            None => debug!("No TMDB result for {}", imdb_id),
        }
        Ok(tmdb_id)
    }

    async fn localized_title(
        &self,
        tmdb_id: &str,
        kind: TmdbKind,
        api_key: Option<&str>,
    ) -> Result<Option<String>, MetadataError> {
        let api_key = api_key.ok_or(MetadataError::MissingApiKey)?;
        self.tmdb_details(tmdb_id, kind, api_key, Some("it")).await
    }

    async fn mal_id(
        &self,
        content: &ContentId,
        api_key: Option<&str>,
    ) -> Result<Option<String>, MetadataError> {
        match content {
            ContentId::Mal(id) => Ok(Some(id.clone())),
            ContentId::Kitsu(id) => self.kitsu_mal_id(id).await,
            ContentId::Imdb(_) | ContentId::Tmdb(_) => match self.tmdb_id(content, api_key).await? {
                Some(tmdb_id) => self.haglund_mal_id(&tmdb_id).await,
                None => Ok(None),
            },
            ContentId::Channel(_) => Ok(None),
        }
    }

    async fn english_title(
        &self,
        content: &ContentId,
        api_key: Option<&str>,
    ) -> Result<String, MetadataError> {
        let tmdb_id = match content {
            ContentId::Imdb(_) => Some(
                self.tmdb_id(content, api_key)
                    .await?
                    .ok_or_else(|| MetadataError::NotFound(content.value().to_string()))?,
            ),
            ContentId::Tmdb(id) => Some(id.clone()),
            _ => None,
        };

        let mal_id = match self.mal_id(content, api_key).await {
            Ok(id) => id,
            Err(e) => {
                debug!("MAL id lookup failed for {}: {}", content.value(), e);
                None
            }
        };

        if let Some(mal_id) = mal_id {
            match self.jikan_title(&mal_id).await {
                Ok(Some(title)) => return Ok(title),
                Ok(None) => {}
                Err(e) => warn!("Jikan lookup failed for MAL {}: {}", mal_id, e),
            }
        }

        if let ContentId::Kitsu(kitsu_id) = content {
            match self.kitsu_title(kitsu_id).await {
                Ok(Some(title)) => return Ok(title),
                Ok(None) => {}
                Err(e) => warn!("Kitsu lookup failed for {}: {}", kitsu_id, e),
            }
        }

        if let (Some(tmdb_id), Some(api_key)) = (tmdb_id, api_key) {
            for kind in [TmdbKind::Tv, TmdbKind::Movie] {
                match self.tmdb_details(&tmdb_id, kind, api_key, None).await {
                    Ok(Some(title)) => return Ok(title),
                    Ok(None) => {}
                    Err(e) => debug!("TMDB {} lookup failed for {}: {}", kind.path(), tmdb_id, e),
                }
            }
        }

        Err(MetadataError::NotFound(content.value().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_response_prefers_movies() {
        let found: FindResponse = serde_json::from_str(
            r#"{"movie_results":[{"id":603}],"tv_results":[{"id":1399}],"person_results":[]}"#,
        )
        .unwrap();
        assert_eq!(found.first_id().as_deref(), Some("603"));

        let tv_only: FindResponse = serde_json::from_str(r#"{"tv_results":[{"id":1399}]}"#).unwrap();
        assert_eq!(tv_only.first_id().as_deref(), Some("1399"));
        assert_eq!(FindResponse::default().first_id(), None);
    }

    #[test]
    fn test_jikan_title_chain() {
        let listed: JikanResponse = serde_json::from_str(
            r#"{"data":{"titles":[{"type":"Default","title":"Shingeki no Kyojin"},{"type":"English","title":"Attack on Titan"}],"title":"Shingeki no Kyojin"}}"#,
        )
        .unwrap();
        assert_eq!(
            listed.data.unwrap().english_title().as_deref(),
            Some("Attack on Titan")
        );

        let fallback: JikanResponse = serde_json::from_str(
            r#"{"data":{"titles":[],"title_english":null,"title":"Kimetsu no Yaiba"}}"#,
        )
        .unwrap();
        assert_eq!(
            fallback.data.unwrap().english_title().as_deref(),
            Some("Kimetsu no Yaiba")
        );
    }

    #[test]
    fn test_kitsu_mappings_mal_id() {
        let mappings: KitsuMappings = serde_json::from_str(
            r#"{"data":[
                {"attributes":{"externalSite":"anidb","externalId":"1"}},
                {"attributes":{"externalSite":"myanimelist/anime","externalId":"16498"}}
            ]}"#,
        )
        .unwrap();
        assert_eq!(mappings.mal_id().as_deref(), Some("16498"));
    }

    #[test]
    fn test_kitsu_anime_title() {
        let anime: KitsuAnime = serde_json::from_str(
            r#"{"data":{"attributes":{"titles":{"en":null,"en_jp":"Shingeki no Kyojin"},"canonicalTitle":"Attack on Titan"}}}"#,
        )
        .unwrap();
        assert_eq!(
            anime.data.attributes.english_title().as_deref(),
            Some("Attack on Titan")
        );
    }

    #[test]
    fn test_tmdb_details_title_or_name() {
        let movie: TmdbDetails = serde_json::from_str(r#"{"title":"Il Padrino"}"#).unwrap();
        assert_eq!(movie.display_title().as_deref(), Some("Il Padrino"));
        let show: TmdbDetails = serde_json::from_str(r#"{"name":"Il Trono di Spade"}"#).unwrap();
        assert_eq!(show.display_title().as_deref(), Some("Il Trono di Spade"));
    }

    #[tokio::test]
    async fn test_tmdb_id_passthrough_and_missing_key() {
        let client = MetadataClient::new(Client::new());
        assert_eq!(
            client
                .tmdb_id(&ContentId::Tmdb("1399".into()), None)
                .await
                .unwrap()
                .as_deref(),
            Some("1399")
        );
        assert!(matches!(
            client.tmdb_id(&ContentId::Imdb("tt0944947".into()), None).await,
            Err(MetadataError::MissingApiKey)
        ));
        assert_eq!(
            client
                .tmdb_id(&ContentId::Kitsu("1".into()), None)
                .await
                .unwrap(),
            None
        );
    }
}
