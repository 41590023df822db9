//! Proxy URL builders
//!
//! Two kinds of proxy sit in front of upstream media: the MediaFlow proxy
//! (password protected; MPD manifests, generic streams and the extractor
//! endpoint) and the TV proxy (m3u playlists, no credentials).

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use url::Url;

const DEFAULT_FILENAME: &str = "video.mp4";

/// MediaFlow proxy endpoint with credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFlowProxy {
    base: String,
    password: String,
}

impl MediaFlowProxy {
    /// `None` unless both URL and password are non-empty
    pub fn new(base: &str, password: &str) -> Option<Self> {
        let base = base.trim().trim_end_matches('/');
        let password = password.trim();
        if base.is_empty() || password.is_empty() {
            return None;
        }
        Some(Self {
            base: base.to_string(),
            password: password.to_string(),
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// HLS view over an MPD manifest
    pub fn mpd_manifest_url(&self, destination: &str) -> String {
        format!(
            "{}/proxy/mpd/manifest.m3u8?api_password={}&d={}",
            self.base,
            urlencoding::encode(&self.password),
            urlencoding::encode(destination)
        )
    }

    /// Generic stream proxy; a `filename` query parameter on the
    /// destination becomes the path file name
    pub fn stream_url(&self, destination: &str) -> String {
        let (clean, filename) = split_filename(destination);
        format!(
            "{}/proxy/stream/{}?d={}&api_password={}",
            self.base,
            urlencoding::encode(&filename),
            urlencoding::encode(&clean),
            urlencoding::encode(&self.password)
        )
    }

    /// Extractor endpoint for a page URL on `host`
    pub fn extractor_url(&self, host: &str, destination: &str, redirect_stream: bool) -> String {
        format!(
            "{}/extractor/video?host={}&redirect_stream={}&api_password={}&d={}",
            self.base,
            urlencoding::encode(host),
            redirect_stream,
            urlencoding::encode(&self.password),
            urlencoding::encode(destination)
        )
    }
}

/// TV proxy endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TvProxy {
    base: String,
}

impl TvProxy {
    pub fn new(base: &str) -> Option<Self> {
        let base = base.trim().trim_end_matches('/');
        if base.is_empty() {
            return None;
        }
        Some(Self {
            base: base.to_string(),
        })
    }

    pub fn m3u_url(&self, destination: &str) -> String {
        format!(
            "{}/proxy/m3u?url={}",
            self.base,
            urlencoding::encode(destination)
        )
    }
}

/// Body returned by the extractor endpoint with `redirect_stream=false`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtractorResponse {
    #[serde(default)]
    pub mediaflow_proxy_url: Option<String>,
    #[serde(default)]
    pub query_params: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    pub destination_url: Option<String>,
    #[serde(default)]
    pub request_headers: Option<BTreeMap<String, Value>>,
}

impl ExtractorResponse {
    /// Fold the response into one playable URL:
    /// `mediaflow_proxy_url` + query params + `d=` + `h_{header}=` params
    pub fn into_stream_url(self) -> Option<String> {
        let mut url = self.mediaflow_proxy_url.filter(|u| !u.is_empty())?;

        for (key, value) in self.query_params.unwrap_or_default() {
            if let Some(value) = value_text(&value) {
                append_param(&mut url, &key, &value);
            }
        }

        if let Some(destination) = self.destination_url.filter(|d| !d.is_empty()) {
            append_param(&mut url, "d", &destination);
        }

        for (key, value) in self.request_headers.unwrap_or_default() {
            if let Some(value) = value_text(&value) {
                append_param(&mut url, &format!("h_{}", key), &value);
            }
        }

        Some(url)
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn append_param(url: &mut String, key: &str, value: &str) {
    url.push(if url.contains('?') { '&' } else { '?' });
    url.push_str(&urlencoding::encode(key));
    url.push('=');
    url.push_str(&urlencoding::encode(value));
}

/// Split a `filename` query parameter out of a URL
fn split_filename(destination: &str) -> (String, String) {
    let Ok(mut parsed) = Url::parse(destination) else {
        return (destination.to_string(), DEFAULT_FILENAME.to_string());
    };

    let mut filename = None;
    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter_map(|(k, v)| {
            if k == "filename" {
                filename = Some(v.into_owned());
                None
            } else {
                Some((k.into_owned(), v.into_owned()))
            }
        })
        .collect();

    let filename = match filename.filter(|f| !f.is_empty()) {
        Some(name) => {
            if kept.is_empty() {
                parsed.set_query(None);
            } else {
                parsed.query_pairs_mut().clear().extend_pairs(kept);
            }
            name
        }
        None => parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| DEFAULT_FILENAME.to_string()),
    };

    (parsed.to_string(), filename)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn proxy() -> MediaFlowProxy {
        MediaFlowProxy::new("https://mfp.example/", "s3cret").unwrap()
    }

    #[test]
    fn test_new_rejects_missing_parts() {
        assert!(MediaFlowProxy::new("", "pw").is_none());
        assert!(MediaFlowProxy::new("https://mfp", " ").is_none());
        assert!(TvProxy::new("  ").is_none());
    }

    #[test]
    fn test_mpd_manifest_url() {
        assert_eq!(
            proxy().mpd_manifest_url("https://cdn/a.mpd?x=1"),
            "https://mfp.example/proxy/mpd/manifest.m3u8?api_password=s3cret&d=https%3A%2F%2Fcdn%2Fa.mpd%3Fx%3D1"
        );
    }

    #[test]
    fn test_tv_proxy_url() {
        let tv = TvProxy::new("https://tv.example/").unwrap();
        assert_eq!(
            tv.m3u_url("https://vavoo/play/1"),
            "https://tv.example/proxy/m3u?url=https%3A%2F%2Fvavoo%2Fplay%2F1"
        );
    }

    #[test]
    fn test_stream_url_uses_filename_param() {
        let url = proxy().stream_url("https://cdn.example/dl?token=t&filename=Ep01.mp4");
        assert_eq!(
            url,
            "https://mfp.example/proxy/stream/Ep01.mp4?d=https%3A%2F%2Fcdn.example%2Fdl%3Ftoken%3Dt&api_password=s3cret"
        );
    }

    #[test]
    fn test_stream_url_falls_back_to_path_segment() {
        let url = proxy().stream_url("https://cdn.example/files/show.mp4");
        assert!(url.starts_with("https://mfp.example/proxy/stream/show.mp4?d="));
    }

    #[test]
    fn test_extractor_url() {
        let url = proxy().extractor_url("VixCloud", "https://vixsrc.to/movie/1/", false);
        assert_eq!(
            url,
            "https://mfp.example/extractor/video?host=VixCloud&redirect_stream=false&api_password=s3cret&d=https%3A%2F%2Fvixsrc.to%2Fmovie%2F1%2F"
        );
    }

    #[test]
    fn test_extractor_response_folding() {
        let response: ExtractorResponse = serde_json::from_value(json!({
            "mediaflow_proxy_url": "https://mfp.example/proxy/hls/manifest.m3u8",
            "query_params": { "api_password": "s3cret", "skip": null },
            "destination_url": "https://cdn/playlist/1?token=a",
            "request_headers": { "referer": "https://vixsrc.to/" }
        }))
        .unwrap();

        assert_eq!(
            response.into_stream_url().unwrap(),
            "https://mfp.example/proxy/hls/manifest.m3u8?api_password=s3cret\
             &d=https%3A%2F%2Fcdn%2Fplaylist%2F1%3Ftoken%3Da\
             &h_referer=https%3A%2F%2Fvixsrc.to%2F"
        );
    }

    #[test]
    fn test_extractor_response_without_proxy_url() {
        assert!(ExtractorResponse::default().into_stream_url().is_none());
    }
}
