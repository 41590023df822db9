//! Decoding of the per-request config path segment
//!
//! Hosts send the user configuration as plain JSON, percent-encoded JSON or
//! base64 JSON. Strategies run in order and the first one that yields an
//! object wins; when none does the overlay is empty.

use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use serde::Deserialize;
use tracing::debug;

/// Boolean flag that may arrive as `true` or as a form value like `"on"`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ConfigFlag {
    Bool(bool),
    Text(String),
}

impl ConfigFlag {
    pub fn is_on(&self) -> bool {
        match self {
            ConfigFlag::Bool(value) => *value,
            ConfigFlag::Text(text) => matches!(
                text.trim().to_lowercase().as_str(),
                "on" | "true" | "1" | "yes"
            ),
        }
    }
}

/// User settings carried in the request path
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddonConfigOverlay {
    #[serde(default)]
    pub media_flow_proxy_url: Option<String>,
    #[serde(default)]
    pub media_flow_proxy_password: Option<String>,
    #[serde(default)]
    pub mfp_proxy_url: Option<String>,
    #[serde(default)]
    pub mfp_proxy_password: Option<String>,
    #[serde(default)]
    pub tv_proxy_url: Option<String>,
    #[serde(default)]
    pub tmdb_api_key: Option<String>,
    #[serde(default)]
    pub both_links: Option<ConfigFlag>,
    #[serde(default)]
    pub animeunity_enabled: Option<ConfigFlag>,
    #[serde(default)]
    pub animesaturn_enabled: Option<ConfigFlag>,
    #[serde(default, rename = "enableLiveTV")]
    pub enable_live_tv: Option<ConfigFlag>,
}

type Strategy = fn(&str) -> Option<AddonConfigOverlay>;

const STRATEGIES: &[(&str, Strategy)] = &[
    ("json", decode_json),
    ("percent-json", decode_percent_json),
    ("base64-json", decode_base64_json),
    ("base64-embedded-json", decode_base64_embedded_json),
];

/// Decode a config segment, first successful strategy wins
pub fn decode(raw: &str) -> AddonConfigOverlay {
    let raw = raw.trim();
    if raw.is_empty() {
        return AddonConfigOverlay::default();
    }

    for (name, strategy) in STRATEGIES {
        if let Some(overlay) = strategy(raw) {
            debug!(strategy = %name, "Decoded request config");
            return overlay;
        }
    }

    debug!("Request config not decodable, using defaults");
    AddonConfigOverlay::default()
}

fn decode_json(raw: &str) -> Option<AddonConfigOverlay> {
    if !raw.starts_with('{') {
        return None;
    }
    serde_json::from_str(raw).ok()
}

fn decode_percent_json(raw: &str) -> Option<AddonConfigOverlay> {
    if !raw.contains('%') {
        return None;
    }
    let decoded = urlencoding::decode(raw).ok()?;
    decode_json(decoded.trim())
}

fn base64_text(raw: &str) -> Option<String> {
    let cleaned = raw.replace("%3D", "=").replace("%3d", "=");
    let cleaned = cleaned.trim().trim_end_matches('=');
    let bytes = STANDARD_NO_PAD
        .decode(cleaned)
        .or_else(|_| URL_SAFE_NO_PAD.decode(cleaned))
        .ok()?;
    String::from_utf8(bytes).ok()
}

fn decode_base64_json(raw: &str) -> Option<AddonConfigOverlay> {
    let text = base64_text(raw)?;
    decode_json(text.trim())
}

fn decode_base64_embedded_json(raw: &str) -> Option<AddonConfigOverlay> {
    let text = base64_text(raw)?;
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}
