use anyhow::Context;
use std::env;
use std::path::Path;

use crate::services::addon_config::AddonConfigOverlay;
use crate::services::proxy::{MediaFlowProxy, TvProxy};

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub port: u16,
    pub admin_key: Option<String>,

    // Proxies
    pub mfp_url: Option<String>,
    pub mfp_password: Option<String>,
    pub mpd_proxy_url: Option<String>,
    pub mpd_proxy_password: Option<String>,
    pub tv_proxy_url: Option<String>,

    // Metadata
    pub tmdb_api_key: Option<String>,

    // Resolution policy
    pub both_links: bool,
    pub anime_unity_enabled: bool,
    pub anime_saturn_enabled: bool,
    pub live_tv_enabled: bool,

    // Data files
    pub channels_file: String,
    pub domains_file: String,
    pub vixsrc_host: Option<String>,

    // Channel-link cache
    pub cache_file: String,
    pub cache_ttl_hours: u64,
    pub cache_refresh_interval_hours: u64,
    pub cache_startup_delay_ms: u64,
    pub cold_lookup_timeout_ms: u64,
    pub listing_timeout_ms: u64,

    // Subprocess collaborators
    pub python_bin: String,
    pub channel_script: String,
    pub anime_unity_script: String,
    pub anime_saturn_script: String,
    pub script_timeout_ms: u64,

    // Upstream HTTP
    pub fetch_timeout_ms: u64,
    pub user_agent: String,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let mfp_url = env_opt("MFP_URL");
        let mfp_password = env_opt("MFP_PSW");

        Self {
            // Server
            port: env::var("PORT")
                .unwrap_or_else(|_| "7860".to_string())
                .parse()
                .unwrap_or(7860),
            admin_key: env_opt("ADMIN_KEY"),

            // Proxies (the MPD proxy for live channels defaults to the media proxy)
            mpd_proxy_url: env_opt("MFP_PROXY_URL").or_else(|| mfp_url.clone()),
            mpd_proxy_password: env_opt("MFP_PROXY_PASSWORD").or_else(|| mfp_password.clone()),
            mfp_url,
            mfp_password,
            tv_proxy_url: env_opt("TV_PROXY_URL"),

            // Metadata
            tmdb_api_key: env_opt("TMDB_API_KEY"),

            // Resolution policy
            both_links: env_flag("BOTHLINK", false),
            anime_unity_enabled: env_flag("ANIMEUNITY_ENABLED", false),
            anime_saturn_enabled: env_flag("ANIMESATURN_ENABLED", false),
            live_tv_enabled: env_flag("ENABLE_LIVE_TV", true),

            // Data files
            channels_file: env::var("CHANNELS_FILE")
                .unwrap_or_else(|_| "config/tv_channels.json".to_string()),
            domains_file: env::var("DOMAINS_FILE")
                .unwrap_or_else(|_| "config/domains.json".to_string()),
            vixsrc_host: env_opt("VIXSRC_HOST"),

            // Channel-link cache
            cache_file: env::var("CACHE_FILE")
                .unwrap_or_else(|_| "cache/vavoo_cache.json".to_string()),
            cache_ttl_hours: env::var("CACHE_TTL_HOURS")
                .unwrap_or_else(|_| "12".to_string())
                .parse()
                .unwrap_or(12),
            // A zero period would stop the refresh task
            cache_refresh_interval_hours: env::var("CACHE_REFRESH_INTERVAL_HOURS")
                .unwrap_or_else(|_| "12".to_string())
                .parse()
                .unwrap_or(12)
                .max(1),
            cache_startup_delay_ms: env::var("CACHE_STARTUP_DELAY_MS")
                .unwrap_or_else(|_| "2000".to_string())
                .parse()
                .unwrap_or(2_000),
            cold_lookup_timeout_ms: env::var("COLD_LOOKUP_TIMEOUT_MS")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .unwrap_or(5_000),
            listing_timeout_ms: env::var("LISTING_TIMEOUT_MS")
                .unwrap_or_else(|_| "30000".to_string())
                .parse()
                .unwrap_or(30_000),

            // Subprocess collaborators
            python_bin: env::var("PYTHON_BIN").unwrap_or_else(|_| "python3".to_string()),
            channel_script: env::var("CHANNEL_SCRIPT")
                .unwrap_or_else(|_| "vavoo_resolver.py".to_string()),
            anime_unity_script: env::var("ANIMEUNITY_SCRIPT")
                .unwrap_or_else(|_| "src/providers/animeunity_scraper.py".to_string()),
            anime_saturn_script: env::var("ANIMESATURN_SCRIPT")
                .unwrap_or_else(|_| "src/providers/animesaturn.py".to_string()),
            script_timeout_ms: env::var("SCRIPT_TIMEOUT_MS")
                .unwrap_or_else(|_| "60000".to_string())
                .parse()
                .unwrap_or(60_000),

            // Upstream HTTP
            fetch_timeout_ms: env::var("FETCH_TIMEOUT_MS")
                .unwrap_or_else(|_| "15000".to_string())
                .parse()
                .unwrap_or(15_000),
            user_agent: env::var("USER_AGENT").unwrap_or_else(|_| {
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
            }),
        }
    }

    /// Resolution settings before any per-request overlay
    pub fn settings(&self) -> AddonSettings {
        AddonSettings {
            mfp_url: self.mfp_url.clone(),
            mfp_password: self.mfp_password.clone(),
            mpd_proxy_url: self.mpd_proxy_url.clone(),
            mpd_proxy_password: self.mpd_proxy_password.clone(),
            tv_proxy_url: self.tv_proxy_url.clone(),
            tmdb_api_key: self.tmdb_api_key.clone(),
            both_links: self.both_links,
            anime_unity_enabled: self.anime_unity_enabled,
            anime_saturn_enabled: self.anime_saturn_enabled,
            live_tv_enabled: self.live_tv_enabled,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Settings that drive a single resolution
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AddonSettings {
    pub mfp_url: Option<String>,
    pub mfp_password: Option<String>,
    pub mpd_proxy_url: Option<String>,
    pub mpd_proxy_password: Option<String>,
    pub tv_proxy_url: Option<String>,
    pub tmdb_api_key: Option<String>,
    pub both_links: bool,
    pub anime_unity_enabled: bool,
    pub anime_saturn_enabled: bool,
    pub live_tv_enabled: bool,
}

impl AddonSettings {
    /// Media proxy, when both URL and password are set
    pub fn media_flow(&self) -> Option<MediaFlowProxy> {
        MediaFlowProxy::new(self.mfp_url.as_deref()?, self.mfp_password.as_deref()?)
    }

    /// MPD proxy used for live static tiers
    pub fn mpd_proxy(&self) -> Option<MediaFlowProxy> {
        MediaFlowProxy::new(
            self.mpd_proxy_url.as_deref()?,
            self.mpd_proxy_password.as_deref()?,
        )
    }

    pub fn tv_proxy(&self) -> Option<TvProxy> {
        TvProxy::new(self.tv_proxy_url.as_deref()?)
    }

    pub fn tmdb_key(&self) -> Option<&str> {
        self.tmdb_api_key.as_deref().filter(|k| !k.is_empty())
    }

    /// Apply a decoded request config on top of these settings
    pub fn overlay(&self, overlay: &AddonConfigOverlay) -> Self {
        let mut out = self.clone();

        if let Some(url) = non_empty(&overlay.media_flow_proxy_url) {
            out.mfp_url = Some(url.clone());
            if overlay.mfp_proxy_url.is_none() {
                out.mpd_proxy_url = Some(url);
            }
        }
        if let Some(password) = non_empty(&overlay.media_flow_proxy_password) {
            out.mfp_password = Some(password.clone());
            if overlay.mfp_proxy_password.is_none() {
                out.mpd_proxy_password = Some(password);
            }
        }
        if let Some(url) = non_empty(&overlay.mfp_proxy_url) {
            out.mpd_proxy_url = Some(url);
        }
        if let Some(password) = non_empty(&overlay.mfp_proxy_password) {
            out.mpd_proxy_password = Some(password);
        }
        if let Some(url) = non_empty(&overlay.tv_proxy_url) {
            out.tv_proxy_url = Some(url);
        }
        if let Some(key) = non_empty(&overlay.tmdb_api_key) {
            out.tmdb_api_key = Some(key);
        }
        if let Some(flag) = &overlay.both_links {
            out.both_links = flag.is_on();
        }
        if let Some(flag) = &overlay.animeunity_enabled {
            out.anime_unity_enabled = flag.is_on();
        }
        if let Some(flag) = &overlay.animesaturn_enabled {
            out.anime_saturn_enabled = flag.is_on();
        }
        if let Some(flag) = &overlay.enable_live_tv {
            out.live_tv_enabled = flag.is_on();
        }

        out
    }
}

/// Host for `key` in the domains file (`{"vixsrc": "vixsrc.to", ...}`)
pub async fn load_domain(path: impl AsRef<Path>, key: &str) -> anyhow::Result<Option<String>> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read domains file {}", path.display()))?;
    let domains: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse domains file {}", path.display()))?;

    Ok(domains
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string))
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_flag(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "on" | "yes"))
        .unwrap_or(default)
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::addon_config::ConfigFlag;

    #[test]
    fn test_overlay_replaces_set_fields_only() {
        let base = AddonSettings {
            mfp_url: Some("https://env-mfp".into()),
            mfp_password: Some("env".into()),
            tmdb_api_key: Some("env-key".into()),
            live_tv_enabled: true,
            ..Default::default()
        };
        let overlay = AddonConfigOverlay {
            media_flow_proxy_url: Some("https://user-mfp/".into()),
            both_links: Some(ConfigFlag::Text("on".into())),
            tmdb_api_key: Some("  ".into()),
            ..Default::default()
        };

        let merged = base.overlay(&overlay);
        assert_eq!(merged.mfp_url.as_deref(), Some("https://user-mfp/"));
        assert_eq!(merged.mpd_proxy_url.as_deref(), Some("https://user-mfp/"));
        assert_eq!(merged.mfp_password.as_deref(), Some("env"));
        assert_eq!(merged.tmdb_key(), Some("env-key"));
        assert!(merged.both_links);
        assert!(merged.live_tv_enabled);
    }

    #[tokio::test]
    async fn test_load_domain() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("domains.json");
        std::fs::write(&path, r#"{"vixsrc": " vixsrc.to ", "empty": ""}"#).unwrap();

        assert_eq!(
            load_domain(&path, "vixsrc").await.unwrap().as_deref(),
            Some("vixsrc.to")
        );
        assert_eq!(load_domain(&path, "empty").await.unwrap(), None);
        assert!(load_domain(dir.path().join("missing.json"), "vixsrc")
            .await
            .is_err());
    }

    #[test]
    fn test_refresh_interval_is_at_least_one_hour() {
        env::set_var("CACHE_REFRESH_INTERVAL_HOURS", "0");
        let config = Config::from_env();
        env::remove_var("CACHE_REFRESH_INTERVAL_HOURS");
        assert_eq!(config.cache_refresh_interval_hours, 1);
    }

    #[test]
    fn test_media_flow_requires_password() {
        let settings = AddonSettings {
            mfp_url: Some("https://mfp".into()),
            ..Default::default()
        };
        assert!(settings.media_flow().is_none());
        assert!(settings.tv_proxy().is_none());
    }
}
