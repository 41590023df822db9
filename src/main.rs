mod config;
mod error;
mod models;
mod routes;
mod services;

use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{load_domain, AddonSettings, Config};
use crate::services::{
    aggregator::Aggregator,
    catalog::ChannelCatalog,
    channel_cache::{CacheOptions, ChannelCache, SystemClock},
    http::HttpFetcher,
    listing::ScriptChannelListing,
    metadata::{MetadataClient, MetadataLookup},
    refresh::{start_refresh_task, RefreshConfig},
    resolvers::{
        media::DEFAULT_HOST, AnimeSaturnSource, AnimeUnitySource, EpisodicResolver, LiveResolver,
        MediaResolver, StreamResolver,
    },
    script::ScriptRunner,
};

/// Application state shared across handlers
pub struct AppState {
    pub config: Config,
    /// Environment settings; requests may overlay their own
    pub settings: AddonSettings,
    pub cache: ChannelCache,
    pub catalog: Arc<ChannelCatalog>,
    pub aggregator: Aggregator,
    pub start_time: Instant,
}

/// Direct-extraction host: env override, then the domains file, then the default
async fn media_host(config: &Config) -> String {
    if let Some(host) = &config.vixsrc_host {
        return host.clone();
    }
    match load_domain(&config.domains_file, "vixsrc").await {
        Ok(Some(host)) => host,
        Ok(None) => {
            tracing::warn!("No vixsrc entry in {}, using {}", config.domains_file, DEFAULT_HOST);
            DEFAULT_HOST.to_string()
        }
        Err(e) => {
            tracing::warn!("{:#}, using {}", e, DEFAULT_HOST);
            DEFAULT_HOST.to_string()
        }
    }
}

fn build_aggregator(
    config: &Config,
    http: reqwest::Client,
    media_host: &str,
    catalog: Arc<ChannelCatalog>,
    cache: ChannelCache,
) -> Aggregator {
    let metadata: Arc<dyn MetadataLookup> = Arc::new(MetadataClient::new(http.clone()));
    let script_timeout = Duration::from_millis(config.script_timeout_ms);

    let live = Arc::new(LiveResolver::new(catalog, cache));
    let media = Arc::new(MediaResolver::new(
        media_host,
        Arc::new(HttpFetcher::new(http.clone(), "vixsrc")),
        Arc::new(HttpFetcher::new(http, "mediaflow")),
        metadata.clone(),
    ));
    let anime: Vec<Arc<dyn StreamResolver>> = vec![
        Arc::new(EpisodicResolver::new(
            AnimeUnitySource::new(ScriptRunner::new(
                &config.python_bin,
                &config.anime_unity_script,
                script_timeout,
            )),
            metadata.clone(),
        )),
        Arc::new(EpisodicResolver::new(
            AnimeSaturnSource::new(ScriptRunner::new(
                &config.python_bin,
                &config.anime_saturn_script,
                script_timeout,
            )),
            metadata,
        )),
    ];

    Aggregator::new(live, anime, media)
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health endpoints
        .route("/", get(routes::health::root))
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::health::metrics))
        .route("/ready", get(routes::health::ready))
        .route("/live", get(routes::health::live))
        // Stream resolution
        .route("/stream/:type/:id", get(routes::stream::streams))
        .route(
            "/:config/stream/:type/:id",
            get(routes::stream::configured_streams),
        )
        // Admin endpoints (protected by ADMIN_KEY)
        .route("/api/admin/cache", get(routes::admin::cache_stats))
        .route(
            "/api/admin/cache/refresh",
            post(routes::admin::refresh_cache),
        )
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing/logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "streamvix_server=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    // Load configuration
    let config = Config::from_env();
    let settings = config.settings();
    let port = config.port;

    tracing::info!("Starting StreamViX Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        media_flow = settings.media_flow().is_some(),
        tv_proxy = settings.tv_proxy().is_some(),
        both_links = settings.both_links,
        anime_unity = settings.anime_unity_enabled,
        anime_saturn = settings.anime_saturn_enabled,
        live_tv = settings.live_tv_enabled,
        "Resolution settings"
    );

    // Shared upstream HTTP client
    let http = reqwest::Client::builder()
        .timeout(Duration::from_millis(config.fetch_timeout_ms))
        .user_agent(&config.user_agent)
        .gzip(true)
        .build()?;

    // Static channel catalog (a missing file only disables static tiers)
    let catalog = match ChannelCatalog::load(&config.channels_file).await {
        Ok(catalog) => catalog,
        Err(e) => {
            tracing::warn!("{:#}; live channels disabled", e);
            ChannelCatalog::empty()
        }
    };
    tracing::info!("Channel catalog loaded: {} channels", catalog.len());
    let catalog = Arc::new(catalog);

    // Channel-link cache, warmed from the last snapshot
    let listing = ScriptChannelListing::new(
        ScriptRunner::new(
            &config.python_bin,
            &config.channel_script,
            Duration::from_millis(config.script_timeout_ms),
        ),
        Duration::from_millis(config.listing_timeout_ms),
    );
    let cache = ChannelCache::new(
        &config.cache_file,
        Arc::new(listing),
        Arc::new(SystemClock),
        CacheOptions {
            ttl: Duration::from_secs(config.cache_ttl_hours * 60 * 60),
            cold_lookup_timeout: Duration::from_millis(config.cold_lookup_timeout_ms),
        },
    );
    cache.load().await;

    let media_host = media_host(&config).await;
    tracing::info!("Direct extraction host: {}", media_host);

    let aggregator = build_aggregator(&config, http, &media_host, catalog.clone(), cache.clone());

    // Start refresh task (runs in background)
    tokio::spawn(start_refresh_task(
        cache.clone(),
        RefreshConfig {
            startup_delay: Duration::from_millis(config.cache_startup_delay_ms),
            interval: Duration::from_secs(config.cache_refresh_interval_hours * 60 * 60),
        },
    ));

    // Build application state
    let state = Arc::new(AppState {
        config,
        settings,
        cache,
        catalog,
        aggregator,
        start_time: Instant::now(),
    });

    let app = build_router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::ChannelDescriptor;
    use crate::services::channel_cache::tests::{FakeListing, FixedClock};
    use crate::services::resolvers::media::tests::{FakeFetcher, FakeMetadata};

    pub(crate) const TEST_ADMIN_KEY: &str = "test-admin";

    /// State with one catalog channel, an empty link cache whose listing
    /// returns nothing, and canned upstream pages
    pub(crate) async fn test_state() -> Arc<AppState> {
        let mut config = Config::from_env();
        config.admin_key = Some(TEST_ADMIN_KEY.to_string());
        let settings = AddonSettings {
            live_tv_enabled: true,
            ..Default::default()
        };

        let catalog = Arc::new(ChannelCatalog::new(vec![ChannelDescriptor {
            id: "rai1".into(),
            name: "Rai 1".into(),
            static_url: Some("https://hd.example/rai1.mpd".into()),
            static_url_f: Some("https://direct.example/rai1.m3u8".into()),
            vavoo_names: vec!["RAI 1".into()],
            ..Default::default()
        }]));
        let cache = ChannelCache::new(
            std::env::temp_dir().join("streamvix-route-tests").join("cache.json"),
            Arc::new(FakeListing::with_channels(Vec::new())),
            FixedClock::at(1_700_000_000_000),
            CacheOptions::default(),
        );

        let media = Arc::new(MediaResolver::new(
            DEFAULT_HOST,
            FakeFetcher::new(&[]),
            FakeFetcher::new(&[]),
            FakeMetadata::tmdb("603"),
        ));
        let aggregator = Aggregator::new(
            Arc::new(LiveResolver::new(catalog.clone(), cache.clone())),
            Vec::new(),
            media,
        );

        Arc::new(AppState {
            config,
            settings,
            cache,
            catalog,
            aggregator,
            start_time: Instant::now(),
        })
    }
}
