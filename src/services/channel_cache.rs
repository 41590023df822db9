//! Channel-link cache
//!
//! Maps channel display names to one or more playable URLs. The whole map is
//! rebuilt from the channel listing at most once at a time, held in memory
//! behind an `Arc` swap so readers never see a partial table, and persisted
//! to a JSON snapshot through a temp file + rename.
//!
//! Lifecycle: `Empty -> Loaded -> Refreshing -> Loaded`. A failed refresh
//! leaves the previous table in place.

use indexmap::IndexMap;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::error::ResolveError;
use crate::models::{CacheSnapshot, CacheState, CacheStats, OneOrMany, VariantLink};
use crate::services::listing::{ChannelListing, ListedChannel};
use crate::services::metrics;
use crate::services::normalizer::{channel_key, strip_variant_suffix};

/// Source of "now" in epoch millis
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Age after which the table is stale
    pub ttl: Duration,
    /// Bound on a single cold-cache resolution
    pub cold_lookup_timeout: Duration,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(12 * 60 * 60),
            cold_lookup_timeout: Duration::from_secs(5),
        }
    }
}

/// Result of a refresh request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed { channels: usize },
    AlreadyInProgress,
}

/// Immutable link table; replaced wholesale
#[derive(Debug, Default)]
struct LinkTable {
    timestamp: i64,
    links: IndexMap<String, OneOrMany>,
    /// channel_key(name) -> name, for case/whitespace-insensitive lookups
    by_key: HashMap<String, String>,
}

impl LinkTable {
    fn new(timestamp: i64, links: IndexMap<String, OneOrMany>) -> Self {
        let links = sanitize(links);
        let mut by_key = HashMap::with_capacity(links.len());
        for name in links.keys() {
            by_key.entry(channel_key(name)).or_insert_with(|| name.clone());
        }
        Self {
            timestamp,
            links,
            by_key,
        }
    }

    fn get(&self, name: &str) -> Option<&OneOrMany> {
        self.links.get(name).or_else(|| {
            self.by_key
                .get(&channel_key(name))
                .and_then(|key| self.links.get(key))
        })
    }

    fn is_cold(&self) -> bool {
        self.timestamp <= 0
    }
}

/// Trim keys and URLs, drop empty entries
fn sanitize(links: IndexMap<String, OneOrMany>) -> IndexMap<String, OneOrMany> {
    links
        .into_iter()
        .filter_map(|(name, value)| {
            let name = name.trim().to_string();
            if name.is_empty() {
                return None;
            }
            let value = match value {
                OneOrMany::One(url) => {
                    let url = url.trim().to_string();
                    (!url.is_empty()).then_some(OneOrMany::One(url))
                }
                OneOrMany::Many(urls) => {
                    let mut seen = HashSet::new();
                    let urls: Vec<String> = urls
                        .into_iter()
                        .map(|u| u.trim().to_string())
                        .filter(|u| !u.is_empty() && seen.insert(u.clone()))
                        .collect();
                    (!urls.is_empty()).then_some(OneOrMany::Many(urls))
                }
            }?;
            Some((name, value))
        })
        .collect()
}

/// Group a listing by name in first-seen order; repeated names accumulate
/// their URLs in order
fn collect_links(listed: Vec<ListedChannel>) -> IndexMap<String, OneOrMany> {
    let mut grouped: IndexMap<String, Vec<String>> = IndexMap::new();
    for channel in listed {
        let (Some(name), Some(url)) = (channel.name, channel.url) else {
            continue;
        };
        let (name, url) = (name.trim().to_string(), url.trim().to_string());
        if name.is_empty() || url.is_empty() {
            continue;
        }
        let urls = grouped.entry(name).or_default();
        if !urls.contains(&url) {
            urls.push(url);
        }
    }

    grouped
        .into_iter()
        .map(|(name, mut urls)| {
            let value = if urls.len() == 1 {
                OneOrMany::One(urls.remove(0))
            } else {
                OneOrMany::Many(urls)
            };
            (name, value)
        })
        .collect()
}

/// Links of the first candidate name present in the table
fn exact_links<'a>(
    table: &LinkTable,
    candidates: impl IntoIterator<Item = &'a str>,
) -> Option<Vec<VariantLink>> {
    candidates.into_iter().find_map(|candidate| {
        table.get(candidate).map(|value| {
            value
                .as_slice()
                .iter()
                .map(|url| VariantLink {
                    key: candidate.to_string(),
                    url: url.clone(),
                })
                .collect()
        })
    })
}

/// Resets the single-flight flag when the refresh ends, however it ends
struct RefreshGuard<'a>(&'a AtomicBool);

impl<'a> RefreshGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Process-wide channel-link cache; clones share state
#[derive(Clone)]
pub struct ChannelCache {
    path: PathBuf,
    options: CacheOptions,
    table: Arc<RwLock<Arc<LinkTable>>>,
    updating: Arc<AtomicBool>,
    listing: Arc<dyn ChannelListing>,
    clock: Arc<dyn Clock>,
}

impl ChannelCache {
    pub fn new(
        path: impl Into<PathBuf>,
        listing: Arc<dyn ChannelListing>,
        clock: Arc<dyn Clock>,
        options: CacheOptions,
    ) -> Self {
        Self {
            path: path.into(),
            options,
            table: Arc::new(RwLock::new(Arc::new(LinkTable::default()))),
            updating: Arc::new(AtomicBool::new(false)),
            listing,
            clock,
        }
    }

    /// Read the persisted snapshot. Missing or unreadable files leave the
    /// cache empty. Returns the number of channels loaded.
    pub async fn load(&self) -> usize {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No channel cache snapshot at {}", self.path.display());
                return 0;
            }
            Err(e) => {
                warn!("Failed to read channel cache {}: {}", self.path.display(), e);
                return 0;
            }
        };

        match serde_json::from_str::<CacheSnapshot>(&content) {
            Ok(snapshot) => {
                let count = self.install(snapshot).await;
                info!("Loaded {} cached channels", count);
                count
            }
            Err(e) => {
                warn!(
                    "Failed to parse channel cache {}: {}",
                    self.path.display(),
                    e
                );
                0
            }
        }
    }

    /// Replace the in-memory table
    pub async fn install(&self, snapshot: CacheSnapshot) -> usize {
        let table = LinkTable::new(snapshot.timestamp, snapshot.links);
        let count = table.links.len();
        *self.table.write().await = Arc::new(table);
        count
    }

    async fn current(&self) -> Arc<LinkTable> {
        self.table.read().await.clone()
    }

    /// Exact lookup, falling back to a case/whitespace-insensitive match
    pub async fn get(&self, name: &str) -> Option<OneOrMany> {
        self.current().await.get(name).cloned()
    }

    pub async fn is_stale(&self) -> bool {
        let table = self.current().await;
        self.table_is_stale(&table)
    }

    fn table_is_stale(&self, table: &LinkTable) -> bool {
        if table.is_cold() || table.links.is_empty() {
            return true;
        }
        let age_ms = self.clock.now_ms() - table.timestamp;
        age_ms > self.options.ttl.as_millis() as i64
    }

    pub async fn state(&self) -> CacheState {
        if self.updating.load(Ordering::Acquire) {
            return CacheState::Refreshing;
        }
        let table = self.current().await;
        if table.is_cold() && table.links.is_empty() {
            CacheState::Empty
        } else {
            CacheState::Loaded
        }
    }

    pub async fn stats(&self) -> CacheStats {
        let state = self.state().await;
        let table = self.current().await;
        let age_secs = (!table.is_cold()).then(|| (self.clock.now_ms() - table.timestamp) / 1000);
        CacheStats {
            state,
            channels: table.links.len(),
            timestamp: table.timestamp,
            age_secs,
            stale: self.table_is_stale(&table),
        }
    }

    /// Rebuild the table from the full listing. At most one refresh runs at
    /// a time; a concurrent call returns `AlreadyInProgress` immediately.
    pub async fn refresh(&self) -> Result<RefreshOutcome, ResolveError> {
        let Some(_guard) = RefreshGuard::acquire(&self.updating) else {
            debug!("Channel cache refresh already in progress");
            metrics::CACHE_REFRESHES
                .with_label_values(&["in_progress"])
                .inc();
            return Ok(RefreshOutcome::AlreadyInProgress);
        };

        info!("Refreshing channel-link cache");
        let listed = match self.listing.fetch_all().await {
            Ok(listed) => listed,
            Err(e) => {
                metrics::CACHE_REFRESHES.with_label_values(&["failed"]).inc();
                return Err(match e {
                    ResolveError::CacheRefreshFailed(_) => e,
                    other => ResolveError::CacheRefreshFailed(other.to_string()),
                });
            }
        };

        let links = collect_links(listed);
        if links.is_empty() {
            metrics::CACHE_REFRESHES.with_label_values(&["failed"]).inc();
            return Err(ResolveError::CacheRefreshFailed(
                "listing returned no usable channels".to_string(),
            ));
        }

        let snapshot = CacheSnapshot {
            timestamp: self.clock.now_ms(),
            links,
        };
        let body = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| ResolveError::PersistenceFailed(e.to_string()));
        let channels = self.install(snapshot).await;

        // In-memory table stays authoritative when the write fails
        match body {
            Ok(body) => {
                if let Err(e) = self.persist(&body).await {
                    error!("{}", e);
                }
            }
            Err(e) => error!("{}", e),
        }

        metrics::CACHE_REFRESHES.with_label_values(&["ok"]).inc();
        info!(channels, "Channel-link cache refreshed");
        Ok(RefreshOutcome::Refreshed { channels })
    }

    /// Start a refresh in the background unless one is running
    pub fn spawn_refresh(&self) -> bool {
        if self.updating.load(Ordering::Acquire) {
            return false;
        }
        let cache = self.clone();
        tokio::spawn(async move {
            if let Err(e) = cache.refresh().await {
                warn!("Background channel cache refresh failed: {}", e);
            }
        });
        true
    }

    fn tmp_path(&self) -> PathBuf {
        let mut tmp = self.path.as_os_str().to_owned();
        tmp.push(".tmp");
        PathBuf::from(tmp)
    }

    async fn persist(&self, body: &str) -> Result<(), ResolveError> {
        let tmp_path = self.tmp_path();

        let result: std::io::Result<()> = async {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).await?;
            }
            let mut file = File::create(&tmp_path).await?;
            file.write_all(body.as_bytes()).await?;
            file.sync_all().await?;
            drop(file);

            // Atomic replace so readers never see a partial snapshot
            fs::rename(&tmp_path, &self.path).await
        }
        .await;

        if let Err(e) = result {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(ResolveError::PersistenceFailed(format!(
                "{}: {}",
                self.path.display(),
                e
            )));
        }
        Ok(())
    }

    /// Every URL whose key is `<alias> .<letter>`, for each alias in order,
    /// in both the original and the upper-cased, whitespace-collapsed form.
    /// Deduplicated by URL, first occurrence wins.
    pub async fn find_variants(&self, aliases: &[String]) -> Vec<VariantLink> {
        let table = self.current().await;
        let mut seen = HashSet::new();
        let mut found = Vec::new();

        for alias in aliases {
            let alias = alias.trim();
            if alias.is_empty() {
                continue;
            }

            let normalized = channel_key(alias);
            let mut forms = vec![(alias.to_string(), false)];
            if normalized != alias {
                forms.push((normalized, true));
            }

            for (form, normalize_keys) in forms {
                let Ok(pattern) = Regex::new(&format!(r"(?i)^{} \.([a-z])$", regex::escape(&form)))
                else {
                    continue;
                };

                for (key, value) in &table.links {
                    let matched = if normalize_keys {
                        pattern.is_match(&channel_key(key))
                    } else {
                        pattern.is_match(key)
                    };
                    if !matched {
                        continue;
                    }
                    for url in value.as_slice() {
                        if seen.insert(url.clone()) {
                            found.push(VariantLink {
                                key: key.clone(),
                                url: url.clone(),
                            });
                        }
                    }
                }
            }
        }

        found
    }

    /// Links for one channel: variants first, then an exact-name match,
    /// then (cold cache only) a bounded single-name resolution.
    pub async fn resolve_channel(&self, name: &str, aliases: &[String]) -> Vec<VariantLink> {
        let table = self.current().await;
        let kicked = self.table_is_stale(&table) && self.spawn_refresh();

        let variants = self.find_variants(aliases).await;
        if !variants.is_empty() {
            return variants;
        }

        let table = self.current().await;
        let names: Vec<&str> = std::iter::once(name)
            .chain(aliases.iter().map(String::as_str))
            .collect();
        if let Some(found) = exact_links(&table, names.iter().copied()) {
            return found;
        }

        // "Rai 1 (2)" falls back to "Rai 1"
        let bases: Vec<String> = names
            .iter()
            .map(|n| strip_variant_suffix(n))
            .filter(|base| !base.is_empty() && !names.contains(&base.as_str()))
            .collect();
        if let Some(found) = exact_links(&table, bases.iter().map(String::as_str)) {
            return found;
        }

        if !table.is_cold() {
            debug!(channel = %name, "Channel not in link cache");
            if !kicked {
                self.spawn_refresh();
            }
            return Vec::new();
        }

        self.cold_lookup(name)
            .await
            .map(|url| {
                vec![VariantLink {
                    key: name.to_string(),
                    url,
                }]
            })
            .unwrap_or_default()
    }

    /// Resolve one name directly; success is kept in memory only
    async fn cold_lookup(&self, name: &str) -> Option<String> {
        let lookup = self.listing.resolve_one(name);
        match tokio::time::timeout(self.options.cold_lookup_timeout, lookup).await {
            Ok(Ok(Some(url))) if !url.trim().is_empty() => {
                let url = url.trim().to_string();
                self.memoize(name, &url).await;
                debug!(channel = %name, "Cold lookup resolved");
                Some(url)
            }
            Ok(Ok(_)) => {
                debug!(channel = %name, "Cold lookup found nothing");
                None
            }
            Ok(Err(e)) => {
                warn!(channel = %name, "Cold lookup failed: {}", e);
                None
            }
            Err(_) => {
                warn!(
                    channel = %name,
                    "Cold lookup timed out after {:?}",
                    self.options.cold_lookup_timeout
                );
                None
            }
        }
    }

    async fn memoize(&self, name: &str, url: &str) {
        let mut guard = self.table.write().await;
        let mut links = guard.links.clone();
        links.insert(name.trim().to_string(), OneOrMany::One(url.to_string()));
        *guard = Arc::new(LinkTable::new(guard.timestamp, links));
    }
}
