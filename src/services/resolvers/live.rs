//! Live-channel resolver
//!
//! Static tiers from the channel file first (`F`, HD, FHD, `D`), then one
//! numbered candidate per link found in the channel-link cache.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::{ResolveContext, StreamResolver};
use crate::models::{ChannelDescriptor, ResolutionRequest, StreamCandidate};
use crate::services::catalog::ChannelCatalog;
use crate::services::channel_cache::ChannelCache;
use crate::services::proxy::{MediaFlowProxy, TvProxy};

pub const SOURCE_TAG: &str = "StreamViX TV";

const NO_PROXY: &str = "[❌Proxy]";
const DIRECT_TIER: &str = "[🌍dTV]";
const HD_TIER: &str = "[📺HD]";
const FHD_TIER: &str = "[📽️FHD]";
const D_TIER: &str = "[🌐D]";

pub struct LiveResolver {
    catalog: Arc<ChannelCatalog>,
    cache: ChannelCache,
}

impl LiveResolver {
    pub fn new(catalog: Arc<ChannelCatalog>, cache: ChannelCache) -> Self {
        Self { catalog, cache }
    }

    async fn cache_tiers(
        &self,
        channel: &ChannelDescriptor,
        tv_proxy: Option<&TvProxy>,
    ) -> Vec<StreamCandidate> {
        let links = self
            .cache
            .resolve_channel(&channel.name, &channel.aliases())
            .await;

        links
            .into_iter()
            .enumerate()
            .map(|(index, link)| {
                let title = format!("[✌️V-{}] {}", index + 1, channel.name);
                match tv_proxy {
                    Some(proxy) => StreamCandidate::new(SOURCE_TAG, title, proxy.m3u_url(&link.url)),
                    None => StreamCandidate::new(SOURCE_TAG, format!("{}{}", NO_PROXY, title), link.url),
                }
            })
            .collect()
    }
}

/// Candidates for the static URLs of a channel, in tier order
pub fn static_tiers(
    channel: &ChannelDescriptor,
    mpd_proxy: Option<&MediaFlowProxy>,
    tv_proxy: Option<&TvProxy>,
) -> Vec<StreamCandidate> {
    let name = &channel.name;
    let mut out = Vec::new();

    if let Some(url) = &channel.static_url_f {
        out.push(StreamCandidate::new(
            SOURCE_TAG,
            format!("{} {}", DIRECT_TIER, name),
            url.as_str(),
        ));
    }

    for (url, tier) in [(&channel.static_url, HD_TIER), (&channel.static_url2, FHD_TIER)] {
        let Some(url) = url else { continue };
        out.push(match mpd_proxy {
            Some(proxy) => StreamCandidate::new(
                SOURCE_TAG,
                format!("{} {}", tier, name),
                proxy.mpd_manifest_url(url),
            ),
            None => StreamCandidate::new(
                SOURCE_TAG,
                format!("{}{} {}", NO_PROXY, tier, name),
                url.as_str(),
            ),
        });
    }

    if let Some(url) = &channel.static_url_d {
        out.push(match tv_proxy {
            Some(proxy) => StreamCandidate::new(
                SOURCE_TAG,
                format!("{} {}", D_TIER, name),
                proxy.m3u_url(url),
            ),
            None => StreamCandidate::new(
                SOURCE_TAG,
                format!("{}{} {}", NO_PROXY, D_TIER, name),
                url.as_str(),
            ),
        });
    }

    out
}

#[async_trait]
impl StreamResolver for LiveResolver {
    fn name(&self) -> &'static str {
        "live"
    }

    fn applies(&self, ctx: &ResolveContext) -> bool {
        ctx.settings.live_tv_enabled
    }

    async fn resolve(
        &self,
        request: &ResolutionRequest,
        ctx: &ResolveContext,
    ) -> Vec<StreamCandidate> {
        let channel_id = request.content_id.value();
        let Some(channel) = self.catalog.find(channel_id) else {
            debug!(channel = %channel_id, "Channel not in catalog");
            return Vec::new();
        };

        let mpd_proxy = ctx.settings.mpd_proxy();
        let tv_proxy = ctx.settings.tv_proxy();

        let mut out = static_tiers(channel, mpd_proxy.as_ref(), tv_proxy.as_ref());
        out.extend(self.cache_tiers(channel, tv_proxy.as_ref()).await);

        debug!(channel = %channel.name, count = out.len(), "Live channel resolved");
        out
    }
}
