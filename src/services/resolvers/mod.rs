//! Upstream resolvers
//!
//! Each resolver turns a parsed request into zero or more candidates and
//! never fails outward: upstream errors are logged and yield no candidates.

pub mod anime;
pub mod anime_saturn;
pub mod anime_unity;
pub mod live;
pub mod media;

use async_trait::async_trait;

use crate::config::AddonSettings;
use crate::models::{ResolutionRequest, StreamCandidate};

pub use anime::EpisodicResolver;
pub use anime_saturn::AnimeSaturnSource;
pub use anime_unity::AnimeUnitySource;
pub use live::LiveResolver;
pub use media::MediaResolver;

/// Which variants a resolver returns when it can produce both a direct
/// and a proxied link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPolicy {
    /// Proxied first, then direct
    Both,
    Proxied,
    Direct,
}

impl LinkPolicy {
    pub fn for_settings(settings: &AddonSettings) -> Self {
        if settings.both_links {
            LinkPolicy::Both
        } else if settings.media_flow().is_some() {
            LinkPolicy::Proxied
        } else {
            LinkPolicy::Direct
        }
    }

    pub fn wants_proxied(&self) -> bool {
        matches!(self, LinkPolicy::Both | LinkPolicy::Proxied)
    }

    pub fn wants_direct(&self) -> bool {
        matches!(self, LinkPolicy::Both | LinkPolicy::Direct)
    }
}

/// Per-request settings shared by every resolver
#[derive(Debug, Clone)]
pub struct ResolveContext {
    pub settings: AddonSettings,
    pub policy: LinkPolicy,
}

impl ResolveContext {
    pub fn new(settings: AddonSettings) -> Self {
        let policy = LinkPolicy::for_settings(&settings);
        Self { settings, policy }
    }
}

#[async_trait]
pub trait StreamResolver: Send + Sync {
    /// Name used in logs and metrics
    fn name(&self) -> &'static str;

    /// Whether this resolver is enabled for the request settings
    fn applies(&self, _ctx: &ResolveContext) -> bool {
        true
    }

    async fn resolve(&self, request: &ResolutionRequest, ctx: &ResolveContext)
        -> Vec<StreamCandidate>;
}
