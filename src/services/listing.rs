//! Channel listing collaborator
//!
//! Produces the full name -> URL list used to rebuild the link cache, and
//! resolves a single channel name when the cache is still cold.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::error::ResolveError;
use crate::services::script::{args, ScriptError, ScriptRunner};

/// One entry of a full channel listing
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ListedChannel {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl ListedChannel {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            url: Some(url.to_string()),
        }
    }
}

#[async_trait]
pub trait ChannelListing: Send + Sync {
    /// Fetch every known channel
    async fn fetch_all(&self) -> Result<Vec<ListedChannel>, ResolveError>;

    /// Resolve one channel by display name; `Ok(None)` when unknown
    async fn resolve_one(&self, name: &str) -> Result<Option<String>, ResolveError>;
}

/// Listing backed by the channel resolver script
pub struct ScriptChannelListing {
    runner: ScriptRunner,
    listing_timeout: Duration,
}

impl ScriptChannelListing {
    pub fn new(runner: ScriptRunner, listing_timeout: Duration) -> Self {
        Self {
            runner,
            listing_timeout,
        }
    }
}

#[async_trait]
impl ChannelListing for ScriptChannelListing {
    async fn fetch_all(&self) -> Result<Vec<ListedChannel>, ResolveError> {
        let stdout = self
            .runner
            .run_with_timeout(&args(["--dump-channels"]), self.listing_timeout)
            .await
            .map_err(|e| ResolveError::CacheRefreshFailed(e.to_string()))?;

        crate::services::script::parse_json_output::<Vec<ListedChannel>>(&stdout)
            .map_err(|e| ResolveError::CacheRefreshFailed(e.to_string()))
    }

    async fn resolve_one(&self, name: &str) -> Result<Option<String>, ResolveError> {
        match self.runner.run(&args([name, "--original-link"])).await {
            Ok(stdout) => Ok(first_url(&stdout)),
            Err(ScriptError::Exit { .. }) => Ok(None),
            Err(e) => Err(e.into_resolve_error("channel-listing")),
        }
    }
}

/// Last line of the output that looks like a URL
fn first_url(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| line.starts_with("http://") || line.starts_with("https://"))
        .map(str::to_string)
}
