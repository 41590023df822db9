//! Static live-channel catalog loaded from the channels file

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::models::ChannelDescriptor;
use crate::services::classifier::channel_categories;

lazy_static! {
    static ref BASE64_TEXT: Regex = Regex::new(r"^[A-Za-z0-9+/]+={0,2}$").unwrap();
}

pub struct ChannelCatalog {
    channels: Vec<ChannelDescriptor>,
    by_id: HashMap<String, usize>,
}

impl ChannelCatalog {
    pub fn new(channels: Vec<ChannelDescriptor>) -> Self {
        let channels: Vec<ChannelDescriptor> = channels
            .into_iter()
            .filter(|c| !c.id.trim().is_empty())
            .map(decode_static_urls)
            .collect();

        let mut by_id = HashMap::with_capacity(channels.len());
        for (index, channel) in channels.iter().enumerate() {
            by_id.entry(channel.id.clone()).or_insert(index);
        }

        Self { channels, by_id }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Load the channels file (a JSON array of channel descriptors)
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read channels file {}", path.display()))?;
        let channels: Vec<ChannelDescriptor> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse channels file {}", path.display()))?;
        Ok(Self::new(channels))
    }

    pub fn find(&self, id: &str) -> Option<&ChannelDescriptor> {
        self.by_id.get(id).map(|&index| &self.channels[index])
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Channel count per category
    pub fn category_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for channel in &self.channels {
            for category in channel_categories(channel) {
                *counts.entry(category).or_insert(0) += 1;
            }
        }
        counts
    }
}

fn decode_static_urls(mut channel: ChannelDescriptor) -> ChannelDescriptor {
    for url in [
        &mut channel.static_url,
        &mut channel.static_url2,
        &mut channel.static_url_f,
        &mut channel.static_url_d,
    ] {
        *url = url.take().and_then(|u| {
            let decoded = decode_static_url(&u);
            (!decoded.is_empty()).then_some(decoded)
        });
    }
    channel
}

/// Static URLs may be stored base64-encoded; decode those that turn into an
/// http(s) URL and keep everything else as is
pub fn decode_static_url(value: &str) -> String {
    let value = value.trim();
    if value.starts_with("http://") || value.starts_with("https://") {
        return value.to_string();
    }
    if value.len() > 10 && BASE64_TEXT.is_match(value) {
        if let Some(decoded) = STANDARD
            .decode(value)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
        {
            let decoded = decoded.trim();
            if decoded.starts_with("http://") || decoded.starts_with("https://") {
                return decoded.to_string();
            }
        }
    }
    value.to_string()
}
