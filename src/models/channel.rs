use serde::{Deserialize, Serialize};

/// A single string or a list of strings, as found in channel files and
/// cache snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn as_slice(&self) -> &[String] {
        match self {
            OneOrMany::One(value) => std::slice::from_ref(value),
            OneOrMany::Many(values) => values,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.as_slice().iter().all(|v| v.trim().is_empty())
    }
}

/// Static description of a live channel
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelDescriptor {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub epg_name: Option<String>,

    /// HD tier, served through the MPD proxy
    #[serde(default)]
    pub static_url: Option<String>,
    /// FHD tier, served through the MPD proxy
    #[serde(default)]
    pub static_url2: Option<String>,
    /// Always served direct
    #[serde(default)]
    pub static_url_f: Option<String>,
    /// Served through the TV proxy
    #[serde(default)]
    pub static_url_d: Option<String>,

    #[serde(default)]
    pub vavoo_names: Vec<String>,
    #[serde(default)]
    pub category: Option<OneOrMany>,
    #[serde(default)]
    pub categories: Vec<String>,
}

impl ChannelDescriptor {
    /// Names this channel is known by in the link cache
    pub fn aliases(&self) -> Vec<String> {
        let aliases: Vec<String> = self
            .vavoo_names
            .iter()
            .map(|n| n.trim())
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .collect();

        if aliases.is_empty() {
            vec![self.name.clone()]
        } else {
            aliases
        }
    }

    /// Categories set explicitly in the channel file
    pub fn explicit_categories(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .category
            .as_ref()
            .map(|c| c.as_slice().to_vec())
            .unwrap_or_default();
        out.extend(self.categories.iter().cloned());
        out.retain(|c| !c.trim().is_empty());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_from_channel_file() {
        let json = r#"{
            "id": "rai1",
            "name": "Rai 1",
            "staticUrl": "https://a/mpd",
            "staticUrlF": "https://b/m3u8",
            "vavooNames": ["RAI 1", " "],
            "category": "rai"
        }"#;
        let channel: ChannelDescriptor = serde_json::from_str(json).unwrap();

        assert_eq!(channel.static_url.as_deref(), Some("https://a/mpd"));
        assert_eq!(channel.static_url_f.as_deref(), Some("https://b/m3u8"));
        assert!(channel.static_url2.is_none());
        assert_eq!(channel.aliases(), vec!["RAI 1".to_string()]);
        assert_eq!(channel.explicit_categories(), vec!["rai".to_string()]);
    }

    #[test]
    fn test_aliases_default_to_name() {
        let channel = ChannelDescriptor {
            id: "x".into(),
            name: "Canale 5".into(),
            ..Default::default()
        };
        assert_eq!(channel.aliases(), vec!["Canale 5".to_string()]);
    }

    #[test]
    fn test_one_or_many() {
        let many: OneOrMany = serde_json::from_str(r#"["a", "b"]"#).unwrap();
        assert_eq!(many.as_slice().len(), 2);
        let one: OneOrMany = serde_json::from_str(r#""a""#).unwrap();
        assert_eq!(one.as_slice(), &["a".to_string()]);
        assert!(OneOrMany::Many(vec![]).is_empty());
    }
}
