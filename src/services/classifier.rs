//! Rule-table classifiers
//!
//! - channel categories from name/description keywords
//! - language variant of an anime search hit

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::models::ChannelDescriptor;

pub const FALLBACK_CATEGORY: &str = "general";

struct CategoryRule {
    category: &'static str,
    pattern: Regex,
    /// Whether the description is also searched
    description: bool,
}

lazy_static! {
    // ============ CHANNEL CATEGORIES ============
    static ref CATEGORY_RULES: Vec<CategoryRule> = vec![
        CategoryRule {
            category: "rai",
            pattern: Regex::new(r"(?i)\brai\b").unwrap(),
            description: true,
        },
        CategoryRule {
            category: "mediaset",
            pattern: Regex::new(r"(?i)\b(mediaset|canale\s*5|italia\s*[12]|rete\s*4|la5|iris|twentyseven|cine34|focus)\b").unwrap(),
            description: true,
        },
        CategoryRule {
            category: "sky",
            pattern: Regex::new(r"(?i)\bsky\b").unwrap(),
            description: true,
        },
        CategoryRule {
            category: "kids",
            pattern: Regex::new(r"(?i)\b(gulp|yoyo|boing|cartoonito|k2|frisbee|nickelodeon|cartoon network|disney junior)\b|\bsuper!").unwrap(),
            description: false,
        },
        CategoryRule {
            category: "news",
            pattern: Regex::new(r"(?i)(\bnews\b|\btg\s*\d*\b|\bsky tg24\b|\bbbc world\b|\beuronews\b)").unwrap(),
            description: false,
        },
        CategoryRule {
            category: "sport",
            pattern: Regex::new(r"(?i)(sport|\btennis\b|\bsupertennis\b|\bdazn\b|\bmotortrend\b)").unwrap(),
            description: false,
        },
        CategoryRule {
            category: "movies",
            pattern: Regex::new(r"(?i)\b(cinema|movie|movies|warner|film)\b").unwrap(),
            description: false,
        },
    ];

    // ============ LANGUAGE VARIANTS ============
    static ref CR_PATTERN: Regex = Regex::new(r"(?i)(\(cr\)|\bcr\b|crunchyroll)").unwrap();
    static ref ITA_PATTERN: Regex = Regex::new(r"(?i)(\(ita\)|\bita\b)").unwrap();
}

/// Categories of a channel: explicit ones from the channel file win,
/// otherwise every matching rule, otherwise `general`
pub fn channel_categories(channel: &ChannelDescriptor) -> Vec<String> {
    let explicit = channel.explicit_categories();
    if !explicit.is_empty() {
        return explicit
            .into_iter()
            .map(|c| c.trim().to_lowercase())
            .collect();
    }

    let description = channel.description.as_deref().unwrap_or("");
    let mut categories: Vec<String> = CATEGORY_RULES
        .iter()
        .filter(|rule| {
            rule.pattern.is_match(&channel.name)
                || (rule.description && rule.pattern.is_match(description))
        })
        .map(|rule| rule.category.to_string())
        .collect();

    if categories.is_empty() {
        categories.push(FALLBACK_CATEGORY.to_string());
    }
    categories
}

/// Audio/subtitle variant of an anime search hit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LanguageVariant {
    #[serde(rename = "CR")]
    Crunchyroll,
    #[serde(rename = "ITA")]
    Dubbed,
    #[serde(rename = "SUB")]
    Subbed,
}

impl LanguageVariant {
    pub fn label(&self) -> &'static str {
        match self {
            LanguageVariant::Crunchyroll => "CR",
            LanguageVariant::Dubbed => "ITA",
            LanguageVariant::Subbed => "SUB",
        }
    }
}

impl std::fmt::Display for LanguageVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Classify a search-hit title; Crunchyroll markers win over ITA
pub fn language_variant(title: &str) -> LanguageVariant {
    if CR_PATTERN.is_match(title) {
        LanguageVariant::Crunchyroll
    } else if ITA_PATTERN.is_match(title) {
        LanguageVariant::Dubbed
    } else {
        LanguageVariant::Subbed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OneOrMany;

    fn channel(name: &str, description: Option<&str>) -> ChannelDescriptor {
        ChannelDescriptor {
            id: name.to_lowercase(),
            name: name.to_string(),
            description: description.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_keyword_categories() {
        assert_eq!(channel_categories(&channel("Rai 1", None)), vec!["rai"]);
        assert_eq!(channel_categories(&channel("Canale 5", None)), vec!["mediaset"]);
        assert_eq!(
            channel_categories(&channel("Sky Sport F1", None)),
            vec!["sky", "sport"]
        );
        assert_eq!(channel_categories(&channel("Boing", None)), vec!["kids"]);
        assert_eq!(channel_categories(&channel("TG La7", None)), vec!["news"]);
        assert_eq!(channel_categories(&channel("Warner TV", None)), vec!["movies"]);
    }

    #[test]
    fn test_description_only_for_network_rules() {
        let networked = channel("Premium", Some("Canale del gruppo Mediaset"));
        assert_eq!(channel_categories(&networked), vec!["mediaset"]);

        let described_sport = channel("Canale X", Some("sport tutto il giorno"));
        assert_eq!(channel_categories(&described_sport), vec!["general"]);
    }

    #[test]
    fn test_explicit_categories_win() {
        let mut explicit = channel("Rai Sport", None);
        explicit.category = Some(OneOrMany::One("Sport".into()));
        assert_eq!(channel_categories(&explicit), vec!["sport"]);
    }

    #[test]
    fn test_language_variant() {
        assert_eq!(language_variant("One Piece (ITA)"), LanguageVariant::Dubbed);
        assert_eq!(language_variant("Dandadan (CR)"), LanguageVariant::Crunchyroll);
        assert_eq!(language_variant("Crayon Shin-chan"), LanguageVariant::Subbed);
        assert_eq!(language_variant("Bleach"), LanguageVariant::Subbed);
        assert_eq!(LanguageVariant::Dubbed.to_string(), "ITA");
    }
}
