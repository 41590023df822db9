//! Name normalization for channel names and anime search titles
//!
//! `normalize` is the comparison form (lower-cased), `display` keeps case.
//! Both are total and idempotent.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref PAREN_SUFFIX: Regex = Regex::new(r"\s*\(\d+\)$").unwrap();
    static ref LETTER_SUFFIX: Regex = Regex::new(r"\s+\.[a-zA-Z]$").unwrap();
    static ref PARENTHESIZED: Regex = Regex::new(r"\s*\([^)]*\)").unwrap();
    static ref LANGUAGE_TAGS: Regex = Regex::new(r"(?i)\s*\((ita|cr)\)|\b(ita|cr)\b").unwrap();

    /// Replacements applied before searching anime catalogues. Longer
    /// phrases precede their prefixes.
    static ref SEARCH_ALIASES: Vec<(Regex, &'static str)> = [
        ("Attack on Titan OAD", "L'attacco dei Giganti: Il taccuino di Ilse"),
        ("Attack on Titan", "L'attacco dei Giganti"),
        ("Ore dake Level Up na Ken", "Solo Leveling"),
        ("Solo Leveling 2", "Solo Leveling 2:"),
        ("Shippuuden", "Shippuden"),
        ("Naruto:", "Naruto"),
        ("Season", ""),
        ("-", ""),
    ]
    .iter()
    .map(|(pattern, replacement)| {
        (
            Regex::new(&format!(r"(?i){}", regex::escape(pattern))).unwrap(),
            *replacement,
        )
    })
    .collect();
}

/// Fold typographic apostrophes and quotes to their ASCII forms
pub fn fold_punctuation(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' | '\u{201B}' | '\u{2032}' | '\u{02BC}' | '`' => '\'',
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{2033}' => '"',
            '\u{2010}' | '\u{2011}' | '\u{2013}' | '\u{2014}' => '-',
            other => other,
        })
        .collect()
}

/// Collapse runs of whitespace to one space and trim
pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Display form: punctuation folded, whitespace collapsed, case preserved
pub fn display(text: &str) -> String {
    collapse_whitespace(&fold_punctuation(text))
}

/// Comparison form: display form, lower-cased
pub fn normalize(text: &str) -> String {
    display(text).to_lowercase()
}

/// Key used for variant matching against the link cache: upper-cased and
/// whitespace-collapsed
pub fn channel_key(name: &str) -> String {
    collapse_whitespace(name).to_uppercase()
}

/// "Rai 1 (2)" -> "Rai 1", "Rai 1 .B" -> "Rai 1"
pub fn strip_variant_suffix(name: &str) -> String {
    let trimmed = collapse_whitespace(name);
    let without_letter = LETTER_SUFFIX.replace(&trimmed, "");
    PAREN_SUFFIX.replace(&without_letter, "").trim().to_string()
}

/// Apply the search alias table, returning a display-form query
pub fn search_title(title: &str) -> String {
    let mut out = display(title);
    for (pattern, replacement) in SEARCH_ALIASES.iter() {
        out = pattern.replace_all(&out, *replacement).into_owned();
    }
    collapse_whitespace(&out)
}

/// Remove every parenthesized group
pub fn strip_parentheses(text: &str) -> String {
    collapse_whitespace(&PARENTHESIZED.replace_all(text, ""))
}

/// Remove `(ITA)`, `(CR)`, `ITA`, `CR` markers
pub fn strip_language_tags(text: &str) -> String {
    collapse_whitespace(&LANGUAGE_TAGS.replace_all(text, ""))
}

/// Upper-case the first letter
pub fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_folds_and_collapses() {
        assert_eq!(normalize("  L’attacco   dei\tGiganti "), "l'attacco dei giganti");
        assert_eq!(display("  Rai   1 "), "Rai 1");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let samples = [
            "  Rai 1 (2) ",
            "L’Attacco “dei” Giganti",
            "\u{00A0}Sky  Sport\u{2014}F1 ",
            "",
            "İstanbul",
            "Ore dake Level Up na Ken",
        ];
        for sample in samples {
            let once = normalize(sample);
            assert_eq!(normalize(&once), once, "normalize({:?})", sample);
            let shown = display(sample);
            assert_eq!(display(&shown), shown, "display({:?})", sample);
        }
    }

    #[test]
    fn test_strip_variant_suffix() {
        assert_eq!(strip_variant_suffix("Rai 1 (2)"), "Rai 1");
        assert_eq!(strip_variant_suffix("Rai 1 .B"), "Rai 1");
        assert_eq!(strip_variant_suffix("Rai 1"), "Rai 1");
    }

    #[test]
    fn test_channel_key() {
        assert_eq!(channel_key(" Rai  1 "), "RAI 1");
    }

    #[test]
    fn test_search_title_aliases() {
        assert_eq!(search_title("Attack on Titan"), "L'attacco dei Giganti");
        assert_eq!(search_title("Naruto Shippuuden"), "Naruto Shippuden");
        assert_eq!(search_title("Ore dake Level Up na Ken"), "Solo Leveling");
        assert_eq!(search_title("Spy x Family Season 2"), "Spy x Family 2");
    }

    #[test]
    fn test_language_tags_and_capitalize() {
        assert_eq!(strip_language_tags("One Piece (ITA)"), "One Piece");
        assert_eq!(strip_language_tags("Crayon Shin-chan CR"), "Crayon Shin-chan");
        assert_eq!(strip_parentheses("Bleach (2004) (ITA)"), "Bleach");
        assert_eq!(capitalize("one piece"), "One piece");
        assert_eq!(capitalize(""), "");
    }
}
