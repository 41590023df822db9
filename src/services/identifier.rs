//! Inbound identifier parsing
//!
//! Accepted shapes: `prefix:ID`, `prefix:ID:EP`, `prefix:ID:S:EP` for the
//! `kitsu`, `mal` and `tmdb` namespaces, the same shapes with a bare IMDb id
//! (`tt123`, `tt123:1:2`), and `tv:ID` for live channels (also `tv%3AID`).

use crate::error::ResolveError;
use crate::models::{ContentId, ResolutionRequest};

const LIVE_PREFIX: &str = "tv:";

/// Parse a raw id into a resolution request
pub fn parse(raw_id: &str) -> Result<ResolutionRequest, ResolveError> {
    let malformed = || ResolveError::MalformedIdentifier(raw_id.to_string());

    let trimmed = raw_id.trim();
    let decoded = if trimmed.contains('%') {
        urlencoding::decode(trimmed)
            .map(|d| d.into_owned())
            .map_err(|_| malformed())?
    } else {
        trimmed.to_string()
    };

    if let Some(channel) = decoded.strip_prefix(LIVE_PREFIX) {
        let channel = channel.trim();
        if channel.is_empty() {
            return Err(malformed());
        }
        let content_id = ContentId::Channel(channel.to_string());
        return Ok(ResolutionRequest {
            source_kind: content_id.source_kind(),
            content_id,
            season: None,
            episode: None,
            is_movie: false,
        });
    }

    let segments: Vec<&str> = decoded.split(':').collect();
    let (content_id, rest) = match segments.as_slice() {
        ["kitsu", id, rest @ ..] if !id.is_empty() => (ContentId::Kitsu(id.to_string()), rest),
        ["mal", id, rest @ ..] if !id.is_empty() => (ContentId::Mal(id.to_string()), rest),
        ["tmdb", id, rest @ ..] if !id.is_empty() => (ContentId::Tmdb(id.to_string()), rest),
        [id, rest @ ..] if is_imdb_id(id) => (ContentId::Imdb(id.to_string()), rest),
        _ => return Err(malformed()),
    };

    let (season, episode) = match rest {
        [] => (None, None),
        [episode] => (None, Some(parse_number(episode).ok_or_else(malformed)?)),
        [season, episode] => (
            Some(parse_number(season).ok_or_else(malformed)?),
            Some(parse_number(episode).ok_or_else(malformed)?),
        ),
        _ => return Err(malformed()),
    };

    if episode == Some(0) {
        return Err(malformed());
    }

    Ok(ResolutionRequest {
        source_kind: content_id.source_kind(),
        content_id,
        season,
        episode,
        is_movie: episode.is_none(),
    })
}

fn is_imdb_id(value: &str) -> bool {
    value
        .strip_prefix("tt")
        .map(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
        .unwrap_or(false)
}

fn parse_number(value: &str) -> Option<u32> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceKind;

    #[test]
    fn test_parse_imdb_movie() {
        let request = parse("tt0111161").unwrap();
        assert_eq!(request.content_id, ContentId::Imdb("tt0111161".into()));
        assert_eq!(request.source_kind, SourceKind::DirectMedia);
        assert!(request.is_movie);
        assert_eq!(request.season, None);
    }

    #[test]
    fn test_parse_imdb_series_episode() {
        let request = parse("tt0944947:3:9").unwrap();
        assert_eq!(request.season, Some(3));
        assert_eq!(request.episode, Some(9));
        assert!(!request.is_movie);
    }

    #[test]
    fn test_parse_kitsu_shapes() {
        let movie = parse("kitsu:12").unwrap();
        assert_eq!(movie.source_kind, SourceKind::EpisodicExternal);
        assert!(movie.is_movie);

        let episode = parse("kitsu:12:5").unwrap();
        assert_eq!(episode.season, None);
        assert_eq!(episode.episode, Some(5));

        let full = parse("mal:21:2:13").unwrap();
        assert_eq!(full.content_id, ContentId::Mal("21".into()));
        assert_eq!(full.season, Some(2));
        assert_eq!(full.episode, Some(13));
    }

    #[test]
    fn test_parse_live_channel() {
        let plain = parse("tv:rai1").unwrap();
        assert_eq!(plain.content_id, ContentId::Channel("rai1".into()));
        assert_eq!(plain.source_kind, SourceKind::LiveChannel);

        let encoded = parse("tv%3Arai1").unwrap();
        assert_eq!(encoded, plain);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for raw in [
            "tt0000000:abc",
            "tt0000000:1:x",
            "kitsu:",
            "kitsu:1:2:3:4",
            "tv:",
            "abc123",
            "tt",
            "",
            "kitsu:1:0",
        ] {
            assert!(
                matches!(parse(raw), Err(ResolveError::MalformedIdentifier(_))),
                "{:?} should be malformed",
                raw
            );
        }
    }

    #[test]
    fn test_parse_allows_specials_season() {
        let request = parse("tt0944947:0:1").unwrap();
        assert_eq!(request.season, Some(0));
    }
}
