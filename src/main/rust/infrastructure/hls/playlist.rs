//! Minimal M3U8 parser covering what the adaptive client needs: master
//! playlist variants and live/VOD media playlists.

use std::collections::HashMap;

use thiserror::Error;
use url::Url;

use crate::domain::value_objects::QualityPreference;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaylistError {
    #[error("missing #EXTM3U header")]
    MissingHeader,

    #[error("invalid playlist URL {0}")]
    InvalidBaseUrl(String),

    #[error("master playlist lists no variants")]
    NoVariants,

    #[error("invalid duration {0:?}")]
    InvalidDuration(String),

    #[error("media sequence overflows at segment {0}")]
    SequenceOverflow(String),
}

/// Longest target or segment duration accepted from a playlist, in seconds
pub const MAX_DURATION_SECS: f64 = 3600.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    pub bandwidth: u64,
    pub height: Option<u32>,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub sequence: u64,
    pub duration: f64,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaPlaylist {
    pub target_duration: f64,
    pub media_sequence: u64,
    pub segments: Vec<Segment>,
    /// `#EXT-X-ENDLIST` seen: no refresh needed
    pub ended: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Playlist {
    Master(Vec<Variant>),
    Media(MediaPlaylist),
}

pub fn parse_playlist(content: &str, playlist_url: &str) -> Result<Playlist, PlaylistError> {
    let mut lines = content.lines().map(str::trim).filter(|l| !l.is_empty());

    if lines.next() != Some("#EXTM3U") {
        return Err(PlaylistError::MissingHeader);
    }

    let base = Url::parse(playlist_url)
        .map_err(|_| PlaylistError::InvalidBaseUrl(playlist_url.to_string()))?;

    if content.contains("#EXT-X-STREAM-INF:") {
        parse_master(lines, &base).map(Playlist::Master)
    } else {
        parse_media(lines, &base).map(Playlist::Media)
    }
}

fn parse_master<'a>(
    lines: impl Iterator<Item = &'a str>,
    base: &Url,
) -> Result<Vec<Variant>, PlaylistError> {
    let mut variants = Vec::new();
    let mut pending: Option<(u64, Option<u32>)> = None;

    for line in lines {
        if let Some(rest) = line.strip_prefix("#EXT-X-STREAM-INF:") {
            let attrs = parse_attributes(rest);
            let bandwidth = attrs
                .get("BANDWIDTH")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
            let height = attrs
                .get("RESOLUTION")
                .and_then(|r| r.split('x').nth(1))
                .and_then(|h| h.parse().ok());
            pending = Some((bandwidth, height));
        } else if !line.starts_with('#') {
            if let Some((bandwidth, height)) = pending.take() {
                variants.push(Variant {
                    bandwidth,
                    height,
                    uri: resolve_uri(base, line),
                });
            }
        }
    }

    if variants.is_empty() {
        return Err(PlaylistError::NoVariants);
    }
    Ok(variants)
}

fn parse_media<'a>(
    lines: impl Iterator<Item = &'a str>,
    base: &Url,
) -> Result<MediaPlaylist, PlaylistError> {
    let mut playlist = MediaPlaylist {
        target_duration: 10.0,
        media_sequence: 0,
        segments: Vec::new(),
        ended: false,
    };
    let mut current_duration = None;

    for line in lines {
        if line.starts_with("#EXT-X-ENDLIST") {
            playlist.ended = true;
        } else if let Some(rest) = line.strip_prefix("#EXT-X-MEDIA-SEQUENCE:") {
            playlist.media_sequence = rest.parse().unwrap_or(0);
        } else if let Some(rest) = line.strip_prefix("#EXT-X-TARGETDURATION:") {
            playlist.target_duration = parse_duration(rest)?;
        } else if let Some(rest) = line.strip_prefix("#EXTINF:") {
            let raw = rest.split(',').next().unwrap_or_default();
            current_duration = Some(parse_duration(raw)?);
        } else if !line.starts_with('#') {
            let sequence = playlist
                .media_sequence
                .checked_add(playlist.segments.len() as u64)
                .ok_or_else(|| PlaylistError::SequenceOverflow(line.to_string()))?;
            playlist.segments.push(Segment {
                sequence,
                duration: current_duration.take().unwrap_or(playlist.target_duration),
                uri: resolve_uri(base, line),
            });
        }
    }

    Ok(playlist)
}

/// Durations must be finite, non-negative and at most [`MAX_DURATION_SECS`]
fn parse_duration(raw: &str) -> Result<f64, PlaylistError> {
    let raw = raw.trim();
    match raw.parse::<f64>() {
        Ok(secs) if secs.is_finite() && (0.0..=MAX_DURATION_SECS).contains(&secs) => Ok(secs),
        _ => Err(PlaylistError::InvalidDuration(raw.to_string())),
    }
}

/// Parse `KEY=value,KEY="quoted,value"` attribute lists
fn parse_attributes(input: &str) -> HashMap<String, String> {
    let mut attrs = HashMap::new();
    let mut rest = input;

    while !rest.is_empty() {
        let Some((key, after_key)) = rest.split_once('=') else {
            break;
        };
        let (value, remaining) = if let Some(quoted) = after_key.strip_prefix('"') {
            match quoted.split_once('"') {
                Some((value, tail)) => (value, tail.trim_start_matches(',')),
                None => (quoted, ""),
            }
        } else {
            match after_key.split_once(',') {
                Some((value, tail)) => (value, tail),
                None => (after_key, ""),
            }
        };
        attrs.insert(key.trim().to_string(), value.to_string());
        rest = remaining;
    }

    attrs
}

fn resolve_uri(base: &Url, uri: &str) -> String {
    base.join(uri)
        .map(String::from)
        .unwrap_or_else(|_| uri.to_string())
}

/// Pick a variant index for the quality preference
pub fn select_variant(variants: &[Variant], preference: QualityPreference) -> usize {
    let by_bandwidth = |pick_max: bool| {
        variants
            .iter()
            .enumerate()
            .reduce(|best, candidate| {
                let better = if pick_max {
                    candidate.1.bandwidth > best.1.bandwidth
                } else {
                    candidate.1.bandwidth < best.1.bandwidth
                };
                if better {
                    candidate
                } else {
                    best
                }
            })
            .map(|(index, _)| index)
            .unwrap_or(0)
    };

    match preference {
        QualityPreference::Auto => by_bandwidth(true),
        QualityPreference::Lowest => by_bandwidth(false),
        QualityPreference::MaxHeight(limit) => variants
            .iter()
            .enumerate()
            .filter(|(_, v)| v.height.is_some_and(|h| h <= limit))
            .max_by_key(|(_, v)| v.bandwidth)
            .map(|(index, _)| index)
            .unwrap_or_else(|| by_bandwidth(false)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASTER: &str = "#EXTM3U\n\
        #EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360,CODECS=\"avc1.4d401e,mp4a.40.2\"\n\
        low/index.m3u8\n\
        #EXT-X-STREAM-INF:BANDWIDTH=2800000,RESOLUTION=1280x720\n\
        mid/index.m3u8\n\
        #EXT-X-STREAM-INF:BANDWIDTH=5000000,RESOLUTION=1920x1080\n\
        https://other.host/high/index.m3u8\n";

    const LIVE: &str = "#EXTM3U\n\
        #EXT-X-VERSION:3\n\
        #EXT-X-TARGETDURATION:2\n\
        #EXT-X-MEDIA-SEQUENCE:41\n\
        #EXTINF:2.000,\n\
        segment41.ts\n\
        #EXTINF:1.500,\n\
        segment42.ts\n";

    fn variants() -> Vec<Variant> {
        match parse_playlist(MASTER, "http://media:8888/cam1/index.m3u8").unwrap() {
            Playlist::Master(variants) => variants,
            other => panic!("expected master playlist, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_master_resolves_relative_uris() {
        let variants = variants();
        assert_eq!(variants.len(), 3);
        assert_eq!(variants[0].uri, "http://media:8888/cam1/low/index.m3u8");
        assert_eq!(variants[0].height, Some(360));
        assert_eq!(variants[2].uri, "https://other.host/high/index.m3u8");
    }

    #[test]
    fn test_parse_live_media_playlist() {
        let playlist = parse_playlist(LIVE, "http://media:8888/cam1/index.m3u8").unwrap();
        let Playlist::Media(media) = playlist else {
            panic!("expected media playlist");
        };

        assert!(!media.ended);
        assert_eq!(media.target_duration, 2.0);
        assert_eq!(media.segments.len(), 2);
        assert_eq!(media.segments[0].sequence, 41);
        assert_eq!(media.segments[1].sequence, 42);
        assert_eq!(media.segments[1].duration, 1.5);
        assert_eq!(media.segments[1].uri, "http://media:8888/cam1/segment42.ts");
    }

    #[test]
    fn test_endlist_marks_playlist_ended() {
        let content = format!("{}#EXT-X-ENDLIST\n", LIVE);
        let Playlist::Media(media) = parse_playlist(&content, "http://h/p.m3u8").unwrap() else {
            panic!("expected media playlist");
        };
        assert!(media.ended);
    }

    #[test]
    fn test_rejects_non_playlist() {
        assert_eq!(
            parse_playlist("<html>404</html>", "http://h/p.m3u8"),
            Err(PlaylistError::MissingHeader)
        );
    }

    #[test]
    fn test_rejects_out_of_range_durations() {
        for target in ["1e300", "inf", "NaN", "-2", "soon"] {
            let content = format!(
                "#EXTM3U\n#EXT-X-TARGETDURATION:{}\n#EXTINF:2,\na.ts\n",
                target
            );
            assert_eq!(
                parse_playlist(&content, "http://h/p.m3u8"),
                Err(PlaylistError::InvalidDuration(target.to_string())),
                "target duration {}",
                target
            );
        }

        let content = "#EXTM3U\n#EXT-X-TARGETDURATION:2\n#EXTINF:1e300,\na.ts\n";
        assert!(matches!(
            parse_playlist(content, "http://h/p.m3u8"),
            Err(PlaylistError::InvalidDuration(_))
        ));
    }

    #[test]
    fn test_media_sequence_overflow_is_an_error() {
        let content = format!(
            "#EXTM3U\n#EXT-X-MEDIA-SEQUENCE:{}\n#EXTINF:2,\na.ts\n#EXTINF:2,\nb.ts\n",
            u64::MAX
        );
        assert_eq!(
            parse_playlist(&content, "http://h/p.m3u8"),
            Err(PlaylistError::SequenceOverflow("b.ts".to_string()))
        );
    }

    #[test]
    fn test_quoted_attributes_keep_commas() {
        let attrs = parse_attributes("BANDWIDTH=1,CODECS=\"a,b\",RESOLUTION=2x3");
        assert_eq!(attrs["CODECS"], "a,b");
        assert_eq!(attrs["RESOLUTION"], "2x3");
    }

    #[test]
    fn test_select_variant_by_preference() {
        let variants = variants();
        assert_eq!(select_variant(&variants, QualityPreference::Auto), 2);
        assert_eq!(select_variant(&variants, QualityPreference::Lowest), 0);
        assert_eq!(select_variant(&variants, QualityPreference::MaxHeight(720)), 1);
        assert_eq!(select_variant(&variants, QualityPreference::MaxHeight(240)), 0);
    }
}
