//! Track records and the ingestion boundary.
//!
//! Upstream search sources send durations as numbers, bare digit strings
//! or ISO-8601 tokens, and thumbnails either pre-picked or as a variant
//! list. Everything is normalised here, once, so the playback core never
//! branches on encoding.

use serde::{Deserialize, Serialize};

/// Shown when a result carries no usable thumbnail at all.
pub const FALLBACK_THUMBNAIL: &str = "/assets/player_logo.png";

/// A playable item. Immutable once constructed; domain identity is the
/// source `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    /// External-source identifier (trimmed).
    pub id: String,
    pub title: String,
    /// Artist / channel label as reported by the source.
    pub artist: String,
    pub thumbnail_url: String,
    /// Whole seconds. 0 means unknown.
    #[serde(default)]
    pub duration_secs: u32,
}

/// Source ids are fixed-length tokens: 10–11 characters of
/// `[A-Za-z0-9_-]`. A malformed id handed to the external player surfaces
/// as an opaque SDK error far from the root cause, so ids are checked
/// before any SDK call.
pub fn is_valid_track_id(id: &str) -> bool {
    let id = id.trim();
    (10..=11).contains(&id.len())
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

// ── raw search items ──────────────────────────────────────────────────────────

/// Duration as upstream sources actually send it.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawDuration {
    Seconds(f64),
    Text(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawThumbnail {
    pub url: String,
    #[serde(default)]
    pub width: u32,
}

/// One item of a raw search response, before normalisation.
#[derive(Debug, Clone, Deserialize)]
pub struct RawSearchItem {
    #[serde(alias = "videoId")]
    pub id: String,
    #[serde(default, alias = "name")]
    pub title: Option<String>,
    #[serde(default, alias = "artist")]
    pub channel: Option<String>,
    /// A single pre-picked thumbnail URL…
    #[serde(default)]
    pub thumbnail: Option<String>,
    /// …or a variant list to pick from.
    #[serde(default)]
    pub thumbnails: Vec<RawThumbnail>,
    #[serde(default)]
    pub duration: Option<RawDuration>,
}

impl Track {
    /// Normalise a raw search item. Returns `None` when the item has no id
    /// (nothing playable to refer to).
    pub fn from_raw(raw: RawSearchItem) -> Option<Track> {
        let id = raw.id.trim().to_string();
        if id.is_empty() {
            return None;
        }
        Some(Track {
            id,
            title: raw
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| "Unknown Title".to_string()),
            artist: raw
                .channel
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| "Unknown Artist".to_string()),
            thumbnail_url: raw
                .thumbnail
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| best_thumbnail(&raw.thumbnails)),
            duration_secs: raw.duration.map(parse_duration).unwrap_or(0),
        })
    }
}

/// Prefer a mid-size variant (200–500 px wide) to save bandwidth, else the
/// widest available.
fn best_thumbnail(variants: &[RawThumbnail]) -> String {
    let preferred = variants
        .iter()
        .filter(|v| (200..=500).contains(&v.width))
        .max_by_key(|v| v.width)
        .or_else(|| variants.iter().max_by_key(|v| v.width));
    match preferred {
        Some(v) if !v.url.is_empty() => v.url.clone(),
        _ => FALLBACK_THUMBNAIL.to_string(),
    }
}

/// Accepts plain seconds (`185` or `"185"`) and ISO-8601 (`"PT3M5S"`).
/// Anything unparseable is 0 (unknown).
pub fn parse_duration(raw: RawDuration) -> u32 {
    match raw {
        RawDuration::Seconds(s) if s.is_finite() && s >= 0.0 => s.round() as u32,
        RawDuration::Seconds(_) => 0,
        RawDuration::Text(t) => {
            let t = t.trim();
            if !t.is_empty() && t.chars().all(|c| c.is_ascii_digit()) {
                t.parse().unwrap_or(0)
            } else {
                parse_iso8601_secs(t).unwrap_or(0)
            }
        }
    }
}

fn parse_iso8601_secs(s: &str) -> Option<u32> {
    let rest = s.strip_prefix("PT")?;
    let mut total: u32 = 0;
    let mut digits = String::new();
    for c in rest.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
        } else {
            let n: u32 = digits.parse().ok()?;
            digits.clear();
            total = total.checked_add(match c {
                'H' => n.checked_mul(3600)?,
                'M' => n.checked_mul(60)?,
                'S' => n,
                _ => return None,
            })?;
        }
    }
    // Trailing digits without a unit suffix are malformed.
    if !digits.is_empty() {
        return None;
    }
    Some(total)
}
