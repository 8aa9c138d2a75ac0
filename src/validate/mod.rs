//! Request validation: source URL shape and time range semantics.
//!
//! URL shape and range ordering are checked locally before any network work;
//! the bounds against the media duration can only be checked once the fetcher
//! has reported it.

use serde::Serialize;
use std::fmt;
use url::Url;

use crate::ExtractError;

pub mod timestamp;

pub use timestamp::{format_clock, normalize_timestamp, TimeValue};

const YOUTUBE_HOSTS: &[&str] = &[
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
];

/// A source URL that matched a known video URL shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUrl {
    url: Url,
    video_id: String,
}

impl SourceUrl {
    pub fn parse(raw: &str) -> Result<Self, ExtractError> {
        let invalid = || ExtractError::InvalidUrl(raw.to_string());

        let url = Url::parse(raw.trim()).map_err(|_| invalid())?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid());
        }

        let host = url.host_str().ok_or_else(invalid)?.to_lowercase();
        let segments: Vec<&str> = url
            .path_segments()
            .map(|segments| segments.filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();

        let video_id = if host == "youtu.be" || host == "www.youtu.be" {
            segments.first().map(|id| id.to_string())
        } else if YOUTUBE_HOSTS.contains(&host.as_str()) {
            match segments.as_slice() {
                ["watch"] => url
                    .query_pairs()
                    .find(|(key, _)| key == "v")
                    .map(|(_, value)| value.into_owned()),
                ["shorts" | "embed" | "live" | "v", id, ..] => Some(id.to_string()),
                _ => None,
            }
        } else {
            None
        };

        let video_id = video_id
            .filter(|id| is_video_id(id))
            .ok_or_else(invalid)?;

        Ok(Self { url, video_id })
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }
}

impl fmt::Display for SourceUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

fn is_video_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// A normalized `[start, end)` segment in whole seconds
///
/// Only constructible through validation: `start < end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    start_seconds: u64,
    end_seconds: u64,
}

impl TimeRange {
    /// Build a range from normalized offsets, rejecting negative or inverted ones
    pub fn new(start: i64, end: i64) -> Result<Self, ExtractError> {
        if start < 0 || end <= start {
            return Err(ExtractError::InvalidRange { start, end });
        }
        Ok(Self {
            start_seconds: start as u64,
            end_seconds: end as u64,
        })
    }

    /// Normalize both endpoints and build the range
    pub fn from_values(start: &TimeValue, end: &TimeValue) -> Result<Self, ExtractError> {
        let start = normalize_timestamp(start)?;
        let end = normalize_timestamp(end)?;
        Self::new(start, end)
    }

    /// Check the range against the media duration reported by the fetcher
    pub fn bounded_by(self, duration_seconds: Option<u64>) -> Result<Self, ExtractError> {
        let duration = match duration_seconds {
            Some(d) if d > 0 => d,
            _ => return Err(ExtractError::UnknownDuration),
        };

        if self.start_seconds >= duration {
            return Err(ExtractError::StartBeyondDuration {
                start: self.start_seconds,
                duration,
            });
        }
        if self.end_seconds > duration {
            return Err(ExtractError::EndBeyondDuration {
                end: self.end_seconds,
                duration,
            });
        }

        Ok(self)
    }

    pub fn start_seconds(&self) -> u64 {
        self.start_seconds
    }

    pub fn end_seconds(&self) -> u64 {
        self.end_seconds
    }

    pub fn length_seconds(&self) -> u64 {
        self.end_seconds - self.start_seconds
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            format_clock(self.start_seconds),
            format_clock(self.end_seconds)
        )
    }
}

/// Validate a request against a known media duration, in the order
/// URL shape, range ordering, duration known, start bound, end bound.
pub fn validate_request(
    raw_url: &str,
    start: &TimeValue,
    end: &TimeValue,
    duration_seconds: Option<u64>,
) -> Result<(SourceUrl, TimeRange), ExtractError> {
    let url = SourceUrl::parse(raw_url)?;
    let range = TimeRange::from_values(start, end)?.bounded_by(duration_seconds)?;
    Ok((url, range))
}
