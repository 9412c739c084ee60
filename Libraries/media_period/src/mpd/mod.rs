//! DASH manifest data structures (MPD, periods, adaptation sets).
//! These are already-parsed values; parsing the XML happens upstream.

pub mod builder;

use chrono::{DateTime, Utc};

use crate::time::MICROS_PER_MILLI;

/// Kind of media carried by an adaptation set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackType {
    Video,
    Audio,
    Text,
    Unknown,
}

impl TrackType {
    /// Infers the track type from a `contentType` or `mimeType` attribute value.
    pub fn from_content_type(value: &str) -> Self {
        if value.contains("audio") {
            TrackType::Audio
        } else if value.contains("video") {
            TrackType::Video
        } else if value.contains("text") || value.contains("vtt") || value.contains("ttml") {
            TrackType::Text
        } else {
            TrackType::Unknown
        }
    }
}

/// One encoded rendition: bitrate, codec and resolution class.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Format {
    /// Unique identifier for the representation.
    pub id: String,
    /// MIME type of the media (e.g., "video/mp4").
    pub mime_type: String,
    /// RFC 6381 codec string (e.g., "avc1.42E01E").
    pub codecs: String,
    /// Average bandwidth in bits per second (bps).
    pub bandwidth: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub sample_rate: Option<u32>,
}

impl Format {
    pub fn new(id: &str, mime_type: &str, codecs: &str, bandwidth: u64) -> Self {
        Self {
            id: id.to_string(),
            mime_type: mime_type.to_string(),
            codecs: codecs.to_string(),
            bandwidth,
            width: None,
            height: None,
            sample_rate: None,
        }
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = Some(sample_rate);
        self
    }
}

/// A single video/audio representation within an adaptation set.
#[derive(Debug, Clone, PartialEq)]
pub struct Representation {
    pub format: Format,
    /// URL template for the initialization segment.
    pub initialization: String,
    /// URL template for the media segments (may contain $Number$, $Time$, etc.).
    pub media: String,
    /// Duration of each segment in seconds. Derived from `duration / timescale` in SegmentTemplate.
    pub segment_duration: f64,
    /// Timescale used to convert segment timing to seconds.
    pub timescale: u64,
}

/// An adaptation set groups representations of the same content (e.g., audio or video).
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptationSet {
    pub id: u32,
    pub track_type: TrackType,
    /// All representations available in this adaptation set, in manifest order.
    pub representations: Vec<Representation>,
}

/// A contiguous time window of the presentation.
#[derive(Debug, Clone, PartialEq)]
pub struct Period {
    pub id: Option<String>,
    /// Start of the period relative to the start of the presentation.
    pub start_ms: u64,
    pub adaptation_sets: Vec<AdaptationSet>,
}

/// Top-level manifest value. A refresh produces a brand new value.
#[derive(Debug, Clone, PartialEq)]
pub struct DashManifest {
    /// True for live (`type="dynamic"`) presentations whose duration is unbounded.
    pub dynamic: bool,
    /// The wall-clock time when the presentation became available (used to calculate live edge).
    pub availability_start_time: Option<DateTime<Utc>>,
    /// Total presentation duration, if known.
    pub duration_ms: Option<u64>,
    pub min_update_period_ms: Option<u64>,
    pub time_shift_buffer_depth_ms: Option<u64>,
    pub periods: Vec<Period>,
}

impl DashManifest {
    pub fn period_count(&self) -> usize {
        self.periods.len()
    }

    pub fn period(&self, index: usize) -> Option<&Period> {
        self.periods.get(index)
    }

    /// Duration of the period at `index`: the gap to the next period's start,
    /// or for the last period the remainder of the presentation duration.
    pub fn period_duration_ms(&self, index: usize) -> Option<u64> {
        let period = self.periods.get(index)?;
        match self.periods.get(index + 1) {
            Some(next) => Some(next.start_ms.saturating_sub(period.start_ms)),
            None => self
                .duration_ms
                .map(|duration| duration.saturating_sub(period.start_ms)),
        }
    }

    /// Period duration in microseconds, or `None` when the manifest is dynamic
    /// (unbounded) or the duration is not known.
    pub fn period_duration_us(&self, index: usize) -> Option<i64> {
        if self.dynamic {
            return None;
        }
        self.period_duration_ms(index)
            .map(|ms| ms as i64 * MICROS_PER_MILLI)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn period(start_ms: u64) -> Period {
        Period {
            id: None,
            start_ms,
            adaptation_sets: vec![],
        }
    }

    fn manifest(dynamic: bool, duration_ms: Option<u64>) -> DashManifest {
        DashManifest {
            dynamic,
            availability_start_time: None,
            duration_ms,
            min_update_period_ms: None,
            time_shift_buffer_depth_ms: None,
            periods: vec![period(0), period(30_000)],
        }
    }

    #[test]
    fn period_durations_follow_period_starts() {
        let manifest = manifest(false, Some(50_000));
        assert_eq!(manifest.period_duration_ms(0), Some(30_000));
        assert_eq!(manifest.period_duration_ms(1), Some(20_000));
        assert_eq!(manifest.period_duration_us(1), Some(20_000_000));
        assert_eq!(manifest.period_duration_ms(2), None);
    }

    #[test]
    fn last_period_without_total_duration_is_unknown() {
        let manifest = manifest(false, None);
        assert_eq!(manifest.period_duration_ms(0), Some(30_000));
        assert_eq!(manifest.period_duration_ms(1), None);
    }

    #[test]
    fn dynamic_manifest_has_unbounded_periods() {
        let manifest = manifest(true, Some(50_000));
        assert_eq!(manifest.period_duration_us(0), None);
    }

    #[test]
    fn infers_track_type() {
        assert_eq!(TrackType::from_content_type("audio/mp4"), TrackType::Audio);
        assert_eq!(TrackType::from_content_type("video"), TrackType::Video);
        assert_eq!(TrackType::from_content_type("text/vtt"), TrackType::Text);
        assert_eq!(TrackType::from_content_type("application/octet-stream"), TrackType::Unknown);
    }
}
