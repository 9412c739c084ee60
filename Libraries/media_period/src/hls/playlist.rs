//! Immutable snapshots of HLS media playlists.
//!
//! A live playlist refresh produces a brand-new [`MediaPlaylist`]; comparing
//! the new snapshot with the previous one is how a refresh detects that
//! nothing changed.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use thiserror::Error;
use url::Url;

use crate::time::secs_to_us;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlaylistError {
    #[error("segment {index} has an invalid duration ({duration_secs}s)")]
    InvalidDuration { index: usize, duration_secs: f64 },

    #[error("discontinuity sequence goes backwards at segment {index} ({previous} -> {current})")]
    DiscontinuityRegression { index: usize, previous: u32, current: u32 },

    #[error("segment {index} ends beyond the representable timeline")]
    TimelineOverflow { index: usize },

    #[error("unknown encryption method: {0}")]
    UnknownEncryptionMethod(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaylistKind {
    Master,
    Media,
}

/// `METHOD` attribute of `EXT-X-KEY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncryptionMethod {
    None,
    Aes128,
}

impl EncryptionMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            EncryptionMethod::None => "NONE",
            EncryptionMethod::Aes128 => "AES-128",
        }
    }
}

impl fmt::Display for EncryptionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EncryptionMethod {
    type Err = PlaylistError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NONE" => Ok(EncryptionMethod::None),
            "AES-128" => Ok(EncryptionMethod::Aes128),
            other => Err(PlaylistError::UnknownEncryptionMethod(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SegmentEncryption {
    pub method: EncryptionMethod,
    pub key_uri: String,
    /// Hex initialization vector; when absent the media sequence number is used.
    pub iv: Option<String>,
}

/// Partial-resource addressing (`EXT-X-BYTERANGE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    pub offset: u64,
    pub length: u64,
}

impl ByteRange {
    /// Exclusive end offset.
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// One addressable media segment.
///
/// The start time is derived by the playlist that owns the segment and can't
/// be set directly.
#[derive(Debug, Clone)]
pub struct Segment {
    url: String,
    duration_secs: f64,
    discontinuity_sequence: u32,
    start_time_us: i64,
    encryption: Option<SegmentEncryption>,
    byte_range: Option<ByteRange>,
}

// Durations compare by bit pattern, the same key `Hash` uses. `MediaPlaylist::new`
// turns `-0.0` into `0.0`, so equal playlists never differ by the sign of zero.
impl PartialEq for Segment {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
            && self.duration_secs.to_bits() == other.duration_secs.to_bits()
            && self.discontinuity_sequence == other.discontinuity_sequence
            && self.start_time_us == other.start_time_us
            && self.encryption == other.encryption
            && self.byte_range == other.byte_range
    }
}

impl Eq for Segment {}

impl Hash for Segment {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.url.hash(state);
        self.duration_secs.to_bits().hash(state);
        self.discontinuity_sequence.hash(state);
        self.start_time_us.hash(state);
        self.encryption.hash(state);
        self.byte_range.hash(state);
    }
}

impl Segment {
    pub fn new(url: &str, duration_secs: f64) -> Self {
        Self {
            url: url.to_string(),
            duration_secs,
            discontinuity_sequence: 0,
            start_time_us: 0,
            encryption: None,
            byte_range: None,
        }
    }

    pub fn with_discontinuity_sequence(mut self, discontinuity_sequence: u32) -> Self {
        self.discontinuity_sequence = discontinuity_sequence;
        self
    }

    /// `EncryptionMethod::None` leaves the segment unencrypted.
    pub fn with_encryption(mut self, encryption: SegmentEncryption) -> Self {
        self.encryption = (encryption.method != EncryptionMethod::None).then_some(encryption);
        self
    }

    pub fn with_byte_range(mut self, offset: u64, length: u64) -> Self {
        self.byte_range = Some(ByteRange { offset, length });
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_secs
    }

    pub fn duration_us(&self) -> i64 {
        secs_to_us(self.duration_secs)
    }

    pub fn discontinuity_sequence(&self) -> u32 {
        self.discontinuity_sequence
    }

    pub fn start_time_us(&self) -> i64 {
        self.start_time_us
    }

    pub fn end_time_us(&self) -> i64 {
        self.start_time_us.saturating_add(self.duration_us())
    }

    pub fn encryption(&self) -> Option<&SegmentEncryption> {
        self.encryption.as_ref()
    }

    pub fn is_encrypted(&self) -> bool {
        self.encryption.is_some()
    }

    pub fn byte_range(&self) -> Option<ByteRange> {
        self.byte_range
    }

    /// Orders the segment against a point in time by its start time.
    pub fn cmp_start_time(&self, time_us: i64) -> Ordering {
        self.start_time_us.cmp(&time_us)
    }
}

/// A media playlist snapshot.
///
/// Equality covers the media sequence, target duration, version, both
/// liveness flags, the derived duration and the ordered segments. The base
/// URI is where the snapshot was fetched from and does not take part.
#[derive(Debug, Clone)]
pub struct MediaPlaylist {
    base_uri: String,
    media_sequence: u64,
    target_duration_secs: u32,
    version: u32,
    live: bool,
    live_event: bool,
    segments: Vec<Segment>,
    duration_us: i64,
}

impl MediaPlaylist {
    /// Builds a snapshot, deriving every segment's start time from the
    /// durations of the segments before it.
    pub fn new(
        base_uri: &str,
        media_sequence: u64,
        target_duration_secs: u32,
        version: u32,
        live: bool,
        live_event: bool,
        mut segments: Vec<Segment>,
    ) -> Result<Self, PlaylistError> {
        let mut start_time_us = 0;
        let mut previous_discontinuity = 0;
        for (index, segment) in segments.iter_mut().enumerate() {
            if !segment.duration_secs.is_finite() || segment.duration_secs < 0.0 {
                return Err(PlaylistError::InvalidDuration {
                    index,
                    duration_secs: segment.duration_secs,
                });
            }
            if segment.discontinuity_sequence < previous_discontinuity {
                return Err(PlaylistError::DiscontinuityRegression {
                    index,
                    previous: previous_discontinuity,
                    current: segment.discontinuity_sequence,
                });
            }
            previous_discontinuity = segment.discontinuity_sequence;
            segment.duration_secs += 0.0;
            segment.start_time_us = start_time_us;
            start_time_us = start_time_us
                .checked_add(segment.duration_us())
                .ok_or(PlaylistError::TimelineOverflow { index })?;
        }

        let duration_us = segments.last().map(Segment::end_time_us).unwrap_or(0);

        Ok(Self {
            base_uri: base_uri.to_string(),
            media_sequence,
            target_duration_secs,
            version,
            live,
            live_event,
            segments,
            duration_us,
        })
    }

    pub fn kind(&self) -> PlaylistKind {
        PlaylistKind::Media
    }

    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }

    /// Absolute sequence number of the first segment in this snapshot.
    pub fn media_sequence(&self) -> u64 {
        self.media_sequence
    }

    pub fn target_duration_secs(&self) -> u32 {
        self.target_duration_secs
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// The playlist is still being appended to.
    pub fn is_live(&self) -> bool {
        self.live
    }

    /// A live playlist that never drops old segments.
    pub fn is_live_event(&self) -> bool {
        self.live_event
    }

    /// No more segments will be appended.
    pub fn is_ended(&self) -> bool {
        !self.live
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// 0 when empty, otherwise the end of the last segment.
    pub fn duration_us(&self) -> i64 {
        self.duration_us
    }

    pub fn sequence_number(&self, index: usize) -> u64 {
        self.media_sequence + index as u64
    }

    /// Index of the first segment starting at or after `time_us`, or
    /// `segments().len()` if there is none. Segments sharing a start time keep
    /// their playlist order.
    pub fn segment_index_at_or_after(&self, time_us: i64) -> usize {
        self.segments
            .partition_point(|segment| segment.cmp_start_time(time_us) == Ordering::Less)
    }

    /// Index of the segment whose time range contains `time_us`.
    pub fn segment_index_containing(&self, time_us: i64) -> Option<usize> {
        let after = self
            .segments
            .partition_point(|segment| segment.cmp_start_time(time_us) != Ordering::Greater);
        let index = after.checked_sub(1)?;
        (time_us < self.segments[index].end_time_us()).then_some(index)
    }

    /// Resolves a (possibly relative) URI against the playlist's base URI.
    pub fn resolve(&self, uri: &str) -> Result<Url, PlaylistError> {
        Ok(Url::parse(&self.base_uri)?.join(uri)?)
    }

    pub fn segment_url(&self, segment: &Segment) -> Result<Url, PlaylistError> {
        self.resolve(segment.url())
    }

    pub fn key_url(&self, segment: &Segment) -> Result<Option<Url>, PlaylistError> {
        segment
            .encryption()
            .map(|encryption| self.resolve(&encryption.key_uri))
            .transpose()
    }
}

impl PartialEq for MediaPlaylist {
    fn eq(&self, other: &Self) -> bool {
        self.media_sequence == other.media_sequence
            && self.target_duration_secs == other.target_duration_secs
            && self.version == other.version
            && self.live == other.live
            && self.live_event == other.live_event
            && self.duration_us == other.duration_us
            && self.segments == other.segments
    }
}

impl Eq for MediaPlaylist {}

impl Hash for MediaPlaylist {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.media_sequence.hash(state);
        self.target_duration_secs.hash(state);
        self.version.hash(state);
        self.segments.hash(state);
        self.live.hash(state);
        self.live_event.hash(state);
        self.duration_us.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(playlist: &MediaPlaylist) -> u64 {
        let mut hasher = DefaultHasher::new();
        playlist.hash(&mut hasher);
        hasher.finish()
    }

    fn segments() -> Vec<Segment> {
        vec![
            Segment::new("seg0.ts", 4.0),
            Segment::new("seg1.ts", 4.5),
            Segment::new("ad0.ts", 2.25).with_discontinuity_sequence(1),
            Segment::new("seg2.ts", 4.0).with_discontinuity_sequence(2),
        ]
    }

    fn playlist(segments: Vec<Segment>) -> MediaPlaylist {
        MediaPlaylist::new("https://cdn.example.com/live/index.m3u8", 120, 5, 3, true, false, segments).unwrap()
    }

    #[test]
    fn start_times_are_running_sums() {
        let playlist = playlist(segments());
        let starts: Vec<i64> = playlist.segments().iter().map(Segment::start_time_us).collect();
        assert_eq!(starts, vec![0, 4_000_000, 8_500_000, 10_750_000]);
        assert_eq!(playlist.duration_us(), 14_750_000);
    }

    #[test]
    fn empty_playlist_has_zero_duration() {
        let playlist = playlist(vec![]);
        assert_eq!(playlist.duration_us(), 0);
        assert_eq!(playlist.segment_index_at_or_after(0), 0);
        assert_eq!(playlist.segment_index_containing(0), None);
    }

    #[test]
    fn equal_snapshots_hash_alike() {
        let a = playlist(segments());
        let b = MediaPlaylist::new("https://mirror.example.com/live/index.m3u8", 120, 5, 3, true, false, segments())
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_eq!(a.duration_us(), b.duration_us());
    }

    #[test]
    fn signed_zero_durations_hash_alike() {
        let positive = MediaPlaylist::new("", 0, 4, 3, false, false, vec![Segment::new("a.ts", 0.0)]).unwrap();
        let negative = MediaPlaylist::new("", 0, 4, 3, false, false, vec![Segment::new("a.ts", -0.0)]).unwrap();
        assert_eq!(positive, negative);
        assert_eq!(hash_of(&positive), hash_of(&negative));
        assert!(negative.segments()[0].duration_secs().is_sign_positive());
    }

    #[test]
    fn unvalidated_segments_are_reflexive() {
        let segment = Segment::new("a.ts", f64::NAN);
        assert_eq!(segment, segment.clone());
    }

    #[test]
    fn rejects_timelines_past_i64() {
        let result = MediaPlaylist::new(
            "",
            0,
            4,
            3,
            false,
            false,
            vec![Segment::new("a.ts", 1e13), Segment::new("b.ts", 1e13)],
        );
        assert_eq!(result.unwrap_err(), PlaylistError::TimelineOverflow { index: 1 });
    }

    #[test]
    fn any_field_change_breaks_equality() {
        let base = playlist(segments());
        let mut reordered = segments();
        reordered.swap(0, 1);
        let changed = [
            MediaPlaylist::new(base.base_uri(), 121, 5, 3, true, false, segments()).unwrap(),
            MediaPlaylist::new(base.base_uri(), 120, 6, 3, true, false, segments()).unwrap(),
            MediaPlaylist::new(base.base_uri(), 120, 5, 4, true, false, segments()).unwrap(),
            MediaPlaylist::new(base.base_uri(), 120, 5, 3, false, false, segments()).unwrap(),
            MediaPlaylist::new(base.base_uri(), 120, 5, 3, true, true, segments()).unwrap(),
            playlist(reordered),
            playlist(segments()[..3].to_vec()),
        ];
        for playlist in &changed {
            assert_ne!(&base, playlist);
        }
    }

    #[test]
    fn finds_segments_by_time() {
        let playlist = playlist(segments());
        assert_eq!(playlist.segment_index_at_or_after(0), 0);
        assert_eq!(playlist.segment_index_at_or_after(1), 1);
        assert_eq!(playlist.segment_index_at_or_after(8_500_000), 2);
        assert_eq!(playlist.segment_index_at_or_after(20_000_000), 4);

        assert_eq!(playlist.segment_index_containing(4_200_000), Some(1));
        assert_eq!(playlist.segment_index_containing(10_750_000), Some(3));
        assert_eq!(playlist.segment_index_containing(14_750_000), None);
        assert_eq!(playlist.segment_index_containing(-1), None);
        assert_eq!(playlist.sequence_number(2), 122);
    }

    #[test]
    fn zero_length_segments_keep_playlist_order() {
        let playlist = playlist(vec![
            Segment::new("a.ts", 0.0),
            Segment::new("b.ts", 0.0),
            Segment::new("c.ts", 2.0),
        ]);
        assert_eq!(playlist.segment_index_at_or_after(0), 0);
        assert_eq!(playlist.segments()[1].cmp_start_time(0), Ordering::Equal);
        assert_eq!(playlist.segment_index_containing(0), Some(2));
    }

    #[test]
    fn rejects_invalid_segments() {
        let result = MediaPlaylist::new("", 0, 4, 3, false, false, vec![Segment::new("a.ts", f64::NAN)]);
        assert!(matches!(result, Err(PlaylistError::InvalidDuration { index: 0, .. })));

        let result = MediaPlaylist::new(
            "",
            0,
            4,
            3,
            false,
            false,
            vec![
                Segment::new("a.ts", 4.0).with_discontinuity_sequence(2),
                Segment::new("b.ts", 4.0).with_discontinuity_sequence(1),
            ],
        );
        assert_eq!(
            result.unwrap_err(),
            PlaylistError::DiscontinuityRegression { index: 1, previous: 2, current: 1 }
        );
    }

    #[test]
    fn encryption_and_urls() {
        let encrypted = Segment::new("seg3.ts", 4.0)
            .with_encryption(SegmentEncryption {
                method: "AES-128".parse().unwrap(),
                key_uri: "../keys/k1.bin".to_string(),
                iv: Some("0x1F".to_string()),
            })
            .with_byte_range(1024, 2048);
        let clear = Segment::new("seg4.ts", 4.0).with_encryption(SegmentEncryption {
            method: EncryptionMethod::None,
            key_uri: String::new(),
            iv: None,
        });
        assert!(encrypted.is_encrypted());
        assert!(!clear.is_encrypted());
        assert_eq!(encrypted.byte_range().unwrap().end(), 3072);

        let playlist = playlist(vec![encrypted, clear]);
        let segment = &playlist.segments()[0];
        assert_eq!(
            playlist.segment_url(segment).unwrap().as_str(),
            "https://cdn.example.com/live/seg3.ts"
        );
        assert_eq!(
            playlist.key_url(segment).unwrap().unwrap().as_str(),
            "https://cdn.example.com/keys/k1.bin"
        );
        assert_eq!(playlist.key_url(&playlist.segments()[1]).unwrap(), None);
        assert_eq!(
            "SAMPLE-AES".parse::<EncryptionMethod>(),
            Err(PlaylistError::UnknownEncryptionMethod("SAMPLE-AES".to_string()))
        );
        assert_eq!(EncryptionMethod::Aes128.to_string(), "AES-128");
    }
}
