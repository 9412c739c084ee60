use thiserror::Error;

use crate::chunk::StreamId;

/// Misuse of a [`DashPeriod`](crate::period::DashPeriod).
///
/// These are integration bugs in the playback driver, so every operation
/// reports them immediately instead of quietly doing nothing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeriodError {
    #[error("period has been released")]
    Released,

    #[error("period has not been prepared")]
    NotPrepared,

    #[error("period is already prepared")]
    AlreadyPrepared,

    #[error("period index {index} out of range (manifest has {count} periods)")]
    PeriodOutOfRange { index: usize, count: usize },

    #[error("track group is not part of period {period_index}")]
    UnknownTrackGroup { period_index: usize },

    #[error("track group {0} selected more than once")]
    DuplicateTrackGroup(usize),

    #[error("no active stream {0}")]
    UnknownStream(StreamId),
}

pub type PeriodResult<T> = Result<T, PeriodError>;

/// Errors surfaced asynchronously by loaders (manifest or chunk).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("manifest load failed: {0}")]
    Manifest(String),

    #[error("chunk load failed for {url}: {reason}")]
    Chunk { url: String, reason: String },

    #[error("load canceled")]
    Canceled,
}

/// A manifest value that cannot describe a period.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManifestError {
    #[error("manifest has no periods")]
    NoPeriods,

    #[error("adaptation set {adaptation_set} of period {period} has no representations")]
    EmptyAdaptationSet { period: usize, adaptation_set: usize },

    #[error("representation added before any adaptation set")]
    MissingAdaptationSet,

    #[error("period starts ({start_ms}ms) are not increasing")]
    UnorderedPeriods { start_ms: u64 },
}
