//! Contract of the per-track chunk streams a period drives.
//!
//! Retrieval, demuxing and buffering of a single track live behind these
//! traits; the period only creates, observes and releases streams.

use std::fmt;
use std::sync::Arc;

use crate::error::LoadError;
use crate::events::EventDispatcher;
use crate::loader::{LoadingNotifier, SequenceableLoader};
use crate::mpd::{DashManifest, TrackType};
use crate::time::Position;
use crate::track::TrackSelection;
use crate::upstream::{Allocator, LoaderErrorThrower};

/// Handle of one active chunk stream. Ids are never reused within a period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamId(u64);

impl StreamId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream#{}", self.0)
    }
}

/// One chunk of media, addressed through the current manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRequest {
    pub url: String,
    pub segment_number: u64,
    pub start_us: i64,
    pub end_us: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextChunk {
    Load(ChunkRequest),
    /// The chunk exists in the timeline but is not published yet (live).
    NotYetAvailable,
    EndOfStream,
}

/// Produces the chunks of one track from the manifest.
pub trait ChunkSource: Send {
    /// The chunk following everything buffered up to `position_us`.
    fn next_chunk(&mut self, position_us: i64) -> NextChunk;

    /// Points the source at a refreshed manifest. In-flight retrieval keeps
    /// going; only segment addressing changes.
    fn update_manifest(&mut self, manifest: Arc<DashManifest>, period_index: usize);

    fn maybe_throw_error(&self) -> Result<(), LoadError> {
        Ok(())
    }
}

pub trait ChunkSourceFactory: Send + Sync {
    fn create(
        &self,
        manifest_error_thrower: Arc<dyn LoaderErrorThrower>,
        manifest: Arc<DashManifest>,
        period_index: usize,
        adaptation_set_index: usize,
        selection: Arc<dyn TrackSelection>,
        elapsed_realtime_offset_ms: i64,
    ) -> Box<dyn ChunkSource>;
}

/// Retrieval and buffering of exactly one selected track.
///
/// Background work may run elsewhere, but all methods are called from the
/// playback-control thread. Completion is reported through the
/// [`LoadingNotifier`] handed over at construction.
pub trait ChunkStream: SequenceableLoader + Send {
    fn buffered_position_us(&self) -> Position;

    /// Re-seeds the stream at `position_us`, discarding stale chunks.
    fn seek_to_us(&mut self, position_us: i64);

    fn chunk_source(&self) -> &dyn ChunkSource;

    fn chunk_source_mut(&mut self) -> &mut dyn ChunkSource;

    fn maybe_throw_error(&self) -> Result<(), LoadError> {
        self.chunk_source().maybe_throw_error()
    }

    /// Cancels background work and returns held buffers to the allocator
    /// before returning. Consumes the stream, so it cannot be used afterwards.
    fn release(self: Box<Self>);
}

/// Everything a new stream is seeded with.
pub struct StreamParams {
    pub id: StreamId,
    pub track_type: TrackType,
    pub chunk_source: Box<dyn ChunkSource>,
    pub allocator: Arc<dyn Allocator>,
    pub position_us: i64,
    pub min_loadable_retry_count: u32,
    pub notifier: LoadingNotifier,
    pub events: EventDispatcher,
}

impl fmt::Debug for StreamParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamParams")
            .field("id", &self.id)
            .field("track_type", &self.track_type)
            .field("position_us", &self.position_us)
            .field("min_loadable_retry_count", &self.min_loadable_retry_count)
            .finish_non_exhaustive()
    }
}

pub trait ChunkStreamFactory: Send + Sync {
    fn create(&self, params: StreamParams) -> Box<dyn ChunkStream>;
}
