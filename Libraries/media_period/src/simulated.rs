//! Chunk sources and streams that pretend to fetch segments.
//!
//! A load is a tokio task that sleeps for the configured delay and then fills
//! one allocator buffer. Nothing goes over the network.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use chrono::Utc;
use media_period::time::{secs_to_us, MICROS_PER_MILLI};
use media_period::{
    Allocator, ChunkRequest, ChunkSource, ChunkSourceFactory, ChunkStream, ChunkStreamFactory, DashManifest,
    EventDispatcher, LoadError, LoadEvent, LoaderErrorThrower, LoadingNotifier, NextChunk, Position, Representation,
    SequenceableLoader, StreamId, StreamParams, TrackSelection, TrackType,
};
use parking_lot::Mutex;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

pub struct SimulatedChunkSource {
    manifest_error_thrower: Arc<dyn LoaderErrorThrower>,
    manifest: Arc<DashManifest>,
    period_index: usize,
    adaptation_set_index: usize,
    selection: Arc<dyn TrackSelection>,
    elapsed_realtime_offset_ms: i64,
}

impl SimulatedChunkSource {
    fn representation(&self) -> Option<&Representation> {
        self.manifest
            .period(self.period_index)?
            .adaptation_sets
            .get(self.adaptation_set_index)?
            .representations
            .get(self.selection.selected_index())
    }

    /// Segments published so far in a live manifest, `None` when the whole
    /// timeline is available.
    fn published_segments(&self, segment_duration_us: i64) -> Option<u64> {
        if !self.manifest.dynamic {
            return None;
        }
        let availability_start = self.manifest.availability_start_time?;
        let period_start_ms = self.manifest.period(self.period_index)?.start_ms as i64;
        let now_ms = Utc::now().timestamp_millis() + self.elapsed_realtime_offset_ms;
        let elapsed_us = (now_ms - availability_start.timestamp_millis() - period_start_ms) * MICROS_PER_MILLI;
        Some((elapsed_us.max(0) / segment_duration_us) as u64)
    }
}

impl ChunkSource for SimulatedChunkSource {
    fn next_chunk(&mut self, position_us: i64) -> NextChunk {
        let Some(representation) = self.representation() else {
            return NextChunk::EndOfStream;
        };
        let segment_duration_us = secs_to_us(representation.segment_duration);
        if segment_duration_us <= 0 {
            return NextChunk::EndOfStream;
        }

        let period_duration_us = self.manifest.period_duration_us(self.period_index);
        if period_duration_us.is_some_and(|duration_us| position_us >= duration_us) {
            return NextChunk::EndOfStream;
        }
        let segment_number = (position_us.max(0) / segment_duration_us) as u64;
        if self
            .published_segments(segment_duration_us)
            .is_some_and(|published| segment_number >= published)
        {
            return NextChunk::NotYetAvailable;
        }

        let start_us = segment_number as i64 * segment_duration_us;
        let end_us = start_us + segment_duration_us;
        NextChunk::Load(ChunkRequest {
            url: representation
                .media
                .replace("$Number%09d$", &format!("{:09}", segment_number)),
            segment_number,
            start_us,
            end_us: period_duration_us.map_or(end_us, |duration_us| end_us.min(duration_us)),
        })
    }

    fn update_manifest(&mut self, manifest: Arc<DashManifest>, period_index: usize) {
        self.manifest = manifest;
        self.period_index = period_index;
    }

    fn maybe_throw_error(&self) -> Result<(), LoadError> {
        self.manifest_error_thrower.maybe_throw_error()
    }
}

#[derive(Debug, Default)]
pub struct SimulatedChunkSourceFactory;

impl ChunkSourceFactory for SimulatedChunkSourceFactory {
    fn create(
        &self,
        manifest_error_thrower: Arc<dyn LoaderErrorThrower>,
        manifest: Arc<DashManifest>,
        period_index: usize,
        adaptation_set_index: usize,
        selection: Arc<dyn TrackSelection>,
        elapsed_realtime_offset_ms: i64,
    ) -> Box<dyn ChunkSource> {
        Box::new(SimulatedChunkSource {
            manifest_error_thrower,
            manifest,
            period_index,
            adaptation_set_index,
            selection,
            elapsed_realtime_offset_ms,
        })
    }
}

#[derive(Debug, Default)]
struct LoadState {
    /// Bumped on seek and release so that late loads are dropped.
    generation: u64,
    /// End of the chunk being loaded, if any.
    loading_until_us: Option<i64>,
    buffered_until_us: i64,
    ended: bool,
    error: Option<LoadError>,
    /// Loaded chunks by end time, oldest first.
    held: VecDeque<(i64, BytesMut)>,
}

impl LoadState {
    fn take_held(&mut self) -> Vec<BytesMut> {
        self.held.drain(..).map(|(_, buffer)| buffer).collect()
    }
}

pub struct SimulatedChunkStream {
    id: StreamId,
    track_type: TrackType,
    chunk_source: Box<dyn ChunkSource>,
    allocator: Arc<dyn Allocator>,
    notifier: LoadingNotifier,
    events: EventDispatcher,
    min_loadable_retry_count: u32,
    load_delay: Duration,
    fail_every: Option<u64>,
    cancellation_token: CancellationToken,
    state: Arc<Mutex<LoadState>>,
}

impl SimulatedChunkStream {
    /// Returns chunks that playback has moved past to the allocator.
    fn discard_played(&self, position_us: i64) {
        let played: Vec<BytesMut> = {
            let mut state = self.state.lock();
            let count = state.held.iter().take_while(|(end_us, _)| *end_us <= position_us).count();
            state.held.drain(..count).map(|(_, buffer)| buffer).collect()
        };
        if !played.is_empty() {
            trace!("[{}] returning {} played chunks", self.id, played.len());
            self.allocator.release_all(played);
        }
    }
}

impl SequenceableLoader for SimulatedChunkStream {
    fn next_load_position_us(&self) -> Position {
        let state = self.state.lock();
        if state.ended {
            Position::EndOfSource
        } else {
            Position::At(state.loading_until_us.unwrap_or(state.buffered_until_us))
        }
    }

    fn continue_loading(&mut self, position_us: i64) -> bool {
        self.discard_played(position_us);
        let (buffered_until_us, generation) = {
            let state = self.state.lock();
            if state.ended || state.loading_until_us.is_some() {
                return false;
            }
            (state.buffered_until_us, state.generation)
        };

        let request = match self.chunk_source.next_chunk(buffered_until_us) {
            NextChunk::Load(request) => request,
            NextChunk::NotYetAvailable => {
                trace!("[{}] chunk after {}us not published yet", self.id, buffered_until_us);
                return false;
            }
            NextChunk::EndOfStream => {
                debug!("[{}] reached the end of the stream at {}us", self.id, buffered_until_us);
                self.state.lock().ended = true;
                return false;
            }
        };

        self.state.lock().loading_until_us = Some(request.end_us);
        self.events.dispatch(LoadEvent::LoadStarted {
            stream: self.id,
            track_type: self.track_type,
            url: request.url.clone(),
            media_start_us: request.start_us,
            media_end_us: request.end_us,
        });

        let fails_first_attempt = self
            .fail_every
            .is_some_and(|every| every > 0 && request.segment_number % every == every - 1);
        let task = LoadTask {
            id: self.id,
            track_type: self.track_type,
            request,
            generation,
            fails_first_attempt,
            min_loadable_retry_count: self.min_loadable_retry_count,
            load_delay: self.load_delay,
            allocator: self.allocator.clone(),
            notifier: self.notifier.clone(),
            events: self.events.clone(),
            state: self.state.clone(),
        };
        tokio::spawn(task.run(self.cancellation_token.clone()));
        true
    }
}

impl ChunkStream for SimulatedChunkStream {
    fn buffered_position_us(&self) -> Position {
        let state = self.state.lock();
        if state.ended {
            Position::EndOfSource
        } else {
            Position::At(state.buffered_until_us)
        }
    }

    fn seek_to_us(&mut self, position_us: i64) {
        self.cancellation_token.cancel();
        self.cancellation_token = CancellationToken::new();
        let (discarded, previous_end_us) = {
            let mut state = self.state.lock();
            state.generation += 1;
            state.loading_until_us = None;
            state.ended = false;
            state.error = None;
            let previous_end_us = state.buffered_until_us;
            state.buffered_until_us = position_us;
            (state.take_held(), previous_end_us)
        };
        self.allocator.release_all(discarded);
        self.events.dispatch(LoadEvent::UpstreamDiscarded {
            stream: self.id,
            media_start_us: position_us,
            media_end_us: previous_end_us,
        });
    }

    fn chunk_source(&self) -> &dyn ChunkSource {
        self.chunk_source.as_ref()
    }

    fn chunk_source_mut(&mut self) -> &mut dyn ChunkSource {
        self.chunk_source.as_mut()
    }

    fn maybe_throw_error(&self) -> Result<(), LoadError> {
        if let Some(error) = self.state.lock().error.clone() {
            return Err(error);
        }
        self.chunk_source.maybe_throw_error()
    }

    fn release(self: Box<Self>) {
        self.cancellation_token.cancel();
        let held = {
            let mut state = self.state.lock();
            state.generation += 1;
            state.loading_until_us = None;
            state.take_held()
        };
        debug!("[{}] released, returning {} buffers", self.id, held.len());
        self.allocator.release_all(held);
    }
}

/// One chunk load running on the tokio runtime.
struct LoadTask {
    id: StreamId,
    track_type: TrackType,
    request: ChunkRequest,
    generation: u64,
    fails_first_attempt: bool,
    min_loadable_retry_count: u32,
    load_delay: Duration,
    allocator: Arc<dyn Allocator>,
    notifier: LoadingNotifier,
    events: EventDispatcher,
    state: Arc<Mutex<LoadState>>,
}

impl LoadTask {
    async fn run(self, cancellation_token: CancellationToken) {
        let started = Instant::now();
        let mut attempt = 0;
        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    self.events.dispatch(LoadEvent::LoadCanceled {
                        stream: self.id,
                        url: self.request.url.clone(),
                    });
                    return;
                }
                _ = sleep(self.load_delay) => {}
            }
            if !(self.fails_first_attempt && attempt == 0) {
                break;
            }

            let error = LoadError::Chunk {
                url: self.request.url.clone(),
                reason: "simulated failure".to_string(),
            };
            let retrying = attempt < self.min_loadable_retry_count;
            self.events.dispatch(LoadEvent::LoadError {
                stream: self.id,
                url: self.request.url.clone(),
                error: error.clone(),
                retrying,
            });
            if !retrying {
                let mut state = self.state.lock();
                if state.generation == self.generation {
                    state.loading_until_us = None;
                    state.error = Some(error);
                }
                return;
            }
            attempt += 1;
        }

        let buffer = self.allocator.allocate();
        let bytes_loaded = buffer.len();
        let mut buffer = Some(buffer);
        {
            let mut state = self.state.lock();
            if state.generation == self.generation {
                if let Some(buffer) = buffer.take() {
                    state.held.push_back((self.request.end_us, buffer));
                }
                state.buffered_until_us = self.request.end_us;
                state.loading_until_us = None;
            }
        }
        if let Some(stale) = buffer {
            trace!("[{}] dropping stale load of {}", self.id, self.request.url);
            self.allocator.release(stale);
            return;
        }

        self.events.dispatch(LoadEvent::LoadCompleted {
            stream: self.id,
            track_type: self.track_type,
            url: self.request.url.clone(),
            bytes_loaded,
            load_duration: started.elapsed(),
        });
        self.notifier.request_continue_loading();
    }
}

#[derive(Debug)]
pub struct SimulatedStreamFactory {
    load_delay: Duration,
    fail_every: Option<u64>,
}

impl SimulatedStreamFactory {
    pub fn new(load_delay: Duration, fail_every: Option<u64>) -> Self {
        Self { load_delay, fail_every }
    }
}

impl ChunkStreamFactory for SimulatedStreamFactory {
    fn create(&self, params: StreamParams) -> Box<dyn ChunkStream> {
        Box::new(SimulatedChunkStream {
            id: params.id,
            track_type: params.track_type,
            chunk_source: params.chunk_source,
            allocator: params.allocator,
            notifier: params.notifier,
            events: params.events,
            min_loadable_retry_count: params.min_loadable_retry_count,
            load_delay: self.load_delay,
            fail_every: self.fail_every,
            cancellation_token: CancellationToken::new(),
            state: Arc::new(Mutex::new(LoadState {
                buffered_until_us: params.position_us,
                ..LoadState::default()
            })),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use media_period::mpd::builder::ManifestBuilder;
    use media_period::{build_track_groups, FixedTrackSelection, Format, NoErrors};

    fn source(manifest: DashManifest) -> Box<dyn ChunkSource> {
        let groups = build_track_groups(&manifest.periods[0]);
        let selection = Arc::new(FixedTrackSelection::from_groups(&groups, 0, 0).unwrap());
        SimulatedChunkSourceFactory.create(Arc::new(NoErrors), Arc::new(manifest), 0, 0, selection, 0)
    }

    fn builder(builder: ManifestBuilder) -> DashManifest {
        builder
            .segment_duration(2, 1)
            .add_adaptation_set(TrackType::Video)
            .add_representation(Format::new("v", "video/mp4", "avc1", 1_000))
            .build()
            .unwrap()
    }

    #[test]
    fn on_demand_chunks_end_with_the_period() {
        let mut source = source(builder(ManifestBuilder::on_demand(5_000)));

        let NextChunk::Load(first) = source.next_chunk(0) else {
            panic!("expected a chunk");
        };
        assert_eq!(first.url, "v/000000000.m4s");
        assert_eq!((first.start_us, first.end_us), (0, 2_000_000));

        let NextChunk::Load(last) = source.next_chunk(4_000_000) else {
            panic!("expected a chunk");
        };
        assert_eq!(last.segment_number, 2);
        assert_eq!(last.end_us, 5_000_000);

        assert_eq!(source.next_chunk(5_000_000), NextChunk::EndOfStream);
    }

    #[test]
    fn live_chunks_wait_for_publication() {
        let start = Utc::now() - chrono::Duration::seconds(5);
        let mut source = source(builder(ManifestBuilder::live().availability_start(start)));

        assert!(matches!(source.next_chunk(0), NextChunk::Load(_)));
        assert!(matches!(source.next_chunk(2_000_000), NextChunk::Load(_)));
        assert_eq!(source.next_chunk(60_000_000), NextChunk::NotYetAvailable);
    }
}
