//! Scriptable stand-ins for the collaborators of a `DashPeriod`.

use std::sync::Arc;

use bytes::BytesMut;
use media_period::loader::LoadingNotifier;
use media_period::mpd::{DashManifest, TrackType};
use media_period::track::FixedTrackSelection;
use media_period::{
    Allocator, ChunkSource, ChunkSourceFactory, ChunkStream, ChunkStreamFactory, DashPeriod, DefaultAllocator,
    EventDispatcher, LoaderErrorThrower, ManifestErrorSlot, NextChunk, PeriodConfig, PeriodContext, PeriodNotification, Position,
    SequenceableLoader, StreamId, StreamParams, TrackSelection,
};
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver};

/// What a fake chunk source has been asked to do.
#[derive(Debug)]
pub struct FakeSourceState {
    pub adaptation_set_index: usize,
    pub period_index: usize,
    pub selected_format_id: Option<String>,
    pub elapsed_realtime_offset_ms: i64,
    pub manifest: Arc<DashManifest>,
    pub manifest_updates: usize,
}

pub struct FakeChunkSource {
    state: Arc<Mutex<FakeSourceState>>,
}

impl ChunkSource for FakeChunkSource {
    fn next_chunk(&mut self, _position_us: i64) -> NextChunk {
        NextChunk::NotYetAvailable
    }

    fn update_manifest(&mut self, manifest: Arc<DashManifest>, period_index: usize) {
        let mut state = self.state.lock();
        state.manifest = manifest;
        state.period_index = period_index;
        state.manifest_updates += 1;
    }
}

/// Records every chunk source it creates, in creation order.
#[derive(Default)]
pub struct FakeChunkSourceFactory {
    sources: Mutex<Vec<Arc<Mutex<FakeSourceState>>>>,
}

impl FakeChunkSourceFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created_count(&self) -> usize {
        self.sources.lock().len()
    }

    pub fn source(&self, index: usize) -> Arc<Mutex<FakeSourceState>> {
        self.sources.lock()[index].clone()
    }
}

impl ChunkSourceFactory for FakeChunkSourceFactory {
    fn create(
        &self,
        _manifest_error_thrower: Arc<dyn LoaderErrorThrower>,
        manifest: Arc<DashManifest>,
        period_index: usize,
        adaptation_set_index: usize,
        selection: Arc<dyn TrackSelection>,
        elapsed_realtime_offset_ms: i64,
    ) -> Box<dyn ChunkSource> {
        let state = Arc::new(Mutex::new(FakeSourceState {
            adaptation_set_index,
            period_index,
            selected_format_id: selection.selected_format().map(|format| format.id.clone()),
            elapsed_realtime_offset_ms,
            manifest,
            manifest_updates: 0,
        }));
        self.sources.lock().push(state.clone());
        Box::new(FakeChunkSource { state })
    }
}

/// Scripted positions plus a record of every call a fake stream received.
#[derive(Debug)]
pub struct FakeStreamState {
    pub id: StreamId,
    pub track_type: TrackType,
    pub initial_position_us: i64,
    pub min_loadable_retry_count: u32,
    pub buffered_position: Position,
    pub next_load_position: Position,
    /// Whether `continue_loading` reports dispatched work.
    pub dispatches_work: bool,
    pub continue_loading_calls: Vec<i64>,
    pub seeks: Vec<i64>,
    pub releases: usize,
    /// Lets a test play the part of a completed background load.
    pub notifier: LoadingNotifier,
}

pub struct FakeChunkStream {
    state: Arc<Mutex<FakeStreamState>>,
    chunk_source: Box<dyn ChunkSource>,
    allocator: Arc<dyn Allocator>,
    held: Vec<BytesMut>,
}

impl SequenceableLoader for FakeChunkStream {
    fn next_load_position_us(&self) -> Position {
        self.state.lock().next_load_position
    }

    fn continue_loading(&mut self, position_us: i64) -> bool {
        let dispatched = {
            let mut state = self.state.lock();
            state.continue_loading_calls.push(position_us);
            state.dispatches_work
        };
        if dispatched {
            self.held.push(self.allocator.allocate());
        }
        dispatched
    }
}

impl ChunkStream for FakeChunkStream {
    fn buffered_position_us(&self) -> Position {
        self.state.lock().buffered_position
    }

    fn seek_to_us(&mut self, position_us: i64) {
        self.state.lock().seeks.push(position_us);
    }

    fn chunk_source(&self) -> &dyn ChunkSource {
        self.chunk_source.as_ref()
    }

    fn chunk_source_mut(&mut self) -> &mut dyn ChunkSource {
        self.chunk_source.as_mut()
    }

    fn release(mut self: Box<Self>) {
        self.state.lock().releases += 1;
        let held = std::mem::take(&mut self.held);
        self.allocator.release_all(held);
    }
}

/// Creates [`FakeChunkStream`]s and keeps a handle on each one's state.
#[derive(Default)]
pub struct FakeChunkStreamFactory {
    streams: Mutex<Vec<Arc<Mutex<FakeStreamState>>>>,
}

impl FakeChunkStreamFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created_count(&self) -> usize {
        self.streams.lock().len()
    }

    /// State of the stream with `id`. Panics if no such stream was created.
    pub fn state(&self, id: StreamId) -> Arc<Mutex<FakeStreamState>> {
        self.streams
            .lock()
            .iter()
            .find(|state| state.lock().id == id)
            .cloned()
            .unwrap_or_else(|| panic!("no fake stream {}", id))
    }

    pub fn total_releases(&self) -> usize {
        self.streams.lock().iter().map(|state| state.lock().releases).sum()
    }
}

impl ChunkStreamFactory for FakeChunkStreamFactory {
    fn create(&self, params: StreamParams) -> Box<dyn ChunkStream> {
        let state = Arc::new(Mutex::new(FakeStreamState {
            id: params.id,
            track_type: params.track_type,
            initial_position_us: params.position_us,
            min_loadable_retry_count: params.min_loadable_retry_count,
            buffered_position: Position::At(params.position_us),
            next_load_position: Position::At(params.position_us),
            dispatches_work: true,
            continue_loading_calls: vec![],
            seeks: vec![],
            releases: 0,
            notifier: params.notifier,
        }));
        self.streams.lock().push(state.clone());
        Box::new(FakeChunkStream {
            state,
            chunk_source: params.chunk_source,
            allocator: params.allocator,
            held: vec![],
        })
    }
}

/// A `DashPeriod` wired to fakes, with the driver's end of the notification channel.
pub struct PeriodHarness {
    pub period: DashPeriod,
    pub streams: Arc<FakeChunkStreamFactory>,
    pub sources: Arc<FakeChunkSourceFactory>,
    pub allocator: Arc<DefaultAllocator>,
    pub manifest_errors: Arc<ManifestErrorSlot>,
    pub notifications: UnboundedReceiver<PeriodNotification>,
}

impl PeriodHarness {
    pub fn new(manifest: Arc<DashManifest>, period_index: usize, config: PeriodConfig) -> Self {
        let streams = Arc::new(FakeChunkStreamFactory::new());
        let sources = Arc::new(FakeChunkSourceFactory::new());
        let manifest_errors = Arc::new(ManifestErrorSlot::new());
        let (sender, notifications) = mpsc::unbounded_channel();
        let context = PeriodContext {
            chunk_source_factory: sources.clone(),
            stream_factory: streams.clone(),
            manifest_error_thrower: manifest_errors.clone(),
            events: EventDispatcher::disabled(),
            config,
        };
        let period = DashPeriod::new(manifest, period_index, context, sender)
            .unwrap_or_else(|error| panic!("cannot build period: {}", error));

        Self {
            period,
            streams,
            sources,
            allocator: Arc::new(DefaultAllocator::new(256)),
            manifest_errors,
            notifications,
        }
    }

    /// A harness whose period is already prepared, with the `Prepared`
    /// notification consumed.
    pub fn prepared(manifest: Arc<DashManifest>) -> Self {
        let mut harness = Self::new(manifest, 0, PeriodConfig::default());
        harness
            .period
            .prepare(harness.allocator.clone(), 0)
            .unwrap_or_else(|error| panic!("cannot prepare period: {}", error));
        assert_eq!(harness.drain_notifications(), vec![PeriodNotification::Prepared]);
        harness
    }

    /// A fixed selection of `format_index` within the period's group `group_index`.
    pub fn selection(&self, group_index: usize, format_index: usize) -> Arc<dyn TrackSelection> {
        Arc::new(
            FixedTrackSelection::from_groups(self.period.track_groups(), group_index, format_index)
                .unwrap_or_else(|| panic!("no format {} in track group {}", format_index, group_index)),
        )
    }

    pub fn stream(&self, id: StreamId) -> Arc<Mutex<FakeStreamState>> {
        self.streams.state(id)
    }

    pub fn drain_notifications(&mut self) -> Vec<PeriodNotification> {
        let mut drained = vec![];
        while let Ok(notification) = self.notifications.try_recv() {
            drained.push(notification);
        }
        drained
    }
}
