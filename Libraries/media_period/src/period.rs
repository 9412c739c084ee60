//! The DASH period controller.
//!
//! A [`DashPeriod`] owns one chunk stream per selected track and merges their
//! state into one schedule for the playback driver. It is driven from a single
//! control thread and holds no locks; streams report back through the
//! notification channel given to [`DashPeriod::new`].

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, trace};

use crate::chunk::{ChunkSourceFactory, ChunkStream, ChunkStreamFactory, StreamId, StreamParams};
use crate::config::PeriodConfig;
use crate::error::{LoadError, PeriodError, PeriodResult};
use crate::events::{EventDispatcher, PeriodNotification};
use crate::loader::{CompositeLoader, LoadingNotifier, SequenceableLoader};
use crate::mpd::{DashManifest, Period};
use crate::time::{Position, MICROS_PER_MILLI};
use crate::track::{build_track_groups, TrackGroupArray, TrackSelection};
use crate::upstream::{Allocator, LoaderErrorThrower};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodState {
    Unprepared,
    Prepared,
    Released,
}

/// Collaborators shared by every stream the period creates.
#[derive(Clone)]
pub struct PeriodContext {
    pub chunk_source_factory: Arc<dyn ChunkSourceFactory>,
    pub stream_factory: Arc<dyn ChunkStreamFactory>,
    pub manifest_error_thrower: Arc<dyn LoaderErrorThrower>,
    pub events: EventDispatcher,
    pub config: PeriodConfig,
}

impl fmt::Debug for PeriodContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeriodContext")
            .field("events", &self.events)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// A stream together with the track group it was built for.
pub(crate) struct ActiveStream {
    id: StreamId,
    track_group_index: usize,
    stream: Box<dyn ChunkStream>,
}

impl ActiveStream {
    fn release(self) {
        debug!("[{}] releasing stream of track group {}", self.id, self.track_group_index);
        self.stream.release();
    }
}

impl SequenceableLoader for ActiveStream {
    fn next_load_position_us(&self) -> Position {
        self.stream.next_load_position_us()
    }

    fn continue_loading(&mut self, position_us: i64) -> bool {
        self.stream.continue_loading(position_us)
    }
}

pub struct DashPeriod {
    manifest: Arc<DashManifest>,
    period_index: usize,
    duration_us: Option<i64>,
    track_groups: TrackGroupArray,
    context: PeriodContext,
    notifications: UnboundedSender<PeriodNotification>,
    state: PeriodState,
    allocator: Option<Arc<dyn Allocator>>,
    /// The active streams, in the order of the selections that created them.
    loader: CompositeLoader<ActiveStream>,
    next_stream_id: u64,
}

impl fmt::Debug for DashPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DashPeriod")
            .field("period_index", &self.period_index)
            .field("duration_us", &self.duration_us)
            .field("state", &self.state)
            .field("active_streams", &self.loader.len())
            .finish_non_exhaustive()
    }
}

impl DashPeriod {
    pub fn new(
        manifest: Arc<DashManifest>,
        period_index: usize,
        context: PeriodContext,
        notifications: UnboundedSender<PeriodNotification>,
    ) -> PeriodResult<Self> {
        let period = period_at(&manifest, period_index)?;
        let track_groups = build_track_groups(period);
        let duration_us = manifest.period_duration_us(period_index);

        Ok(Self {
            manifest,
            period_index,
            duration_us,
            track_groups,
            context,
            notifications,
            state: PeriodState::Unprepared,
            allocator: None,
            loader: CompositeLoader::default(),
            next_stream_id: 0,
        })
    }

    /// Captures the allocator for future streams and signals readiness. Track
    /// groups come straight from the manifest, so no asynchronous work is needed.
    pub fn prepare(&mut self, allocator: Arc<dyn Allocator>, position_us: i64) -> PeriodResult<()> {
        match self.state {
            PeriodState::Unprepared => {}
            PeriodState::Prepared => return Err(PeriodError::AlreadyPrepared),
            PeriodState::Released => return Err(PeriodError::Released),
        }

        self.allocator = Some(allocator);
        self.loader = CompositeLoader::default();
        self.state = PeriodState::Prepared;
        info!(
            "Period {} prepared at {}us with {} track groups",
            self.period_index,
            position_us,
            self.track_groups.len()
        );
        self.notify(PeriodNotification::Prepared);
        Ok(())
    }

    /// Relays a pending manifest loading error, without blocking.
    pub fn maybe_throw_prepare_error(&self) -> Result<(), LoadError> {
        self.context.manifest_error_thrower.maybe_throw_error()
    }

    pub fn state(&self) -> PeriodState {
        self.state
    }

    pub fn period_index(&self) -> usize {
        self.period_index
    }

    pub fn manifest(&self) -> &Arc<DashManifest> {
        &self.manifest
    }

    /// Known duration of the period, or `None` for a live (dynamic) manifest.
    pub fn duration_us(&self) -> Option<i64> {
        self.duration_us
    }

    pub fn start_us(&self) -> i64 {
        self.period().start_ms as i64 * MICROS_PER_MILLI
    }

    pub fn track_groups(&self) -> &TrackGroupArray {
        &self.track_groups
    }

    /// Reconciles the active streams with `selections`.
    ///
    /// `selections` is the complete set of tracks the caller wants, each naming
    /// its track group by position. An active stream is kept when its id is
    /// listed in `retained` and one of the selections still names its track
    /// group; every other active stream is released before any new stream is
    /// built. Returns, for each selection in order, the id of the stream now
    /// backing it.
    pub fn select_tracks(
        &mut self,
        retained: &[StreamId],
        selections: &[Arc<dyn TrackSelection>],
        position_us: i64,
    ) -> PeriodResult<Vec<StreamId>> {
        self.ensure_prepared()?;
        let allocator = self.allocator.clone().ok_or(PeriodError::NotPrepared)?;

        let mut group_indices = Vec::with_capacity(selections.len());
        for selection in selections {
            // Routing is by position; the group itself must still match so a
            // selection made against another period is caught.
            let group_index = selection.track_group_index();
            if self.track_groups.get(group_index) != Some(selection.track_group()) {
                return Err(PeriodError::UnknownTrackGroup {
                    period_index: self.period_index,
                });
            }
            if group_indices.contains(&group_index) {
                return Err(PeriodError::DuplicateTrackGroup(group_index));
            }
            group_indices.push(group_index);
        }

        let mut backing: Vec<Option<ActiveStream>> = selections.iter().map(|_| None).collect();
        let mut released = 0;
        for active in std::mem::take(&mut self.loader).into_loaders() {
            let slot = group_indices
                .iter()
                .position(|group_index| *group_index == active.track_group_index);
            match slot {
                Some(slot) if retained.contains(&active.id) && backing[slot].is_none() => {
                    backing[slot] = Some(active);
                }
                _ => {
                    active.release();
                    released += 1;
                }
            }
        }

        let kept = backing.iter().filter(|slot| slot.is_some()).count();
        let mut streams = Vec::with_capacity(selections.len());
        for ((slot, selection), group_index) in backing.into_iter().zip(selections).zip(&group_indices) {
            let active = match slot {
                Some(active) => active,
                None => self.build_stream(*group_index, selection.clone(), &allocator, position_us),
            };
            streams.push(active);
        }

        let ids = streams.iter().map(|active| active.id).collect();
        self.loader = CompositeLoader::new(streams);
        info!(
            "Selected {} tracks at {}us (kept {}, created {}, released {})",
            selections.len(),
            position_us,
            kept,
            selections.len() - kept,
            released
        );
        Ok(ids)
    }

    pub fn continue_loading(&mut self, position_us: i64) -> PeriodResult<bool> {
        self.ensure_prepared()?;
        Ok(self.loader.continue_loading(position_us))
    }

    pub fn next_load_position_us(&self) -> PeriodResult<Position> {
        self.ensure_prepared()?;
        Ok(self.loader.next_load_position_us())
    }

    /// The minimum buffered position over all streams that have not reached
    /// the end of the source. A finished stream never holds playback back.
    pub fn buffered_position_us(&self) -> PeriodResult<Position> {
        self.ensure_prepared()?;
        Ok(self
            .loader
            .iter()
            .map(|active| active.stream.buffered_position_us())
            .min()
            .unwrap_or(Position::EndOfSource))
    }

    /// Forwards the seek to every stream and returns `position_us` unchanged.
    pub fn seek_to_us(&mut self, position_us: i64) -> PeriodResult<i64> {
        self.ensure_prepared()?;
        for active in self.loader.iter_mut() {
            active.stream.seek_to_us(position_us);
        }
        debug!("Seeked {} streams to {}us", self.loader.len(), position_us);
        Ok(position_us)
    }

    /// Discontinuities are detected by the renderers, never at this layer.
    pub fn read_discontinuity(&self) -> PeriodResult<Option<i64>> {
        self.ensure_prepared()?;
        Ok(None)
    }

    /// Swaps in a refreshed manifest. Active streams keep running; their
    /// chunk sources are pointed at the new manifest and the driver is asked
    /// to continue loading, since new segments may be available.
    pub fn update_manifest(&mut self, manifest: Arc<DashManifest>, period_index: usize) -> PeriodResult<()> {
        if self.state == PeriodState::Released {
            return Err(PeriodError::Released);
        }
        let period = period_at(&manifest, period_index)?;
        self.track_groups = build_track_groups(period);
        self.duration_us = manifest.period_duration_us(period_index);
        self.manifest = manifest;
        self.period_index = period_index;

        if self.loader.is_empty() {
            trace!("Manifest updated for period {} with no active streams", period_index);
            return Ok(());
        }
        for active in self.loader.iter_mut() {
            active
                .stream
                .chunk_source_mut()
                .update_manifest(self.manifest.clone(), period_index);
        }
        info!(
            "Manifest updated for period {}, refreshed {} streams",
            period_index,
            self.loader.len()
        );
        self.notify(PeriodNotification::ContinueLoadingRequested { stream: None });
        Ok(())
    }

    /// Releases every active stream and the allocator. Calling it again is a no-op.
    pub fn release(&mut self) {
        if self.state == PeriodState::Released {
            return;
        }
        let streams = std::mem::take(&mut self.loader).into_loaders();
        let count = streams.len();
        for active in streams {
            active.release();
        }
        self.allocator = None;
        self.state = PeriodState::Released;
        info!("Period {} released ({} streams)", self.period_index, count);
    }

    pub fn active_stream_ids(&self) -> Vec<StreamId> {
        self.loader.iter().map(|active| active.id).collect()
    }

    pub fn stream(&self, id: StreamId) -> PeriodResult<&dyn ChunkStream> {
        self.loader
            .iter()
            .find(|active| active.id == id)
            .map(|active| active.stream.as_ref())
            .ok_or(PeriodError::UnknownStream(id))
    }

    pub fn stream_mut(&mut self, id: StreamId) -> PeriodResult<&mut (dyn ChunkStream + 'static)> {
        self.loader
            .iter_mut()
            .find(|active| active.id == id)
            .map(|active| active.stream.as_mut())
            .ok_or(PeriodError::UnknownStream(id))
    }

    fn build_stream(
        &mut self,
        group_index: usize,
        selection: Arc<dyn TrackSelection>,
        allocator: &Arc<dyn Allocator>,
        position_us: i64,
    ) -> ActiveStream {
        let track_type = self.period().adaptation_sets[group_index].track_type;
        let chunk_source = self.context.chunk_source_factory.create(
            self.context.manifest_error_thrower.clone(),
            self.manifest.clone(),
            self.period_index,
            group_index,
            selection,
            self.context.config.elapsed_realtime_offset_ms,
        );

        let id = StreamId::new(self.next_stream_id);
        self.next_stream_id += 1;
        let stream = self.context.stream_factory.create(StreamParams {
            id,
            track_type,
            chunk_source,
            allocator: allocator.clone(),
            position_us,
            min_loadable_retry_count: self.context.config.min_loadable_retry_count,
            notifier: LoadingNotifier::new(id, self.notifications.clone()),
            events: self.context.events.clone(),
        });
        debug!("[{}] created {:?} stream for track group {} at {}us", id, track_type, group_index, position_us);

        ActiveStream {
            id,
            track_group_index: group_index,
            stream,
        }
    }

    fn period(&self) -> &Period {
        // The index is validated whenever the manifest or index changes.
        &self.manifest.periods[self.period_index]
    }

    fn ensure_prepared(&self) -> PeriodResult<()> {
        match self.state {
            PeriodState::Prepared => Ok(()),
            PeriodState::Unprepared => Err(PeriodError::NotPrepared),
            PeriodState::Released => Err(PeriodError::Released),
        }
    }

    fn notify(&self, notification: PeriodNotification) {
        if self.notifications.send(notification).is_err() {
            trace!("Driver is gone, dropping {:?}", notification);
        }
    }
}

impl Drop for DashPeriod {
    fn drop(&mut self) {
        self.release();
    }
}

fn period_at(manifest: &DashManifest, index: usize) -> PeriodResult<&Period> {
    manifest.period(index).ok_or(PeriodError::PeriodOutOfRange {
        index,
        count: manifest.period_count(),
    })
}
