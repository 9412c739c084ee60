//! Merging several independent loaders into one load schedule.

use tokio::sync::mpsc::UnboundedSender;
use tracing::trace;

use crate::chunk::StreamId;
use crate::events::PeriodNotification;
use crate::time::Position;

/// A loader that can be asked to load its next unit of work.
pub trait SequenceableLoader {
    /// Earliest position at which this loader still has work, or
    /// `EndOfSource` once it has nothing left to load.
    fn next_load_position_us(&self) -> Position;

    /// Dispatches the next unit of work if there is one. Returns whether
    /// anything was dispatched. Never blocks on the work itself.
    fn continue_loading(&mut self, position_us: i64) -> bool;
}

impl<L: SequenceableLoader + ?Sized> SequenceableLoader for Box<L> {
    fn next_load_position_us(&self) -> Position {
        (**self).next_load_position_us()
    }

    fn continue_loading(&mut self, position_us: i64) -> bool {
        (**self).continue_loading(position_us)
    }
}

/// Schedules a fixed set of loaders, always feeding the one furthest behind.
///
/// The set is owned and never patched: a change of loaders means building a
/// new `CompositeLoader` from [`into_loaders`](Self::into_loaders).
#[derive(Debug)]
pub struct CompositeLoader<L> {
    loaders: Vec<L>,
}

impl<L> Default for CompositeLoader<L> {
    fn default() -> Self {
        Self { loaders: Vec::new() }
    }
}

impl<L: SequenceableLoader> CompositeLoader<L> {
    pub fn new(loaders: Vec<L>) -> Self {
        Self { loaders }
    }

    /// Asks only the loader with the earliest next load position (lowest
    /// index on ties) to continue. Exhausted loaders are never picked.
    pub fn continue_loading(&mut self, position_us: i64) -> bool {
        let Some((next_load_position_us, index)) = self
            .loaders
            .iter()
            .enumerate()
            .filter_map(|(index, loader)| {
                loader
                    .next_load_position_us()
                    .us()
                    .map(|position| (position, index))
            })
            .min()
        else {
            return false;
        };

        let dispatched = self.loaders[index].continue_loading(position_us);
        trace!(
            "Loader {} (next load at {}us) asked to continue at {}us, dispatched: {}",
            index,
            next_load_position_us,
            position_us,
            dispatched
        );
        dispatched
    }

    pub fn next_load_position_us(&self) -> Position {
        self.loaders
            .iter()
            .map(SequenceableLoader::next_load_position_us)
            .min()
            .unwrap_or(Position::EndOfSource)
    }
}

impl<L> CompositeLoader<L> {
    pub fn len(&self) -> usize {
        self.loaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, L> {
        self.loaders.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, L> {
        self.loaders.iter_mut()
    }

    pub fn into_loaders(self) -> Vec<L> {
        self.loaders
    }
}

/// Handed to each stream so it can ask for more loading once a unit of work
/// completes. Requests travel up one channel to the playback driver, in the
/// order each stream sends them.
#[derive(Debug, Clone)]
pub struct LoadingNotifier {
    stream: StreamId,
    sender: UnboundedSender<PeriodNotification>,
}

impl LoadingNotifier {
    pub fn new(stream: StreamId, sender: UnboundedSender<PeriodNotification>) -> Self {
        Self { stream, sender }
    }

    pub fn stream(&self) -> StreamId {
        self.stream
    }

    /// Safe to call from any thread or task.
    pub fn request_continue_loading(&self) {
        let notification = PeriodNotification::ContinueLoadingRequested {
            stream: Some(self.stream),
        };
        if self.sender.send(notification).is_err() {
            trace!("[{}] driver is gone, dropping continue-loading request", self.stream);
        }
    }
}
