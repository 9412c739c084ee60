use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::chunk::StreamId;
use crate::error::LoadError;
use crate::mpd::TrackType;

/// Messages sent upward to the playback driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodNotification {
    /// The period finished preparing and its track groups can be read.
    Prepared,
    /// Loading more data may now be profitable; the driver should call
    /// `continue_loading` again. `stream` is `None` when the request comes
    /// from the period itself (e.g. after a manifest refresh).
    ContinueLoadingRequested { stream: Option<StreamId> },
}

/// Load lifecycle events, for observability only.
#[derive(Debug, Clone)]
pub enum LoadEvent {
    LoadStarted {
        stream: StreamId,
        track_type: TrackType,
        url: String,
        media_start_us: i64,
        media_end_us: i64,
    },
    LoadCompleted {
        stream: StreamId,
        track_type: TrackType,
        url: String,
        bytes_loaded: usize,
        load_duration: Duration,
    },
    LoadCanceled {
        stream: StreamId,
        url: String,
    },
    LoadError {
        stream: StreamId,
        url: String,
        error: LoadError,
        /// Whether the stream will retry the load.
        retrying: bool,
    },
    /// Buffered media was discarded, e.g. after a seek.
    UpstreamDiscarded {
        stream: StreamId,
        media_start_us: i64,
        media_end_us: i64,
    },
}

pub type EventCallback = Arc<dyn Fn(LoadEvent) + Send + Sync>;

/// Forwards [`LoadEvent`]s to an optional listener.
#[derive(Clone, Default)]
pub struct EventDispatcher {
    callback: Option<EventCallback>,
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("callback", &self.callback.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

impl EventDispatcher {
    pub fn new(callback: EventCallback) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    /// A dispatcher without a listener; events are only traced.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn dispatch(&self, event: LoadEvent) {
        match &event {
            LoadEvent::LoadError { stream, url, error, retrying } => {
                warn!("[{}] load of {} failed (retrying: {}): {}", stream, url, retrying, error)
            }
            LoadEvent::LoadStarted { stream, url, .. } => debug!("[{}] load started: {}", stream, url),
            LoadEvent::LoadCompleted { stream, url, bytes_loaded, .. } => {
                debug!("[{}] load completed: {} ({} bytes)", stream, url, bytes_loaded)
            }
            LoadEvent::LoadCanceled { stream, url } => debug!("[{}] load canceled: {}", stream, url),
            LoadEvent::UpstreamDiscarded { stream, media_start_us, media_end_us } => {
                debug!("[{}] discarded {}..{}us", stream, media_start_us, media_end_us)
            }
        }
        if let Some(callback) = &self.callback {
            (callback)(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn forwards_events_to_listener() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let dispatcher = EventDispatcher::new(Arc::new(move |event: LoadEvent| {
            if let LoadEvent::LoadCanceled { url, .. } = event {
                sink.lock().push(url);
            }
        }));

        dispatcher.dispatch(LoadEvent::LoadCanceled {
            stream: StreamId::new(4),
            url: "v0/000000001.m4s".to_string(),
        });
        EventDispatcher::disabled().dispatch(LoadEvent::LoadCanceled {
            stream: StreamId::new(5),
            url: "ignored".to_string(),
        });

        assert_eq!(*seen.lock(), vec!["v0/000000001.m4s".to_string()]);
    }
}
