pub mod chunk;
pub mod config;
pub mod error;
pub mod events;
pub mod hls;
pub mod loader;
pub mod mpd;
pub mod period;
pub mod time;
pub mod track;
pub mod upstream;

pub use chunk::{ChunkRequest, ChunkSource, ChunkSourceFactory, ChunkStream, ChunkStreamFactory, NextChunk, StreamId, StreamParams};
pub use config::PeriodConfig;
pub use error::{LoadError, ManifestError, PeriodError, PeriodResult};
pub use events::{EventCallback, EventDispatcher, LoadEvent, PeriodNotification};
pub use loader::{CompositeLoader, LoadingNotifier, SequenceableLoader};
pub use mpd::{AdaptationSet, DashManifest, Format, Period, Representation, TrackType};
pub use period::{DashPeriod, PeriodContext, PeriodState};
pub use time::Position;
pub use track::{build_track_groups, FixedTrackSelection, TrackGroup, TrackGroupArray, TrackSelection};
pub use upstream::{Allocator, DefaultAllocator, LoaderErrorThrower, ManifestErrorSlot, NoErrors};
