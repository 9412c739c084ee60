//! HLS playlist model, the alternate manifest dialect for a period.

pub mod playlist;

pub use playlist::{ByteRange, EncryptionMethod, MediaPlaylist, PlaylistError, PlaylistKind, Segment, SegmentEncryption};
