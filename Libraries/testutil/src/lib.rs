//! Fakes and dump helpers for testing `media_period`.

pub mod dump;
pub mod fake;

pub use dump::{DumpAssertion, Dumpable, Dumper};
pub use fake::{
    FakeChunkSource, FakeChunkSourceFactory, FakeChunkStream, FakeChunkStreamFactory, FakeStreamState, PeriodHarness,
};
