//! Text dumps of model values, compared against files checked into the test tree.

use std::fmt::{self, Display, Write as _};
use std::fs;
use std::io;
use std::path::PathBuf;

use media_period::hls::MediaPlaylist;
use media_period::{DashPeriod, Position, TrackGroupArray};
use tracing::info;

/// Something that can describe itself to a [`Dumper`].
pub trait Dumpable {
    fn dump(&self, dumper: &mut Dumper);
}

/// Builds an indented `field = value` listing.
#[derive(Debug, Default)]
pub struct Dumper {
    out: String,
    indent: usize,
}

impl Dumper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, value: impl Display) -> &mut Self {
        // Writing into a String cannot fail.
        let _ = writeln!(self.out, "{:indent$}{} = {}", "", field, value, indent = self.indent);
        self
    }

    pub fn add_time(&mut self, field: &str, time_us: Option<i64>) -> &mut Self {
        match time_us {
            Some(us) => self.add(field, us),
            None => self.add(field, "UNSET TIME"),
        }
    }

    pub fn add_position(&mut self, field: &str, position: Position) -> &mut Self {
        match position {
            Position::At(us) => self.add(field, us),
            Position::EndOfSource => self.add(field, "END OF SOURCE"),
        }
    }

    pub fn add_dumpable(&mut self, value: &dyn Dumpable) -> &mut Self {
        value.dump(self);
        self
    }

    pub fn start_block(&mut self, name: &str) -> &mut Self {
        let _ = writeln!(self.out, "{:indent$}{}:", "", name, indent = self.indent);
        self.indent += 2;
        self
    }

    pub fn end_block(&mut self) -> &mut Self {
        self.indent = self.indent.saturating_sub(2);
        self
    }

    pub fn finish(self) -> String {
        self.out
    }
}

impl Display for Dumper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.out)
    }
}

impl Dumpable for TrackGroupArray {
    fn dump(&self, dumper: &mut Dumper) {
        dumper.add("trackGroups", self.len());
        for (group_index, group) in self.iter().enumerate() {
            dumper.start_block(&format!("group {}", group_index));
            for format in group.formats() {
                dumper.add(&format.id, format!("{} {} {}bps", format.mime_type, format.codecs, format.bandwidth));
            }
            dumper.end_block();
        }
    }
}

impl Dumpable for MediaPlaylist {
    fn dump(&self, dumper: &mut Dumper) {
        dumper
            .add("mediaSequence", self.media_sequence())
            .add("targetDuration", self.target_duration_secs())
            .add("version", self.version())
            .add("live", self.is_live())
            .add("liveEvent", self.is_live_event())
            .add_time("duration", Some(self.duration_us()))
            .add("segments", self.segments().len());
        for (index, segment) in self.segments().iter().enumerate() {
            dumper
                .start_block(&format!("segment {}", self.sequence_number(index)))
                .add("url", segment.url())
                .add_time("startTime", Some(segment.start_time_us()))
                .add("discontinuitySequence", segment.discontinuity_sequence());
            if let Some(encryption) = segment.encryption() {
                dumper.add("encryption", format!("{} {}", encryption.method, encryption.key_uri));
            }
            if let Some(range) = segment.byte_range() {
                dumper.add("byteRange", format!("{}@{}", range.length, range.offset));
            }
            dumper.end_block();
        }
    }
}

impl Dumpable for DashPeriod {
    fn dump(&self, dumper: &mut Dumper) {
        dumper
            .add("state", format!("{:?}", self.state()))
            .add_time("start", Some(self.start_us()))
            .add_time("duration", self.duration_us())
            .add_dumpable(self.track_groups())
            .add("activeStreams", self.active_stream_ids().len());
        if let Ok(position) = self.buffered_position_us() {
            dumper.add_position("bufferedPosition", position);
        }
        if let Ok(position) = self.next_load_position_us() {
            dumper.add_position("nextLoadPosition", position);
        }
    }
}

/// Compares dumps with files under `dump_dir`.
///
/// With `write_dump` set the dump is written to the file instead of compared,
/// which is how expected files are produced or refreshed.
#[derive(Debug, Clone)]
pub struct DumpAssertion {
    dump_dir: PathBuf,
    write_dump: bool,
}

impl DumpAssertion {
    pub fn new(dump_dir: impl Into<PathBuf>) -> Self {
        Self {
            dump_dir: dump_dir.into(),
            write_dump: false,
        }
    }

    pub fn write_dump(mut self, write_dump: bool) -> Self {
        self.write_dump = write_dump;
        self
    }

    /// Panics when the dump differs from the expected file.
    pub fn assert_output(&self, value: &dyn Dumpable, dump_file: &str) -> io::Result<()> {
        let mut dumper = Dumper::new();
        dumper.add_dumpable(value);
        let actual = dumper.finish();
        let path = self.dump_dir.join(dump_file);

        if self.write_dump {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, actual)?;
            info!("Wrote dump to {}", path.display());
        } else {
            let expected = fs::read_to_string(&path)?;
            assert_eq!(expected, actual, "dump mismatch for {}", path.display());
        }
        Ok(())
    }
}
