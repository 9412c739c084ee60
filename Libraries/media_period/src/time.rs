//! Playback positions shared by the period, the scheduler and the streams.

use std::fmt;

pub const MICROS_PER_SECOND: i64 = 1_000_000;
pub const MICROS_PER_MILLI: i64 = 1_000;

/// A position on the media timeline, or the end of the source.
///
/// Used both for buffered positions and for next-load positions. The ordering
/// puts `EndOfSource` after every concrete position, so taking the minimum over
/// a set of streams skips finished streams without any special casing and
/// yields `EndOfSource` only when every stream is finished (or there are none).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Position {
    /// A position in microseconds.
    At(i64),
    /// Everything up to the end of the source has been buffered (or there is
    /// nothing left to load).
    EndOfSource,
}

impl Position {
    pub fn us(self) -> Option<i64> {
        match self {
            Position::At(us) => Some(us),
            Position::EndOfSource => None,
        }
    }

    pub fn is_end_of_source(self) -> bool {
        matches!(self, Position::EndOfSource)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Position::At(us) => write!(f, "{}us", us),
            Position::EndOfSource => f.write_str("end-of-source"),
        }
    }
}

/// Converts fractional seconds to whole microseconds, truncating like an integer cast.
pub fn secs_to_us(secs: f64) -> i64 {
    (secs * MICROS_PER_SECOND as f64) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_of_source_sorts_after_every_position() {
        assert!(Position::At(i64::MAX) < Position::EndOfSource);
        let positions = [Position::At(20), Position::EndOfSource, Position::At(10)];
        assert_eq!(positions.iter().min(), Some(&Position::At(10)));
    }

    #[test]
    fn secs_to_us_truncates() {
        assert_eq!(secs_to_us(1.5), 1_500_000);
        assert_eq!(secs_to_us(0.0000019), 1);
    }
}
