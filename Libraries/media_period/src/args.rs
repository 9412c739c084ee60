use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing::level_filters::LevelFilter;

/// Verbosity of the driver's log output, most verbose first.
#[derive(Copy, Clone, PartialEq, Eq, Debug, ValueEnum)]
pub enum Verbosity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    /// Nothing at all, not even load failures.
    Off,
}

impl From<Verbosity> for LevelFilter {
    fn from(verbosity: Verbosity) -> Self {
        match verbosity {
            Verbosity::Trace => LevelFilter::TRACE,
            Verbosity::Debug => LevelFilter::DEBUG,
            Verbosity::Info => LevelFilter::INFO,
            Verbosity::Warn => LevelFilter::WARN,
            Verbosity::Error => LevelFilter::ERROR,
            Verbosity::Off => LevelFilter::OFF,
        }
    }
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = "Drives a DASH period over simulated chunk streams.")]
pub struct Args {
    /// How long to drive playback before releasing the period.
    #[arg(short, long, default_value = "20")]
    pub duration_secs: u64,
    #[arg(short = 'l', long = "log-level", default_value = "info")]
    pub verbosity: Verbosity,
    /// Logs every chunk load, same as `--log-level debug`.
    #[arg(short, long, action = clap::ArgAction::SetTrue, conflicts_with = "verbosity")]
    pub verbose: bool,
    /// JSON file with a `PeriodConfig`.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Overrides `min_loadable_retry_count` from the config.
    #[arg(short = 'r', long)]
    pub min_loadable_retry_count: Option<u32>,
    /// Use an on-demand manifest of this length instead of a live one.
    #[arg(long)]
    pub vod_duration_secs: Option<u64>,
    /// Simulated time to load one chunk.
    #[arg(long, default_value = "150")]
    pub load_delay_ms: u64,
    /// Fail the first attempt at every Nth segment.
    #[arg(long)]
    pub fail_every: Option<u64>,
}

impl Args {
    pub fn level_filter(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::DEBUG
        } else {
            self.verbosity.into()
        }
    }
}

pub fn parse_args() -> Args {
    Args::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_info() {
        let args = Args::try_parse_from(["media-period"]).unwrap();
        assert_eq!(args.level_filter(), LevelFilter::INFO);
        assert_eq!(args.load_delay_ms, 150);
        assert!(args.vod_duration_secs.is_none());
    }

    #[test]
    fn log_level_can_silence_everything() {
        let args = Args::try_parse_from(["media-period", "--log-level", "off"]).unwrap();
        assert_eq!(args.level_filter(), LevelFilter::OFF);
    }

    #[test]
    fn verbose_flag_enables_debug() {
        let args = Args::try_parse_from(["media-period", "-v", "-r", "7"]).unwrap();
        assert_eq!(args.level_filter(), LevelFilter::DEBUG);
        assert_eq!(args.min_loadable_retry_count, Some(7));
    }

    #[test]
    fn verbose_conflicts_with_log_level() {
        assert!(Args::try_parse_from(["media-period", "-v", "--log-level", "warn"]).is_err());
    }
}
