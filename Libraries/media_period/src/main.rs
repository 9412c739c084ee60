mod args;
mod simulated;

use std::error::Error;
use std::fs;
use std::sync::Arc;
use std::time::{Duration, Instant};

use args::{parse_args, Args};
use chrono::{DateTime, Utc};
use media_period::mpd::builder::ManifestBuilder;
use media_period::{
    Allocator, ChunkStream, DashManifest, DashPeriod, DefaultAllocator, EventDispatcher, FixedTrackSelection, Format,
    LoadEvent, ManifestError, ManifestErrorSlot, PeriodConfig, PeriodContext, PeriodNotification, TrackSelection,
    TrackType,
};
use simulated::{SimulatedChunkSourceFactory, SimulatedStreamFactory};
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, Layer};

const SEGMENT_DURATION_SECS: u64 = 2;
const MANIFEST_REFRESH_MS: u64 = 2_000;

fn build_manifest(args: &Args, availability_start: DateTime<Utc>) -> Result<DashManifest, ManifestError> {
    let builder = match args.vod_duration_secs {
        Some(secs) => ManifestBuilder::on_demand(secs * 1_000),
        None => ManifestBuilder::live()
            .availability_start(availability_start)
            .minimum_update_period(MANIFEST_REFRESH_MS),
    };
    builder
        .segment_duration(SEGMENT_DURATION_SECS, 1)
        .add_adaptation_set(TrackType::Video)
        .add_representation(Format::new("video-360p", "video/mp4", "avc1.42c01e", 800_000).with_resolution(640, 360))
        .add_representation(Format::new("video-720p", "video/mp4", "avc1.4d401f", 2_500_000).with_resolution(1280, 720))
        .add_adaptation_set(TrackType::Audio)
        .add_representation(Format::new("audio-en", "audio/mp4", "mp4a.40.2", 128_000).with_sample_rate(48_000))
        .build()
}

fn load_config(args: &Args) -> Result<PeriodConfig, Box<dyn Error>> {
    let mut config = match &args.config {
        Some(path) => PeriodConfig::from_json(&fs::read_to_string(path)?)?,
        None => PeriodConfig::default(),
    };
    if let Some(retries) = args.min_loadable_retry_count {
        config.min_loadable_retry_count = retries;
    }
    Ok(config)
}

fn selection(
    period: &DashPeriod,
    group_index: usize,
    format_index: usize,
) -> Result<Arc<dyn TrackSelection>, Box<dyn Error>> {
    let selection = FixedTrackSelection::from_groups(period.track_groups(), group_index, format_index)
        .ok_or_else(|| format!("no format {} in track group {}", format_index, group_index))?;
    Ok(Arc::new(selection))
}

/// Asks the period to load until no stream takes more work.
fn feed(period: &mut DashPeriod, playback_position_us: i64) -> Result<(), Box<dyn Error>> {
    let mut dispatched = 0;
    while period.continue_loading(playback_position_us)? {
        dispatched += 1;
    }
    if dispatched > 0 {
        debug!("Dispatched {} loads at {}us", dispatched, playback_position_us);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = parse_args();

    let fmt_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_filter(args.level_filter());
    let subscriber = tracing_subscriber::registry().with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting media period driver");
    info!("{:?}", args);

    let config = load_config(&args)?;
    // Start the live timeline a little in the past so a few segments are published.
    let availability_start = Utc::now() - chrono::Duration::seconds(6);
    let manifest = Arc::new(build_manifest(&args, availability_start)?);

    let (sender, mut notifications) = mpsc::unbounded_channel();
    let events = EventDispatcher::new(Arc::new(|event: LoadEvent| {
        if let LoadEvent::LoadCompleted { stream, track_type, url, load_duration, .. } = event {
            info!("[{}] {:?} chunk {} loaded in {:?}", stream, track_type, url, load_duration);
        }
    }));
    let manifest_errors = Arc::new(ManifestErrorSlot::new());
    let context = PeriodContext {
        chunk_source_factory: Arc::new(SimulatedChunkSourceFactory),
        stream_factory: Arc::new(SimulatedStreamFactory::new(
            Duration::from_millis(args.load_delay_ms),
            args.fail_every,
        )),
        manifest_error_thrower: manifest_errors.clone(),
        events,
        config,
    };

    let mut period = DashPeriod::new(manifest.clone(), 0, context, sender)?;
    let allocator = Arc::new(DefaultAllocator::new(64 * 1024));
    period.prepare(allocator.clone(), 0)?;
    match notifications.recv().await {
        Some(PeriodNotification::Prepared) => {}
        other => return Err(format!("expected the period to be prepared, got {:?}", other).into()),
    }
    period.maybe_throw_prepare_error()?;
    info!("Period ready with {} track groups", period.track_groups().len());

    let video = selection(&period, 0, 1)?;
    let streams = period.select_tracks(&[], &[video.clone()], 0)?;
    feed(&mut period, 0)?;

    let audio = selection(&period, 1, 0)?;
    let streams = period.select_tracks(&streams, &[video, audio], 0)?;
    info!("Active streams: {:?}", streams);
    feed(&mut period, 0)?;

    let started = Instant::now();
    let deadline = sleep(Duration::from_secs(args.duration_secs));
    tokio::pin!(deadline);
    let mut refresh = interval(Duration::from_millis(manifest.min_update_period_ms.unwrap_or(MANIFEST_REFRESH_MS)));
    refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut report = interval(Duration::from_secs(1));

    loop {
        let playback_position_us = started.elapsed().as_micros() as i64;
        tokio::select! {
            _ = &mut deadline => break,
            Some(notification) = notifications.recv() => {
                if let PeriodNotification::ContinueLoadingRequested { stream } = notification {
                    debug!("Continue loading requested by {:?}", stream);
                    feed(&mut period, playback_position_us)?;
                }
            }
            _ = refresh.tick(), if manifest.dynamic => {
                let refreshed = Arc::new(build_manifest(&args, availability_start)?);
                period.update_manifest(refreshed, 0)?;
            }
            _ = report.tick() => {
                info!(
                    "Position {}us, buffered {}, next load {}, {} bytes allocated",
                    playback_position_us,
                    period.buffered_position_us()?,
                    period.next_load_position_us()?,
                    allocator.total_bytes_allocated()
                );
                for id in period.active_stream_ids() {
                    if let Err(error) = period.stream(id)?.maybe_throw_error() {
                        warn!("[{}] {}", id, error);
                    }
                }
            }
        }
    }

    period.release();
    info!("Released period, {} bytes still allocated", allocator.total_bytes_allocated());
    Ok(())
}
