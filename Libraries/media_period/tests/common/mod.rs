#![allow(dead_code)]

use std::sync::Arc;

use media_period::mpd::builder::ManifestBuilder;
use media_period::{DashManifest, Format, TrackType};

/// One period, a video adaptation set with three qualities and an audio set
/// with one.
pub fn two_set_manifest(duration_ms: u64) -> Arc<DashManifest> {
    Arc::new(
        ManifestBuilder::on_demand(duration_ms)
            .segment_duration(2, 1)
            .add_adaptation_set(TrackType::Video)
            .add_representation(Format::new("v-low", "video/mp4", "avc1.42c01e", 500_000).with_resolution(640, 360))
            .add_representation(Format::new("v-mid", "video/mp4", "avc1.4d401f", 1_500_000).with_resolution(1280, 720))
            .add_representation(Format::new("v-high", "video/mp4", "avc1.640028", 4_000_000).with_resolution(1920, 1080))
            .add_adaptation_set(TrackType::Audio)
            .add_representation(Format::new("a-main", "audio/mp4", "mp4a.40.2", 128_000).with_sample_rate(48_000))
            .build()
            .expect("valid manifest"),
    )
}

/// [`two_set_manifest`] plus a subtitle adaptation set.
pub fn three_set_manifest(duration_ms: u64) -> Arc<DashManifest> {
    let mut manifest = (*two_set_manifest(duration_ms)).clone();
    let text = ManifestBuilder::on_demand(duration_ms)
        .add_adaptation_set(TrackType::Text)
        .add_representation(Format::new("t-en", "text/vtt", "wvtt", 1_000))
        .build()
        .expect("valid manifest");
    let mut text_set = text.periods[0].adaptation_sets[0].clone();
    text_set.id = 2;
    manifest.periods[0].adaptation_sets.push(text_set);
    Arc::new(manifest)
}

pub fn live_manifest() -> Arc<DashManifest> {
    Arc::new(
        ManifestBuilder::live()
            .add_adaptation_set(TrackType::Video)
            .add_representation(Format::new("v-live", "video/mp4", "avc1.640028", 2_000_000))
            .build()
            .expect("valid manifest"),
    )
}

/// Two audio adaptation sets carrying the same representation.
pub fn twin_audio_manifest() -> Arc<DashManifest> {
    let audio = || Format::new("a-main", "audio/mp4", "mp4a.40.2", 128_000).with_sample_rate(48_000);
    Arc::new(
        ManifestBuilder::on_demand(10_000)
            .segment_duration(2, 1)
            .add_adaptation_set(TrackType::Audio)
            .add_representation(audio())
            .add_adaptation_set(TrackType::Audio)
            .add_representation(audio())
            .build()
            .expect("valid manifest"),
    )
}
