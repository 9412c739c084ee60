mod common;

use std::fs;
use std::path::PathBuf;

use media_period::hls::{EncryptionMethod, MediaPlaylist, Segment, SegmentEncryption};
use media_testutil::{DumpAssertion, Dumper, PeriodHarness};

use common::two_set_manifest;

fn checked_in() -> DumpAssertion {
    DumpAssertion::new(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/dumps"))
}

fn vod_playlist() -> MediaPlaylist {
    MediaPlaylist::new(
        "https://cdn.example.com/vod/",
        100,
        5,
        3,
        false,
        false,
        vec![
            Segment::new("seg0.ts", 4.0),
            Segment::new("seg1.ts", 4.5).with_discontinuity_sequence(1),
            Segment::new("seg2.ts", 2.25)
                .with_discontinuity_sequence(1)
                .with_encryption(SegmentEncryption {
                    method: EncryptionMethod::Aes128,
                    key_uri: "key.bin".to_string(),
                    iv: None,
                }),
            Segment::new("seg3.ts", 4.0)
                .with_discontinuity_sequence(1)
                .with_byte_range(0, 1000),
        ],
    )
    .unwrap()
}

#[test]
fn track_groups_match_checked_in_dump() {
    let harness = PeriodHarness::prepared(two_set_manifest(10_000));
    checked_in()
        .assert_output(harness.period.track_groups(), "two_set_track_groups.dump")
        .unwrap();
}

#[test]
fn playlist_matches_checked_in_dump() {
    checked_in().assert_output(&vod_playlist(), "vod_playlist.dump").unwrap();
}

#[test]
fn prepared_period_matches_checked_in_dump() {
    let mut harness = PeriodHarness::prepared(two_set_manifest(10_000));
    let selections = vec![harness.selection(0, 0), harness.selection(1, 0)];
    harness.period.select_tracks(&[], &selections, 0).unwrap();

    checked_in()
        .assert_output(&harness.period, "prepared_period.dump")
        .unwrap();
}

#[test]
fn write_dump_produces_the_compared_file() {
    let dir = tempfile::tempdir().unwrap();
    let playlist = vod_playlist();

    DumpAssertion::new(dir.path())
        .write_dump(true)
        .assert_output(&playlist, "nested/playlist.dump")
        .unwrap();

    let mut dumper = Dumper::new();
    dumper.add_dumpable(&playlist);
    let written = fs::read_to_string(dir.path().join("nested/playlist.dump")).unwrap();
    assert_eq!(written, dumper.finish());

    DumpAssertion::new(dir.path())
        .assert_output(&playlist, "nested/playlist.dump")
        .unwrap();
}

#[test]
#[should_panic(expected = "dump mismatch")]
fn mismatching_dump_fails() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("playlist.dump"), "mediaSequence = 0\n").unwrap();

    let _ = DumpAssertion::new(dir.path()).assert_output(&vod_playlist(), "playlist.dump");
}

#[test]
fn missing_dump_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = DumpAssertion::new(dir.path()).assert_output(&vod_playlist(), "absent.dump");
    assert_eq!(result.unwrap_err().kind(), std::io::ErrorKind::NotFound);
}

#[test]
fn dumper_indents_nested_blocks() {
    let mut dumper = Dumper::new();
    dumper
        .add("a", 1)
        .start_block("outer")
        .add_time("t", None)
        .start_block("inner")
        .add_position("p", media_period::Position::EndOfSource)
        .end_block()
        .end_block()
        .add("b", 2);

    assert_eq!(
        dumper.finish(),
        "a = 1\nouter:\n  t = UNSET TIME\n  inner:\n    p = END OF SOURCE\nb = 2\n"
    );
}
