//! Property-based tests for position translation
//!
//! Uses proptest to check translation over arbitrary chapter layouts.

use lectern_core::{AudioTrack, Chapter, PlaybackSession};
use lectern_playback::{build_segments, SegmentList, END_EPSILON_MS};
use proptest::prelude::*;

/// Session with contiguous chapters of the given lengths in one file
fn chaptered(lengths: &[u64]) -> PlaybackSession {
    let total: u64 = lengths.iter().sum();
    let mut start = 0;
    let chapters = lengths
        .iter()
        .enumerate()
        .map(|(index, len)| {
            let chapter = Chapter::new(index, format!("Chapter {index}"), start, start + len);
            start += len;
            chapter
        })
        .collect();
    PlaybackSession::new("ps", "li", "Book", vec![AudioTrack::new(0, 0, total, "/a.mp3")])
        .with_chapters(chapters)
}

/// Session with one file per length
fn multi_file(lengths: &[u64]) -> PlaybackSession {
    let mut start = 0;
    let tracks = lengths
        .iter()
        .enumerate()
        .map(|(index, len)| {
            let track = AudioTrack::new(index, start, *len, format!("/part{index}.mp3"));
            start += len;
            track
        })
        .collect();
    PlaybackSession::new("ps", "li", "Book", tracks)
}

fn lengths() -> impl Strategy<Value = Vec<u64>> {
    prop::collection::vec(1_000u64..1_200_000, 1..12)
}

fn layout() -> impl Strategy<Value = SegmentList> {
    prop_oneof![
        lengths().prop_map(|l| build_segments(&chaptered(&l))),
        lengths().prop_map(|l| build_segments(&multi_file(&l))),
    ]
}

proptest! {
    #[test]
    fn round_trip_inside_the_work(segments in layout(), fraction in 0.0f64..1.0) {
        let total = segments.total_duration_ms();
        let absolute = ((total as f64) * fraction) as u64;
        prop_assume!(absolute < total);

        let local = segments.to_local(absolute as i64);
        prop_assert_eq!(segments.to_absolute(local), absolute);
    }

    #[test]
    fn local_offset_stays_inside_its_segment(segments in layout(), absolute in -10_000i64..20_000_000) {
        let local = segments.to_local(absolute);
        let segment = segments.get(local.segment_index).expect("index in range");
        prop_assert!(local.offset_ms < segment.duration_ms().max(1));
    }

    #[test]
    fn past_the_end_clamps_to_last_segment(segments in layout(), overshoot in 0u64..10_000_000) {
        let total = segments.total_duration_ms();
        let last = segments.segments().last().expect("non-empty");

        let local = segments.to_local((total + overshoot) as i64);
        prop_assert_eq!(local.segment_index, last.index);
        prop_assert_eq!(local.offset_ms, last.duration_ms().saturating_sub(END_EPSILON_MS));
        prop_assert!(segments.to_absolute(local) < total);
    }

    #[test]
    fn out_of_range_local_input_is_clamped(segments in layout(), index in 0usize..64, offset in 0u64..50_000_000) {
        let absolute = lectern_playback::to_absolute(index, offset, &segments);
        prop_assert!(absolute < segments.total_duration_ms());
    }
}

#[test]
fn negative_positions_clamp_to_start() {
    let segments = build_segments(&chaptered(&[300_000, 300_000]));
    let local = segments.to_local(-1);
    assert_eq!((local.segment_index, local.offset_ms), (0, 0));
}
