//! Segmentation model
//!
//! Picks how a session is cut into backend segments:
//! 1. One segment per chapter when chapter markers exist and every chapter
//!    fits inside a single file
//! 2. One segment per file when there are several files
//! 3. A single segment otherwise
//!
//! A segment always maps onto exactly one clip of one file, so its absolute
//! span equals the span of audio the backend renders for it.

use crate::translator::{Segment, SegmentList};
use lectern_core::{AudioTrack, PlaybackSession};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentationScheme {
    Chapters,
    Tracks,
    Single,
}

pub fn classify(session: &PlaybackSession) -> SegmentationScheme {
    if !session.chapters.is_empty() && chapters_fit_tracks(session) {
        SegmentationScheme::Chapters
    } else if session.audio_tracks.len() > 1 {
        SegmentationScheme::Tracks
    } else {
        SegmentationScheme::Single
    }
}

/// Build the segment list for a validated session
pub fn build_segments(session: &PlaybackSession) -> SegmentList {
    let scheme = classify(session);
    let segments = match scheme {
        SegmentationScheme::Chapters => chapter_segments(session),
        SegmentationScheme::Tracks => session
            .audio_tracks
            .iter()
            .enumerate()
            .map(|(index, track)| Segment {
                index,
                start_ms: track.start_offset_ms,
                end_ms: track.end_ms(),
                track_index: index,
                clip_start_ms: 0,
                clip_end_ms: track.duration_ms,
            })
            .collect(),
        SegmentationScheme::Single => {
            let total = session.total_duration_ms();
            vec![Segment {
                index: 0,
                start_ms: 0,
                end_ms: total,
                track_index: 0,
                clip_start_ms: 0,
                clip_end_ms: total,
            }]
        }
    };
    SegmentList::new(scheme, segments)
}

/// Whether every chapter starts and ends inside the same file
fn chapters_fit_tracks(session: &PlaybackSession) -> bool {
    session.chapters.iter().all(|chapter| {
        let track = track_for(&session.audio_tracks, chapter.start_ms);
        session
            .audio_tracks
            .get(track)
            .is_some_and(|t| chapter.end_ms <= t.end_ms())
    })
}

fn chapter_segments(session: &PlaybackSession) -> Vec<Segment> {
    session
        .chapters
        .iter()
        .enumerate()
        .map(|(index, chapter)| {
            let track_index = track_for(&session.audio_tracks, chapter.start_ms);
            let (track_start, track_end) = session
                .audio_tracks
                .get(track_index)
                .map_or((0, chapter.end_ms), |t| (t.start_offset_ms, t.end_ms()));

            Segment {
                index,
                start_ms: chapter.start_ms,
                end_ms: chapter.end_ms,
                track_index,
                clip_start_ms: chapter.start_ms.saturating_sub(track_start),
                clip_end_ms: chapter.end_ms.min(track_end).saturating_sub(track_start),
            }
        })
        .collect()
}

fn track_for(tracks: &[AudioTrack], absolute_ms: u64) -> usize {
    tracks
        .iter()
        .position(|t| t.contains(absolute_ms))
        .unwrap_or(tracks.len().saturating_sub(1))
}
