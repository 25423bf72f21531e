//! Position translation
//!
//! Converts between absolute book-time (milliseconds from the start of the
//! whole work) and a backend's local coordinates (segment index + offset
//! within that segment). Out-of-range input is clamped, never rejected.

use crate::segmentation::SegmentationScheme;

/// Distance kept from the very end of the work when clamping forward
///
/// Landing exactly on the end would make a backend report end-of-content
/// immediately.
pub const END_EPSILON_MS: u64 = 2_000;

/// One unit in a backend's internal playlist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Position in the segment list
    pub index: usize,
    /// Absolute start (inclusive)
    pub start_ms: u64,
    /// Absolute end (exclusive)
    pub end_ms: u64,
    /// Audio track the segment is cut from
    pub track_index: usize,
    /// Start of the clip within the track file
    pub clip_start_ms: u64,
    /// End of the clip within the track file
    pub clip_end_ms: u64,
}

impl Segment {
    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }

    pub fn contains(&self, absolute_ms: u64) -> bool {
        absolute_ms >= self.start_ms && absolute_ms < self.end_ms
    }
}

/// Position in backend-local coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LocalPosition {
    pub segment_index: usize,
    pub offset_ms: u64,
}

impl LocalPosition {
    pub fn new(segment_index: usize, offset_ms: u64) -> Self {
        Self {
            segment_index,
            offset_ms,
        }
    }
}

/// Ordered, contiguous segments covering `[0, total_duration_ms)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentList {
    scheme: SegmentationScheme,
    segments: Vec<Segment>,
    total_duration_ms: u64,
}

impl SegmentList {
    pub fn new(scheme: SegmentationScheme, segments: Vec<Segment>) -> Self {
        let total_duration_ms = segments.last().map_or(0, |s| s.end_ms);
        Self {
            scheme,
            segments,
            total_duration_ms,
        }
    }

    pub fn scheme(&self) -> SegmentationScheme {
        self.scheme
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn get(&self, index: usize) -> Option<&Segment> {
        self.segments.get(index)
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn total_duration_ms(&self) -> u64 {
        self.total_duration_ms
    }

    /// Last position a forward seek may land on
    pub fn max_seek_ms(&self) -> u64 {
        self.total_duration_ms.saturating_sub(END_EPSILON_MS)
    }

    /// Time-derived segment index for an absolute position
    ///
    /// Positions past the end map to the last segment.
    pub fn index_at(&self, absolute_ms: u64) -> Option<usize> {
        if self.segments.is_empty() {
            return None;
        }
        // Boundary values belong to the segment that starts there
        let after = self.segments.partition_point(|s| s.start_ms <= absolute_ms);
        Some(after.saturating_sub(1).min(self.segments.len() - 1))
    }

    pub fn to_local(&self, absolute_ms: i64) -> LocalPosition {
        to_local(absolute_ms, self)
    }

    pub fn to_absolute(&self, position: LocalPosition) -> u64 {
        to_absolute(position.segment_index, position.offset_ms, self)
    }
}

/// Absolute book-time to backend-local coordinates
pub fn to_local(absolute_ms: i64, segments: &SegmentList) -> LocalPosition {
    let Some(last) = segments.segments.last() else {
        return LocalPosition::default();
    };
    if absolute_ms < 0 {
        return LocalPosition::default();
    }

    let absolute_ms = absolute_ms as u64;
    if absolute_ms >= segments.total_duration_ms {
        return LocalPosition::new(
            last.index,
            last.duration_ms().saturating_sub(END_EPSILON_MS),
        );
    }

    // index_at is Some for a non-empty list
    let index = segments.index_at(absolute_ms).unwrap_or(0);
    let segment = &segments.segments[index];
    LocalPosition::new(index, absolute_ms - segment.start_ms)
}

/// Backend-local coordinates to absolute book-time, clamped to `[0, total)`
pub fn to_absolute(segment_index: usize, offset_ms: u64, segments: &SegmentList) -> u64 {
    let Some(last) = segments.segments.last() else {
        return 0;
    };
    let segment = segments.segments.get(segment_index).unwrap_or(last);
    segment
        .start_ms
        .saturating_add(offset_ms)
        .min(segments.total_duration_ms.saturating_sub(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_chapters() -> SegmentList {
        let segment = |index: usize, start_ms: u64, end_ms: u64| Segment {
            index,
            start_ms,
            end_ms,
            track_index: 0,
            clip_start_ms: start_ms,
            clip_end_ms: end_ms,
        };
        SegmentList::new(
            SegmentationScheme::Chapters,
            vec![
                segment(0, 0, 300_000),
                segment(1, 300_000, 600_000),
                segment(2, 600_000, 900_000),
            ],
        )
    }

    #[test]
    fn boundary_belongs_to_next_segment() {
        let list = three_chapters();
        assert_eq!(list.to_local(300_000), LocalPosition::new(1, 0));
        assert_eq!(list.to_local(299_999), LocalPosition::new(0, 299_999));
    }

    #[test]
    fn negative_clamps_to_start() {
        let list = three_chapters();
        assert_eq!(list.to_local(-5), LocalPosition::new(0, 0));
    }

    #[test]
    fn past_end_clamps_before_last_segment_end() {
        let list = three_chapters();
        let expected = LocalPosition::new(2, 300_000 - END_EPSILON_MS);
        assert_eq!(list.to_local(900_000), expected);
        assert_eq!(list.to_local(5_000_000), expected);
    }

    #[test]
    fn to_absolute_clamps() {
        let list = three_chapters();
        assert_eq!(list.to_absolute(LocalPosition::new(1, 15_000)), 315_000);
        assert_eq!(list.to_absolute(LocalPosition::new(9, 0)), 600_000);
        assert_eq!(list.to_absolute(LocalPosition::new(2, 999_999)), 899_999);
    }

    #[test]
    fn empty_list_translates_to_origin() {
        let list = SegmentList::new(SegmentationScheme::Single, Vec::new());
        assert_eq!(list.to_local(1_000), LocalPosition::default());
        assert_eq!(list.to_absolute(LocalPosition::new(3, 10)), 0);
        assert_eq!(list.index_at(0), None);
    }

    #[test]
    fn short_last_segment_offset_saturates() {
        let list = SegmentList::new(
            SegmentationScheme::Tracks,
            vec![Segment {
                index: 0,
                start_ms: 0,
                end_ms: 1_500,
                track_index: 0,
                clip_start_ms: 0,
                clip_end_ms: 1_500,
            }],
        );
        assert_eq!(list.to_local(10_000), LocalPosition::new(0, 0));
    }
}
