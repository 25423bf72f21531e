//! Navigation controller
//!
//! Chapter/track level navigation over a [`SegmentList`]. The controller
//! computes where to go and remembers the segment it last sent the listener
//! to; the caller performs the backend seek. The tracked index is set as soon
//! as a navigation is issued, so repeated skips are not defeated by a backend
//! that has not reported its new position yet.

use crate::error::{PlaybackError, Result};
use crate::translator::{LocalPosition, SegmentList};

/// Where a navigation call wants the backend to go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigationTarget {
    pub index: usize,
    pub absolute_ms: u64,
    pub local: LocalPosition,
}

#[derive(Debug)]
pub struct NavigationController {
    tracked_index: Option<usize>,
    skip_previous_threshold_ms: u64,
}

impl NavigationController {
    pub fn new(skip_previous_threshold_ms: u64) -> Self {
        Self {
            tracked_index: None,
            skip_previous_threshold_ms,
        }
    }

    pub fn tracked_index(&self) -> Option<usize> {
        self.tracked_index
    }

    /// Forget the tracked index (new segment list)
    pub fn reset(&mut self) {
        self.tracked_index = None;
    }

    /// Current segment index
    ///
    /// `position_ms` is the backend's absolute position, `None` while it is
    /// mid-seek. The tracked index wins unless playback has moved to another
    /// segment since.
    pub fn current_index(&mut self, segments: &SegmentList, position_ms: Option<u64>) -> Option<usize> {
        let derived = position_ms.and_then(|ms| segments.index_at(ms));
        match (self.tracked_index, derived) {
            (Some(tracked), None) => Some(tracked.min(segments.len().checked_sub(1)?)),
            (Some(tracked), Some(derived)) if tracked == derived => Some(tracked),
            (_, Some(derived)) => {
                self.tracked_index = Some(derived);
                Some(derived)
            }
            (None, None) => segments.index_at(0),
        }
    }

    pub fn navigate_to_index(&mut self, index: usize, segments: &SegmentList) -> Result<NavigationTarget> {
        let segment = segments.get(index).ok_or(PlaybackError::IndexOutOfBounds {
            index,
            count: segments.len(),
        })?;

        let local = segments.to_local(segment.start_ms as i64);
        self.tracked_index = Some(index);
        Ok(NavigationTarget {
            index,
            absolute_ms: segments.to_absolute(local),
            local,
        })
    }

    /// Next segment, or `None` on the last one
    pub fn skip_next(&mut self, segments: &SegmentList, position_ms: Option<u64>) -> Option<NavigationTarget> {
        let current = self.current_index(segments, position_ms)?;
        if current + 1 >= segments.len() {
            return None;
        }
        self.navigate_to_index(current + 1, segments).ok()
    }

    /// Restart the current segment, or go to the previous one near its start
    pub fn skip_previous(
        &mut self,
        segments: &SegmentList,
        position_ms: Option<u64>,
    ) -> Option<NavigationTarget> {
        let current = self.current_index(segments, position_ms)?;
        let start_ms = segments.get(current)?.start_ms;
        let elapsed = position_ms.map_or(0, |ms| ms.saturating_sub(start_ms));

        let target = if elapsed >= self.skip_previous_threshold_ms {
            current
        } else {
            current.saturating_sub(1)
        };
        self.navigate_to_index(target, segments).ok()
    }

    pub fn jump_forward(
        &mut self,
        delta_ms: u64,
        segments: &SegmentList,
        position_ms: u64,
    ) -> NavigationTarget {
        let target = position_ms.saturating_add(delta_ms).min(segments.max_seek_ms());
        self.seek_absolute(target as i64, segments)
    }

    pub fn jump_backward(
        &mut self,
        delta_ms: u64,
        segments: &SegmentList,
        position_ms: u64,
    ) -> NavigationTarget {
        let target = position_ms
            .saturating_sub(delta_ms)
            .min(segments.max_seek_ms());
        self.seek_absolute(target as i64, segments)
    }

    pub fn seek_absolute(&mut self, absolute_ms: i64, segments: &SegmentList) -> NavigationTarget {
        let local = segments.to_local(absolute_ms);
        self.tracked_index = Some(local.segment_index);
        NavigationTarget {
            index: local.segment_index,
            absolute_ms: segments.to_absolute(local),
            local,
        }
    }
}
