//! Sliding three-chapter buffer keyed by offset from the current chapter

use crate::chapter::ChapterHandle;

/// Relative position of a buffered chapter: previous / current / next.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SlotOffset {
    Previous,
    Current,
    Next,
}

impl SlotOffset {
    /// Map `chapter.index - current_chapter_index` into a slot, if it lands
    /// in the {-1, 0, +1} window.
    #[must_use]
    pub fn from_delta(delta: i64) -> Option<Self> {
        match delta {
            -1 => Some(Self::Previous),
            0 => Some(Self::Current),
            1 => Some(Self::Next),
            _ => None,
        }
    }

    #[must_use]
    pub fn delta(self) -> i64 {
        match self {
            Self::Previous => -1,
            Self::Current => 0,
            Self::Next => 1,
        }
    }
}

/// Direction of a single-step chapter move.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepDirection {
    Forward,
    Backward,
}

/// Holds up to three paginated chapters around the current one.
#[derive(Default)]
pub struct ChapterBuffer {
    previous: Option<ChapterHandle>,
    current: Option<ChapterHandle>,
    next: Option<ChapterHandle>,
}

impl ChapterBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, offset: SlotOffset) -> Option<&ChapterHandle> {
        match offset {
            SlotOffset::Previous => self.previous.as_ref(),
            SlotOffset::Current => self.current.as_ref(),
            SlotOffset::Next => self.next.as_ref(),
        }
    }

    #[must_use]
    pub fn is_populated(&self, offset: SlotOffset) -> bool {
        self.get(offset).is_some()
    }

    /// Route a loaded chapter into its slot. The offset is recomputed here,
    /// at assignment time, from the chapter's absolute index against the
    /// current index at completion time. A result that no longer lands in
    /// {-1, 0, +1} is dropped: the reader navigated away before the load
    /// finished and the chapter is no longer relevant.
    ///
    /// Routing by the offset captured at request time would let a slow
    /// "next chapter" load land in the "current" slot after the reader has
    /// moved on; recomputing here is what keeps the buffer consistent.
    pub fn assign(
        &mut self,
        chapter: ChapterHandle,
        current_chapter_index: usize,
    ) -> Option<SlotOffset> {
        let delta = chapter.index() as i64 - current_chapter_index as i64;
        let offset = SlotOffset::from_delta(delta)?;
        match offset {
            SlotOffset::Previous => self.previous = Some(chapter),
            SlotOffset::Current => self.current = Some(chapter),
            SlotOffset::Next => self.next = Some(chapter),
        }
        Some(offset)
    }

    /// Clear all three slots. Called on any non-adjacent navigation: jump,
    /// source change, reload.
    pub fn invalidate_all(&mut self) {
        self.previous = None;
        self.current = None;
        self.next = None;
    }

    /// Re-label slots for a single-step move so an already-prefetched
    /// neighbor is not re-fetched. The new leading slot is left absent,
    /// pending reload.
    pub fn shift(&mut self, direction: StepDirection) {
        match direction {
            StepDirection::Forward => {
                self.previous = self.current.take();
                self.current = self.next.take();
            }
            StepDirection::Backward => {
                self.next = self.current.take();
                self.current = self.previous.take();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chapter::{Chapter, PaginatedChapter};
    use std::sync::Arc;

    fn handle(index: usize) -> ChapterHandle {
        Arc::new(PaginatedChapter::new(
            Chapter::new(index, format!("ch {index}"), "body"),
            vec![],
        ))
    }

    #[test]
    fn assign_routes_by_completion_time_offset() {
        let mut buf = ChapterBuffer::new();

        // Load for chapter 5 was issued while the reader was on 4; by the
        // time it completes the reader is on 5, so it is current, not next.
        assert_eq!(buf.assign(handle(5), 5), Some(SlotOffset::Current));
        assert_eq!(buf.get(SlotOffset::Current).unwrap().index(), 5);

        assert_eq!(buf.assign(handle(4), 5), Some(SlotOffset::Previous));
        assert_eq!(buf.assign(handle(6), 5), Some(SlotOffset::Next));
    }

    #[test]
    fn assign_drops_results_outside_the_window() {
        let mut buf = ChapterBuffer::new();
        buf.assign(handle(5), 5);

        // Reader moved two chapters ahead of a stale completion
        assert_eq!(buf.assign(handle(3), 5), None);
        assert_eq!(buf.assign(handle(8), 5), None);

        // The populated slot is unchanged
        assert_eq!(buf.get(SlotOffset::Current).unwrap().index(), 5);
        assert!(buf.get(SlotOffset::Previous).is_none());
        assert!(buf.get(SlotOffset::Next).is_none());
    }

    #[test]
    fn shift_forward_reuses_prefetched_next() {
        let mut buf = ChapterBuffer::new();
        buf.assign(handle(4), 5);
        buf.assign(handle(5), 5);
        buf.assign(handle(6), 5);

        buf.shift(StepDirection::Forward);

        assert_eq!(buf.get(SlotOffset::Previous).unwrap().index(), 5);
        assert_eq!(buf.get(SlotOffset::Current).unwrap().index(), 6);
        assert!(buf.get(SlotOffset::Next).is_none());
    }

    #[test]
    fn shift_backward_reuses_prefetched_previous() {
        let mut buf = ChapterBuffer::new();
        buf.assign(handle(4), 5);
        buf.assign(handle(5), 5);
        buf.assign(handle(6), 5);

        buf.shift(StepDirection::Backward);

        assert_eq!(buf.get(SlotOffset::Next).unwrap().index(), 5);
        assert_eq!(buf.get(SlotOffset::Current).unwrap().index(), 4);
        assert!(buf.get(SlotOffset::Previous).is_none());
    }

    #[test]
    fn invalidate_all_clears_every_slot() {
        let mut buf = ChapterBuffer::new();
        buf.assign(handle(4), 5);
        buf.assign(handle(5), 5);
        buf.assign(handle(6), 5);

        buf.invalidate_all();

        assert!(buf.get(SlotOffset::Previous).is_none());
        assert!(buf.get(SlotOffset::Current).is_none());
        assert!(buf.get(SlotOffset::Next).is_none());
    }
}
