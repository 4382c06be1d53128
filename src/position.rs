//! Reading position: pure state + validation, no I/O

use crate::error::SessionError;

/// Result of a within-chapter page step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageStep {
    Moved,
    /// Already at the chapter edge. The caller decides whether to roll into
    /// the adjacent chapter; manual paging and narration handle this
    /// boundary differently, so the tracker never rolls on its own.
    ChapterBoundary,
}

/// Owns `(chapter_index, page_index)` and the total chapter count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PositionTracker {
    chapter_index: usize,
    page_index: usize,
    total_chapters: usize,
}

impl PositionTracker {
    #[must_use]
    pub fn new(total_chapters: usize) -> Self {
        Self {
            chapter_index: 0,
            page_index: 0,
            total_chapters,
        }
    }

    #[must_use]
    pub fn chapter_index(&self) -> usize {
        self.chapter_index
    }

    #[must_use]
    pub fn page_index(&self) -> usize {
        self.page_index
    }

    #[must_use]
    pub fn total_chapters(&self) -> usize {
        self.total_chapters
    }

    #[must_use]
    pub fn is_first_chapter(&self) -> bool {
        self.chapter_index == 0
    }

    #[must_use]
    pub fn is_last_chapter(&self) -> bool {
        self.chapter_index + 1 >= self.total_chapters
    }

    /// Move to a chapter, resetting the page to 0.
    pub fn set_chapter(&mut self, index: usize) -> Result<(), SessionError> {
        self.set_chapter_at(index, 0)
    }

    /// Move to a chapter landing on an explicit page (used by "jump to
    /// previous chapter, land on its last page"). The page is validated
    /// later, on chapter load, since the target length is unknown here.
    pub fn set_chapter_at(&mut self, index: usize, page: usize) -> Result<(), SessionError> {
        if index >= self.total_chapters {
            return Err(SessionError::OutOfRange {
                index: index as i64,
                total: self.total_chapters,
            });
        }
        self.chapter_index = index;
        self.page_index = page;
        Ok(())
    }

    /// Set the page, clamping silently into `[0, last_page_index]`.
    /// Page counts can change between a request and the response (chapter
    /// length can shrink on reload), so this never fails.
    pub fn set_page(&mut self, index: usize, last_page_index: usize) {
        self.page_index = index.min(last_page_index);
    }

    /// Re-clamp the current page against a freshly loaded chapter.
    pub fn clamp_page(&mut self, last_page_index: usize) {
        self.page_index = self.page_index.min(last_page_index);
    }

    pub fn advance_page(&mut self, last_page_index: usize) -> PageStep {
        if self.page_index >= last_page_index {
            PageStep::ChapterBoundary
        } else {
            self.page_index += 1;
            PageStep::Moved
        }
    }

    pub fn retreat_page(&mut self) -> PageStep {
        if self.page_index == 0 {
            PageStep::ChapterBoundary
        } else {
            self.page_index -= 1;
            PageStep::Moved
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_chapter_rejects_out_of_range() {
        let mut pos = PositionTracker::new(3);
        assert!(pos.set_chapter(2).is_ok());
        assert!(matches!(
            pos.set_chapter(3),
            Err(SessionError::OutOfRange { index: 3, total: 3 })
        ));
        // Failed navigation leaves position untouched
        assert_eq!(pos.chapter_index(), 2);
    }

    #[test]
    fn set_chapter_resets_page_unless_explicit() {
        let mut pos = PositionTracker::new(5);
        pos.set_page(7, 10);
        pos.set_chapter(1).unwrap();
        assert_eq!(pos.page_index(), 0);

        pos.set_chapter_at(0, 9).unwrap();
        assert_eq!(pos.page_index(), 9);
    }

    #[test]
    fn set_page_clamps_silently() {
        let mut pos = PositionTracker::new(1);
        pos.set_page(99, 4);
        assert_eq!(pos.page_index(), 4);
        pos.set_page(2, 4);
        assert_eq!(pos.page_index(), 2);
    }

    #[test]
    fn page_steps_signal_boundary_without_rolling() {
        let mut pos = PositionTracker::new(2);
        assert_eq!(pos.retreat_page(), PageStep::ChapterBoundary);
        assert_eq!(pos.advance_page(1), PageStep::Moved);
        assert_eq!(pos.page_index(), 1);
        assert_eq!(pos.advance_page(1), PageStep::ChapterBoundary);
        assert_eq!(pos.chapter_index(), 0);
    }
}
