//! Chapter data model: raw chapters, paginated chapters, pages

use std::sync::Arc;

/// One unit of book content, addressed by absolute index in the table of
/// contents. Immutable once loaded; replaced wholesale, never mutated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chapter {
    /// 0-based absolute position in the book
    pub index: usize,
    pub title: String,
    /// Raw chapter text
    pub content: String,
}

impl Chapter {
    #[must_use]
    pub fn new(index: usize, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            index,
            title: title.into(),
            content: content.into(),
        }
    }
}

/// A rendering-sized slice of a chapter, the unit of on-screen navigation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Page {
    /// Laid-out text for this page
    pub text: String,
    /// Char offset of this page's first character within the chapter's
    /// raw content. Pages are contiguous: page i covers
    /// `[offset_start(i), offset_start(i+1))`.
    pub offset_start: usize,
}

/// Layout configuration pagination is a pure function of.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayoutConfig {
    /// Maximum characters per line
    pub max_cols: usize,
    /// Lines per page
    pub rows_per_page: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            max_cols: 72,
            rows_per_page: 36,
        }
    }
}

/// A chapter laid out against a [`LayoutConfig`]: an ordered, non-empty
/// sequence of pages covering the full chapter content.
#[derive(Clone, Debug)]
pub struct PaginatedChapter {
    pub chapter: Chapter,
    pages: Vec<Page>,
    /// Total char length of the raw content
    content_chars: usize,
}

impl PaginatedChapter {
    /// Build from a chapter and its pages. An empty page list is normalized
    /// to a single empty page so `last_page_index` is always valid.
    #[must_use]
    pub fn new(chapter: Chapter, mut pages: Vec<Page>) -> Self {
        if pages.is_empty() {
            pages.push(Page {
                text: String::new(),
                offset_start: 0,
            });
        }
        let content_chars = chapter.content.chars().count();
        Self {
            chapter,
            pages,
            content_chars,
        }
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.chapter.index
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.chapter.title
    }

    #[must_use]
    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    #[must_use]
    pub fn page(&self, index: usize) -> Option<&Page> {
        self.pages.get(index)
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    #[must_use]
    pub fn last_page_index(&self) -> usize {
        self.pages.len() - 1
    }

    /// Char offset at which the given page starts. Clamps past-the-end page
    /// indices to the last page.
    #[must_use]
    pub fn offset_at_page(&self, page_index: usize) -> usize {
        let i = page_index.min(self.last_page_index());
        self.pages[i].offset_start
    }

    /// Locate the page whose `[offset_start, next.offset_start)` interval
    /// contains the given char offset. Returns `None` when the offset lies
    /// beyond the chapter content; the caller decides how to recover.
    ///
    /// Monotonic: non-decreasing offsets map to non-decreasing page indices.
    #[must_use]
    pub fn page_for_offset(&self, char_offset: usize) -> Option<usize> {
        if char_offset >= self.content_chars.max(1) {
            return None;
        }
        let i = self
            .pages
            .partition_point(|p| p.offset_start <= char_offset);
        Some(i.saturating_sub(1))
    }

    #[must_use]
    pub fn content_chars(&self) -> usize {
        self.content_chars
    }
}

/// Shared handle to a paginated chapter as held by the buffer slots.
pub type ChapterHandle = Arc<PaginatedChapter>;
