//! Content sources and pagination collaborators

use std::path::{Path, PathBuf};

use log::info;

use crate::chapter::{Chapter, LayoutConfig, Page};
use crate::pipeline::{LoadFault, PaginateFault};

/// Raw chapter text as delivered by a source, before pagination.
#[derive(Clone, Debug)]
pub struct ChapterText {
    pub title: String,
    pub content: String,
}

/// Supplies raw chapter content by absolute index. Implementations are
/// called from background load workers and must be shareable across them.
pub trait ContentSource: Send + Sync {
    fn chapter_count(&self) -> usize;

    fn fetch(&self, chapter_index: usize) -> Result<ChapterText, LoadFault>;
}

/// Turns raw content into pages. Pure function of content + layout; called
/// from background workers, off the owner thread.
pub trait Paginator: Send + Sync {
    fn paginate(&self, chapter: &Chapter, layout: &LayoutConfig) -> Result<Vec<Page>, PaginateFault>;
}

/// Greedy word-wrap paginator with exact char offsets. Also serves as the
/// fallback when a configured paginator rejects malformed content.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlainTextPaginator;

impl PlainTextPaginator {
    /// Wrap into `(start, end)` char ranges, end exclusive. Newlines are
    /// consumed as line terminators; overlong lines break at the last
    /// whitespace, or mid-word when a single word exceeds the width.
    fn wrap_lines(chars: &[char], max_cols: usize) -> Vec<(usize, usize)> {
        let max_cols = max_cols.max(1);
        let mut lines = Vec::new();
        let mut start = 0;
        let mut i = 0;

        while i < chars.len() {
            if chars[i] == '\n' {
                lines.push((start, i));
                i += 1;
                start = i;
                continue;
            }
            if i - start >= max_cols {
                let brk = (start..i).rev().find(|&j| chars[j].is_whitespace());
                let (end, next) = match brk {
                    Some(j) if j > start => (j, j + 1),
                    _ => (i, i),
                };
                lines.push((start, end));
                start = next;
                continue;
            }
            i += 1;
        }
        if start < chars.len() || lines.is_empty() {
            lines.push((start, chars.len()));
        }
        lines
    }
}

impl Paginator for PlainTextPaginator {
    fn paginate(&self, chapter: &Chapter, layout: &LayoutConfig) -> Result<Vec<Page>, PaginateFault> {
        let chars: Vec<char> = chapter.content.chars().collect();
        let lines = Self::wrap_lines(&chars, layout.max_cols);
        let rows = layout.rows_per_page.max(1);

        let pages = lines
            .chunks(rows)
            .map(|chunk| {
                let text = chunk
                    .iter()
                    .map(|&(s, e)| chars[s..e].iter().collect::<String>())
                    .collect::<Vec<_>>()
                    .join("\n");
                Page {
                    text,
                    offset_start: chunk[0].0,
                }
            })
            .collect();
        Ok(pages)
    }
}

/// Filesystem content source: one chapter per `.txt`/`.md` file in a
/// directory, ordered by filename, title taken from the file stem.
pub struct DirSource {
    chapters: Vec<DirChapter>,
}

struct DirChapter {
    path: PathBuf,
    title: String,
}

impl DirSource {
    pub fn open(dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let dir = dir.as_ref();
        let mut chapters: Vec<DirChapter> = std::fs::read_dir(dir)?
            .filter_map(|entry| {
                let entry = entry.ok()?;
                let path = entry.path();
                let extension = path.extension()?.to_str()?.to_lowercase();
                if extension != "txt" && extension != "md" {
                    return None;
                }
                let title = path.file_stem()?.to_string_lossy().to_string();
                Some(DirChapter { path, title })
            })
            .collect();
        chapters.sort_by(|a, b| a.path.cmp(&b.path));

        info!(
            "Opened book directory {} with {} chapters",
            dir.display(),
            chapters.len()
        );
        Ok(Self { chapters })
    }
}

impl ContentSource for DirSource {
    fn chapter_count(&self) -> usize {
        self.chapters.len()
    }

    fn fetch(&self, chapter_index: usize) -> Result<ChapterText, LoadFault> {
        let entry = self
            .chapters
            .get(chapter_index)
            .ok_or_else(|| LoadFault::source(format!("no chapter {chapter_index}")))?;
        let content = std::fs::read_to_string(&entry.path)?;
        Ok(ChapterText {
            title: entry.title.clone(),
            content,
        })
    }
}
