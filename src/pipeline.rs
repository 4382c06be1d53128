//! Load pipeline wire types and the background load worker

use std::sync::Arc;

use flume::{Receiver, Sender};
use log::{debug, warn};

use crate::chapter::{Chapter, LayoutConfig, PaginatedChapter};
use crate::source::{ContentSource, Paginator, PlainTextPaginator};

/// Monotonic counter bumped on every chapter-index change. A completion
/// carrying an old generation may be from a navigation context that no
/// longer exists; see the discard rule in the session engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(pub u64);

impl Generation {
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Errors from load workers.
#[derive(Debug, thiserror::Error)]
pub enum LoadFault {
    #[error("source: {detail}")]
    Source { detail: String },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl LoadFault {
    pub fn source(detail: impl Into<String>) -> Self {
        Self::Source {
            detail: detail.into(),
        }
    }
}

/// A paginator rejected the content as malformed. The worker falls back to
/// plain-text pagination, so this never reaches the session as a failure.
#[derive(Debug, thiserror::Error)]
#[error("{detail}")]
pub struct PaginateFault {
    pub detail: String,
}

impl PaginateFault {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

/// Request sent to load workers.
#[derive(Debug)]
pub enum LoadRequest {
    /// Fetch and paginate one chapter
    Chapter {
        chapter_index: usize,
        generation: Generation,
        layout: LayoutConfig,
    },

    /// Shutdown the worker
    Shutdown,
}

/// Response from load workers.
#[derive(Debug)]
pub enum LoadResponse {
    Loaded {
        chapter_index: usize,
        generation: Generation,
        chapter: Arc<PaginatedChapter>,
        /// Set when the configured paginator rejected the content and the
        /// plain-text fallback produced these pages instead.
        degraded: Option<PaginateFault>,
    },

    Failed {
        chapter_index: usize,
        generation: Generation,
        fault: LoadFault,
    },
}

/// Worker loop: pull requests from the shared queue, fetch and paginate,
/// hand the result back. Workers never touch session state; routing and
/// acceptance are decided by the owner thread at completion time.
pub fn load_worker(
    source: Arc<dyn ContentSource>,
    paginator: Arc<dyn Paginator>,
    requests: Receiver<LoadRequest>,
    responses: Sender<LoadResponse>,
) {
    while let Ok(request) = requests.recv() {
        match request {
            LoadRequest::Shutdown => break,
            LoadRequest::Chapter {
                chapter_index,
                generation,
                layout,
            } => {
                let response = load_one(&*source, &*paginator, chapter_index, generation, &layout);
                if responses.send(response).is_err() {
                    break;
                }
            }
        }
    }
    debug!("load worker exiting");
}

fn load_one(
    source: &dyn ContentSource,
    paginator: &dyn Paginator,
    chapter_index: usize,
    generation: Generation,
    layout: &LayoutConfig,
) -> LoadResponse {
    let text = match source.fetch(chapter_index) {
        Ok(text) => text,
        Err(fault) => {
            return LoadResponse::Failed {
                chapter_index,
                generation,
                fault,
            };
        }
    };

    let chapter = Chapter::new(chapter_index, text.title, text.content);
    let (pages, degraded) = match paginator.paginate(&chapter, layout) {
        Ok(pages) => (pages, None),
        Err(fault) => {
            // Reading must not stall on layout: malformed content degrades
            // to plain-text pagination, and the fault travels with the
            // result so the session can surface the degradation.
            warn!("pagination failed for chapter {chapter_index}, falling back to plain text: {fault}");
            let pages = PlainTextPaginator
                .paginate(&chapter, layout)
                .unwrap_or_default();
            (pages, Some(fault))
        }
    };

    debug!(
        "loaded chapter {chapter_index} (gen {}): {} pages",
        generation.0,
        pages.len()
    );
    LoadResponse::Loaded {
        chapter_index,
        generation,
        chapter: Arc::new(PaginatedChapter::new(chapter, pages)),
        degraded,
    }
}
