//! Persisted reading progress, written fire-and-forget with debouncing

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(2);

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub chapter: usize,
    pub page: usize,
    pub last_read: chrono::DateTime<chrono::Utc>,
}

/// Progress for all known books, keyed by book id. Writes are debounced:
/// navigation never waits on the filesystem, and a burst of page turns
/// produces one write. `flush` forces the pending write out.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProgressStore {
    books: HashMap<String, ProgressRecord>,
    #[serde(skip)]
    file_path: Option<PathBuf>,
    #[serde(skip, default = "default_debounce")]
    debounce: Duration,
    #[serde(skip)]
    last_write: Option<Instant>,
    #[serde(skip)]
    dirty: bool,
}

fn default_debounce() -> Duration {
    DEFAULT_DEBOUNCE
}

impl ProgressStore {
    pub fn ephemeral() -> Self {
        Self {
            books: HashMap::new(),
            file_path: None,
            debounce: DEFAULT_DEBOUNCE,
            last_write: None,
            dirty: false,
        }
    }

    pub fn with_file(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: Some(file_path.into()),
            ..Self::ephemeral()
        }
    }

    pub fn load_or_ephemeral(file_path: Option<&Path>) -> Self {
        match file_path {
            Some(path) => Self::load_from_file(path).unwrap_or_else(|e| {
                log::error!("Failed to load progress from {}: {e}", path.display());
                Self::with_file(path)
            }),
            None => Self::ephemeral(),
        }
    }

    pub fn load_from_file(file_path: &Path) -> anyhow::Result<Self> {
        if file_path.exists() {
            let content = fs::read_to_string(file_path)?;
            let mut store: Self = serde_json::from_str(&content)?;
            store.file_path = Some(file_path.to_path_buf());
            store.debounce = DEFAULT_DEBOUNCE;
            Ok(store)
        } else {
            Ok(Self::with_file(file_path))
        }
    }

    pub fn set_debounce(&mut self, debounce: Duration) {
        self.debounce = debounce;
    }

    #[must_use]
    pub fn get(&self, book_id: &str) -> Option<&ProgressRecord> {
        self.books.get(book_id)
    }

    /// Record a settled position mutation. Persists only when the debounce
    /// window has elapsed; errors are logged, never propagated.
    pub fn record(&mut self, book_id: &str, chapter: usize, page: usize) {
        self.books.insert(
            book_id.to_string(),
            ProgressRecord {
                chapter,
                page,
                last_read: chrono::Utc::now(),
            },
        );
        self.dirty = true;

        let due = self
            .last_write
            .is_none_or(|at| at.elapsed() >= self.debounce);
        if due {
            self.write();
        }
    }

    /// Force any pending write out (session teardown).
    pub fn flush(&mut self) {
        if self.dirty {
            self.write();
        }
    }

    fn write(&mut self) {
        let Some(path) = &self.file_path else {
            // Ephemeral stores keep progress in memory only
            self.dirty = false;
            return;
        };
        match serde_json::to_string_pretty(self) {
            Ok(content) => {
                if let Err(e) = fs::write(path, content) {
                    log::error!("Failed to save progress to {}: {e}", path.display());
                } else {
                    self.last_write = Some(Instant::now());
                    self.dirty = false;
                }
            }
            Err(e) => log::error!("Failed to serialize progress: {e}"),
        }
    }
}
