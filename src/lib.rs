// Export modules for use in tests
pub mod buffer;
pub mod chapter;
pub mod error;
pub mod narration;
pub mod pipeline;
pub mod position;
pub mod progress;
pub mod session;
pub mod source;

// Re-export the engine surface
pub use buffer::SlotOffset;
pub use chapter::{Chapter, LayoutConfig, Page, PaginatedChapter};
pub use error::{ErrorKind, SessionError};
pub use narration::{NarrationEvent, NarrationState, Narrator, NullNarrator};
pub use session::{SessionEngine, SessionEvent};
pub use source::{ChapterText, ContentSource, DirSource, Paginator, PlainTextPaginator};
