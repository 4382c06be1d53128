//! Session error taxonomy

/// Errors surfaced by the reading-session engine.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Network/source error fetching a chapter. Recoverable: retry on demand.
    #[error("failed to load chapter {chapter_index}: {detail}")]
    LoadFailure {
        chapter_index: usize,
        detail: String,
    },

    /// Malformed content the configured paginator could not lay out.
    /// Recoverable: the pipeline falls back to plain-text pagination.
    #[error("failed to paginate chapter {chapter_index}: {detail}")]
    PaginationFailure {
        chapter_index: usize,
        detail: String,
    },

    /// Navigation past the book boundaries. The navigation is a no-op.
    /// `index` is the requested target, so stepping back from the first
    /// chapter reports -1, never a chapter that exists.
    #[error("chapter {index} out of range (book has {total} chapters)")]
    OutOfRange { index: i64, total: usize },

    /// Narration reported an offset outside any known page. The bridge
    /// clamps to the nearest valid page; the session keeps running.
    #[error("narration offset {char_offset} beyond chapter {chapter_index}")]
    NarrationDesync {
        chapter_index: usize,
        char_offset: usize,
    },
}

impl SessionError {
    /// Every error in the taxonomy leaves the session usable; this exists so
    /// callers surfacing errors to a UI can keep a single code path.
    #[must_use]
    pub fn recoverable(&self) -> bool {
        true
    }

    /// Stable short name for logs and outbound error events.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::LoadFailure { .. } => ErrorKind::LoadFailure,
            Self::PaginationFailure { .. } => ErrorKind::PaginationFailure,
            Self::OutOfRange { .. } => ErrorKind::OutOfRange,
            Self::NarrationDesync { .. } => ErrorKind::NarrationDesync,
        }
    }
}

/// Discriminant-only view of [`SessionError`] for outbound events.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    LoadFailure,
    PaginationFailure,
    OutOfRange,
    NarrationDesync,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_errors_never_name_a_valid_chapter() {
        let before_start = SessionError::OutOfRange { index: -1, total: 3 };
        assert_eq!(
            before_start.to_string(),
            "chapter -1 out of range (book has 3 chapters)"
        );

        let past_end = SessionError::OutOfRange { index: 3, total: 3 };
        assert_eq!(
            past_end.to_string(),
            "chapter 3 out of range (book has 3 chapters)"
        );
    }
}
