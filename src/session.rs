//! Session orchestrator: wires position, buffer, loads and narration
//!
//! All state mutation happens on the thread that owns the `SessionEngine`.
//! Background workers only produce `LoadResponse` values; whether a result
//! is accepted, and into which slot, is decided here at completion time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use flume::{Receiver, Sender};
use log::{debug, error, info, warn};

use crate::buffer::{ChapterBuffer, SlotOffset, StepDirection};
use crate::chapter::{LayoutConfig, PaginatedChapter};
use crate::error::{ErrorKind, SessionError};
use crate::narration::{NarrationBridge, NarrationEvent, NarrationState, Narrator};
use crate::pipeline::{Generation, LoadRequest, LoadResponse, load_worker};
use crate::position::{PageStep, PositionTracker};
use crate::progress::ProgressStore;
use crate::source::{ContentSource, Paginator, PlainTextPaginator};

pub const DEFAULT_WORKERS: usize = 2;

/// Outbound notifications for the presentation layer. For a single load
/// completion, `BufferReady` always precedes `RenderRequested`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// A buffer slot was (re)populated
    BufferReady(SlotOffset),
    /// The current page should be redrawn
    RenderRequested,
    NarrationStateChanged(NarrationState),
    SessionError { kind: ErrorKind, recoverable: bool },
}

/// The reading-session engine: sliding three-chapter buffer, background
/// load pipeline, position tracking and narration synchronization.
pub struct SessionEngine {
    source: Arc<dyn ContentSource>,
    position: PositionTracker,
    buffer: ChapterBuffer,
    narration: NarrationBridge,
    progress: ProgressStore,
    book_id: String,
    layout: LayoutConfig,

    /// Bumped on every chapter-index change
    generation: Generation,
    /// Responses below this generation are unconditionally discarded; moved
    /// forward only by reloads, where pre-reload content must never land.
    floor_generation: Generation,
    /// Chapters with a live load, with the generation it was issued under.
    /// At most one load is live per chapter at a time.
    in_flight: HashMap<usize, Generation>,

    request_tx: Sender<LoadRequest>,
    response_rx: Receiver<LoadResponse>,
    num_workers: usize,
    shut_down: bool,
}

impl SessionEngine {
    /// Engine with plain-text pagination, ephemeral progress and the default
    /// worker count.
    pub fn new(source: Arc<dyn ContentSource>, book_id: impl Into<String>) -> Self {
        Self::with_config(
            source,
            Arc::new(PlainTextPaginator),
            Box::new(crate::narration::NullNarrator),
            book_id,
            LayoutConfig::default(),
            DEFAULT_WORKERS,
            ProgressStore::ephemeral(),
        )
    }

    pub fn with_config(
        source: Arc<dyn ContentSource>,
        paginator: Arc<dyn Paginator>,
        narrator: Box<dyn Narrator>,
        book_id: impl Into<String>,
        layout: LayoutConfig,
        num_workers: usize,
        progress: ProgressStore,
    ) -> Self {
        let book_id = book_id.into();
        let total = source.chapter_count();
        let mut position = PositionTracker::new(total);

        // Resume from persisted progress; the page is clamped once the
        // chapter loads, since its length may have changed.
        if let Some(record) = progress.get(&book_id) {
            if position.set_chapter_at(record.chapter, record.page).is_ok() {
                info!(
                    "Resuming {book_id} at chapter {} page {}",
                    record.chapter, record.page
                );
            } else {
                warn!(
                    "Persisted chapter {} out of range (book now has {total} chapters)",
                    record.chapter
                );
            }
        }

        // Flume gives us MPMC channels: multiple workers pull from one
        // shared request queue, which std::sync::mpsc cannot express.
        let (request_tx, request_rx) = flume::unbounded();
        let (response_tx, response_rx) = flume::unbounded();

        for _ in 0..num_workers {
            let source = source.clone();
            let paginator = paginator.clone();
            let rx = request_rx.clone();
            let tx = response_tx.clone();
            std::thread::spawn(move || load_worker(source, paginator, rx, tx));
        }

        let mut engine = Self {
            source,
            position,
            buffer: ChapterBuffer::new(),
            narration: NarrationBridge::new(narrator),
            progress,
            book_id,
            layout,
            generation: Generation(0),
            floor_generation: Generation(0),
            in_flight: HashMap::new(),
            request_tx,
            response_rx,
            num_workers,
            shut_down: false,
        };
        engine.request_window();
        engine
    }

    #[must_use]
    pub fn chapter_index(&self) -> usize {
        self.position.chapter_index()
    }

    #[must_use]
    pub fn page_index(&self) -> usize {
        self.position.page_index()
    }

    #[must_use]
    pub fn total_chapters(&self) -> usize {
        self.position.total_chapters()
    }

    #[must_use]
    pub fn narration_state(&self) -> NarrationState {
        self.narration.state()
    }

    /// Resident chapter for a buffer slot. Render requests are always
    /// satisfied from here, never by blocking on an in-flight load.
    #[must_use]
    pub fn chapter(&self, offset: SlotOffset) -> Option<&Arc<PaginatedChapter>> {
        self.buffer.get(offset)
    }

    #[must_use]
    pub fn current_chapter(&self) -> Option<&Arc<PaginatedChapter>> {
        self.buffer.get(SlotOffset::Current)
    }

    /// Text of the current page, if the current chapter is resident.
    #[must_use]
    pub fn current_page_text(&self) -> Option<&str> {
        let chapter = self.current_chapter()?;
        chapter
            .page(self.position.page_index())
            .map(|p| p.text.as_str())
    }

    // ---- navigation entry points -------------------------------------

    pub fn navigate_next(&mut self) -> Vec<SessionEvent> {
        if self.position.is_last_chapter() {
            return self.out_of_range(self.position.chapter_index() as i64 + 1);
        }
        self.step_chapter(StepDirection::Forward, false)
    }

    pub fn navigate_previous(&mut self, land_on_last_page: bool) -> Vec<SessionEvent> {
        if self.position.is_first_chapter() {
            return self.out_of_range(-1);
        }
        self.step_chapter(StepDirection::Backward, land_on_last_page)
    }

    pub fn jump_to_chapter(&mut self, index: usize) -> Vec<SessionEvent> {
        let from = self.position.chapter_index();
        if index == from {
            return vec![];
        }
        // Adjacent jumps are single-step moves and keep the prefetched slot
        match index as i64 - from as i64 {
            1 => return self.step_chapter(StepDirection::Forward, false),
            -1 => return self.step_chapter(StepDirection::Backward, false),
            _ => {}
        }

        let mut events = Vec::new();
        if let Err(e) = self.position.set_chapter(index) {
            return self.report(e);
        }
        info!("Jump to chapter {index}");
        self.generation = self.generation.next();
        self.buffer.invalidate_all();
        if let Some(state) = self.narration.on_chapter_changed(true, None) {
            events.push(SessionEvent::NarrationStateChanged(state));
        }
        self.request_window();
        events
    }

    pub fn jump_to_page(&mut self, index: usize) -> Vec<SessionEvent> {
        let Some(chapter) = self.current_chapter().cloned() else {
            // Nothing rendered yet; the page settles when the chapter lands
            self.position.set_page(index, usize::MAX);
            return vec![];
        };
        let before = self.position.page_index();
        self.position.set_page(index, chapter.last_page_index());
        if self.position.page_index() == before {
            return vec![];
        }
        self.narration.seek(&chapter, self.position.page_index());
        self.save_progress();
        vec![SessionEvent::RenderRequested]
    }

    /// Manual in-chapter page turn; rolls into the next chapter at the
    /// boundary.
    pub fn turn_page_forward(&mut self) -> Vec<SessionEvent> {
        let Some(chapter) = self.current_chapter().cloned() else {
            return vec![];
        };
        match self.position.advance_page(chapter.last_page_index()) {
            PageStep::Moved => {
                self.narration.seek(&chapter, self.position.page_index());
                self.save_progress();
                vec![SessionEvent::RenderRequested]
            }
            PageStep::ChapterBoundary => self.navigate_next(),
        }
    }

    /// Manual page turn backwards; rolls into the previous chapter's last
    /// page at the boundary.
    pub fn turn_page_backward(&mut self) -> Vec<SessionEvent> {
        let Some(chapter) = self.current_chapter().cloned() else {
            return vec![];
        };
        match self.position.retreat_page() {
            PageStep::Moved => {
                self.narration.seek(&chapter, self.position.page_index());
                self.save_progress();
                vec![SessionEvent::RenderRequested]
            }
            PageStep::ChapterBoundary => self.navigate_previous(true),
        }
    }

    /// Drop all buffered chapters and reload the whole window, keeping the
    /// position. Used after a content-source change: results from loads
    /// issued before the reload are never accepted, even for slots that are
    /// still relevant.
    pub fn reload_current_chapter(&mut self) -> Vec<SessionEvent> {
        info!("Reloading chapter window around {}", self.position.chapter_index());
        self.generation = self.generation.next();
        self.floor_generation = self.generation;
        self.in_flight.clear();
        self.buffer.invalidate_all();
        self.request_window();
        vec![]
    }

    // ---- narration entry points --------------------------------------

    pub fn play_pause_narration(&mut self) -> Vec<SessionEvent> {
        let current = self.current_chapter().cloned();
        let page = self.position.page_index();
        match self.narration.toggle(current.as_deref(), page) {
            Some(state) => vec![SessionEvent::NarrationStateChanged(state)],
            None => vec![],
        }
    }

    pub fn stop_narration(&mut self) -> Vec<SessionEvent> {
        match self.narration.stop() {
            Some(state) => vec![SessionEvent::NarrationStateChanged(state)],
            None => vec![],
        }
    }

    /// Apply an event from the narration subsystem. Progress offsets are
    /// translated into page positions; end-of-chapter goes through the same
    /// advance path a manual "next chapter" takes.
    pub fn handle_narration_event(&mut self, event: NarrationEvent) -> Vec<SessionEvent> {
        match event {
            NarrationEvent::Progress { char_offset } => {
                // Narration may run out of process; a progress report can
                // arrive after the user already stopped read-aloud and must
                // not yank the reading position.
                if self.narration.state() == NarrationState::Stopped {
                    debug!("ignoring narration progress after stop");
                    return vec![];
                }
                let Some(chapter) = self.current_chapter().cloned() else {
                    return vec![];
                };
                let mut events = Vec::new();
                let (page, desync) = self.narration.page_for_progress(&chapter, char_offset);
                if let Some(e) = desync {
                    events.extend(self.report(e));
                }
                if page != self.position.page_index() {
                    self.position.set_page(page, chapter.last_page_index());
                    self.save_progress();
                }
                // Highlight moves within the page too
                events.push(SessionEvent::RenderRequested);
                events
            }
            NarrationEvent::ChapterFinished => {
                if self.narration.state() == NarrationState::Stopped {
                    debug!("ignoring narration chapter-finished after stop");
                    return vec![];
                }
                if self.position.is_last_chapter() {
                    debug!("narration finished the last chapter");
                    self.stop_narration()
                } else {
                    self.navigate_next()
                }
            }
            other => match self.narration.on_event(other) {
                Some(state) => vec![SessionEvent::NarrationStateChanged(state)],
                None => vec![],
            },
        }
    }

    // ---- load pipeline -----------------------------------------------

    /// Drain completed loads, routing each into the buffer.
    pub fn poll_responses(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(response) = self.response_rx.try_recv() {
            events.extend(self.handle_load_response(response));
        }
        events
    }

    /// Like [`poll_responses`](Self::poll_responses) but blocks up to
    /// `timeout` for the first response.
    pub fn poll_responses_timeout(&mut self, timeout: Duration) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        if let Ok(response) = self.response_rx.recv_timeout(timeout) {
            events.extend(self.handle_load_response(response));
        }
        events.extend(self.poll_responses());
        events
    }

    pub(crate) fn handle_load_response(&mut self, response: LoadResponse) -> Vec<SessionEvent> {
        match response {
            LoadResponse::Loaded {
                chapter_index,
                generation,
                chapter,
                degraded,
            } => {
                self.settle_in_flight(chapter_index, generation);
                if generation < self.floor_generation {
                    debug!("discarding pre-reload load of chapter {chapter_index}");
                    return vec![];
                }

                let current = self.position.chapter_index();
                let delta = chapter_index as i64 - current as i64;
                if generation < self.generation && SlotOffset::from_delta(delta).is_none() {
                    debug!(
                        "discarding stale load of chapter {chapter_index} (gen {} < {})",
                        generation.0, self.generation.0
                    );
                    return vec![];
                }

                // Routing offset is recomputed here, against the position at
                // completion time; irrelevant results are dropped.
                let Some(offset) = self.buffer.assign(chapter.clone(), current) else {
                    debug!("dropping load of chapter {chapter_index}: outside window of {current}");
                    return vec![];
                };

                let mut events = vec![SessionEvent::BufferReady(offset)];
                if offset == SlotOffset::Current {
                    // Chapter length can shrink on reload; clamp on entry
                    self.position.clamp_page(chapter.last_page_index());
                    self.save_progress();
                    self.narration.on_current_ready(&chapter);
                    events.push(SessionEvent::RenderRequested);
                    if let Some(fault) = degraded {
                        // The plain-text fallback rendered; tell the caller
                        // layout is degraded for this chapter
                        events.extend(self.report(SessionError::PaginationFailure {
                            chapter_index,
                            detail: fault.to_string(),
                        }));
                    }
                }
                events
            }

            LoadResponse::Failed {
                chapter_index,
                generation,
                fault,
            } => {
                self.settle_in_flight(chapter_index, generation);
                if generation < self.floor_generation {
                    return vec![];
                }
                if chapter_index == self.position.chapter_index() {
                    // The previous page, if any, stays rendered; the caller
                    // may retry via reload_current_chapter.
                    error!("failed to load current chapter {chapter_index}: {fault}");
                    self.report(SessionError::LoadFailure {
                        chapter_index,
                        detail: fault.to_string(),
                    })
                } else {
                    // Prefetch is best-effort and never blocks reading
                    warn!("prefetch of chapter {chapter_index} failed: {fault}");
                    vec![]
                }
            }
        }
    }

    /// Issue loads for the three-chapter window around the current chapter,
    /// skipping indices outside the book, slots already populated, and
    /// chapters with a live load.
    fn request_window(&mut self) {
        let current = self.position.chapter_index() as i64;
        for delta in [-1i64, 0, 1] {
            let index = current + delta;
            if index < 0 || index as usize >= self.position.total_chapters() {
                continue;
            }
            let index = index as usize;
            let slot = SlotOffset::from_delta(delta).expect("delta is in the slot window");
            if self.buffer.is_populated(slot) || self.in_flight.contains_key(&index) {
                continue;
            }
            debug!("requesting chapter {index} (gen {})", self.generation.0);
            self.in_flight.insert(index, self.generation);
            let _ = self.request_tx.send(LoadRequest::Chapter {
                chapter_index: index,
                generation: self.generation,
                layout: self.layout,
            });
        }
    }

    fn settle_in_flight(&mut self, chapter_index: usize, generation: Generation) {
        // A reload may have re-issued this chapter under a newer generation;
        // only the matching entry is settled.
        if self.in_flight.get(&chapter_index) == Some(&generation) {
            self.in_flight.remove(&chapter_index);
        }
    }

    fn step_chapter(&mut self, direction: StepDirection, land_on_last_page: bool) -> Vec<SessionEvent> {
        let target = match direction {
            StepDirection::Forward => self.position.chapter_index() + 1,
            StepDirection::Backward => self.position.chapter_index() - 1,
        };
        let landing_page = if land_on_last_page { usize::MAX } else { 0 };
        if let Err(e) = self.position.set_chapter_at(target, landing_page) {
            return self.report(e);
        }
        debug!("step to chapter {target}");
        self.generation = self.generation.next();
        self.buffer.shift(direction);

        let mut events = Vec::new();
        let current = self.current_chapter().cloned();
        if let Some(state) = self
            .narration
            .on_chapter_changed(false, current.as_deref())
        {
            events.push(SessionEvent::NarrationStateChanged(state));
        }
        if let Some(chapter) = current {
            // The chapter the reader moved into was already prefetched
            self.position.clamp_page(chapter.last_page_index());
            self.save_progress();
            events.push(SessionEvent::RenderRequested);
        }
        self.request_window();
        events
    }

    fn save_progress(&mut self) {
        self.progress.record(
            &self.book_id,
            self.position.chapter_index(),
            self.position.page_index(),
        );
    }

    fn out_of_range(&mut self, index: i64) -> Vec<SessionEvent> {
        self.report(SessionError::OutOfRange {
            index,
            total: self.position.total_chapters(),
        })
    }

    fn report(&mut self, error: SessionError) -> Vec<SessionEvent> {
        warn!("session error: {error}");
        vec![SessionEvent::SessionError {
            kind: error.kind(),
            recoverable: error.recoverable(),
        }]
    }

    /// Stop narration, flush progress and shut down the worker pool.
    /// In-flight loads are left to finish against a closed channel.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        let _ = self.narration.stop();
        self.progress.flush();
        for _ in 0..self.num_workers {
            let _ = self.request_tx.send(LoadRequest::Shutdown);
        }
    }

    #[cfg(test)]
    pub(crate) fn in_flight_chapters(&self) -> Vec<usize> {
        let mut v: Vec<usize> = self.in_flight.keys().copied().collect();
        v.sort_unstable();
        v
    }
}

impl Drop for SessionEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
