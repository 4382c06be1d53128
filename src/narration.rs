//! Narration bridge: read-aloud state machine and progress translation

use log::{debug, warn};

use crate::chapter::PaginatedChapter;
use crate::error::SessionError;

/// Read-aloud playback state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NarrationState {
    Stopped,
    Playing,
    Paused,
}

/// Commands accepted by the external narration subsystem.
pub trait Narrator: Send {
    fn play(&mut self, content: &str, start_offset: usize);
    fn pause(&mut self);
    fn resume(&mut self);
    fn stop(&mut self);
}

/// A narrator that discards every command, for sessions without read-aloud.
#[derive(Default)]
pub struct NullNarrator;

impl Narrator for NullNarrator {
    fn play(&mut self, _content: &str, _start_offset: usize) {}
    fn pause(&mut self) {}
    fn resume(&mut self) {}
    fn stop(&mut self) {}
}

/// Events emitted by the narration subsystem, delivered to the session on
/// its owner thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NarrationEvent {
    Started,
    Paused,
    Stopped,
    /// Char offset within the current chapter's raw content
    Progress { char_offset: usize },
    ChapterFinished,
}

/// Owns the narration state machine. Holds no reference to position state;
/// translation results flow back through the session's serialized entry
/// points, never by mutating shared fields.
pub struct NarrationBridge {
    state: NarrationState,
    narrator: Box<dyn Narrator>,
    /// Set when a chapter roll happened while narration was live but the new
    /// current chapter was not yet resident; re-arm happens when it lands.
    pending_rearm: bool,
}

impl NarrationBridge {
    pub fn new(narrator: Box<dyn Narrator>) -> Self {
        Self {
            state: NarrationState::Stopped,
            narrator,
            pending_rearm: false,
        }
    }

    #[must_use]
    pub fn state(&self) -> NarrationState {
        self.state
    }

    /// User "read aloud" toggle. Starting requires the current chapter to be
    /// loaded; without it the command is a no-op. Returns the new state when
    /// it changed.
    pub fn toggle(
        &mut self,
        current: Option<&PaginatedChapter>,
        page_index: usize,
    ) -> Option<NarrationState> {
        match self.state {
            NarrationState::Stopped => {
                let chapter = current?;
                let start = chapter.offset_at_page(page_index);
                self.narrator.play(&chapter.chapter.content, start);
                self.transition(NarrationState::Playing)
            }
            NarrationState::Playing => {
                self.narrator.pause();
                self.transition(NarrationState::Paused)
            }
            NarrationState::Paused => {
                self.narrator.resume();
                self.transition(NarrationState::Playing)
            }
        }
    }

    /// Explicit stop, also used on leaving the reading session.
    pub fn stop(&mut self) -> Option<NarrationState> {
        self.pending_rearm = false;
        if self.state == NarrationState::Stopped {
            return None;
        }
        self.narrator.stop();
        self.transition(NarrationState::Stopped)
    }

    /// External state signals (interruptions, playback acks). Progress and
    /// chapter-finished events are handled by the session, which owns the
    /// position they translate into.
    pub fn on_event(&mut self, event: NarrationEvent) -> Option<NarrationState> {
        match event {
            NarrationEvent::Started => self.transition(NarrationState::Playing),
            NarrationEvent::Paused if self.state == NarrationState::Playing => {
                self.transition(NarrationState::Paused)
            }
            NarrationEvent::Stopped => {
                self.pending_rearm = false;
                self.transition(NarrationState::Stopped)
            }
            _ => None,
        }
    }

    /// React to the current chapter changing. A jump that invalidated the
    /// buffer kills narration; a single-step roll re-arms it against the new
    /// chapter, immediately if resident, otherwise once its load lands.
    pub fn on_chapter_changed(
        &mut self,
        invalidated: bool,
        current: Option<&PaginatedChapter>,
    ) -> Option<NarrationState> {
        if self.state == NarrationState::Stopped {
            return None;
        }
        if invalidated {
            debug!("narration stopped: buffer invalidated by navigation");
            return self.stop();
        }
        match current {
            Some(chapter) => {
                self.rearm(chapter);
                None
            }
            None => {
                self.pending_rearm = true;
                None
            }
        }
    }

    /// Called when the current slot becomes ready; completes a deferred
    /// re-arm from a chapter roll.
    pub fn on_current_ready(&mut self, chapter: &PaginatedChapter) {
        if self.pending_rearm {
            self.pending_rearm = false;
            self.rearm(chapter);
        }
    }

    /// Restart live narration at a manually chosen page, preserving a
    /// paused state. No-op while stopped.
    pub fn seek(&mut self, chapter: &PaginatedChapter, page_index: usize) {
        if self.state == NarrationState::Stopped {
            return;
        }
        let start = chapter.offset_at_page(page_index);
        self.narrator.play(&chapter.chapter.content, start);
        if self.state == NarrationState::Paused {
            self.narrator.pause();
        }
    }

    fn rearm(&mut self, chapter: &PaginatedChapter) {
        debug!("re-arming narration on chapter {}", chapter.index());
        self.narrator.play(&chapter.chapter.content, 0);
        if self.state == NarrationState::Paused {
            self.narrator.pause();
        }
    }

    /// Translate a narration char offset into a page index. An offset
    /// outside any known page clamps to the last page and reports the
    /// desync; it never fails the session.
    pub fn page_for_progress(
        &self,
        chapter: &PaginatedChapter,
        char_offset: usize,
    ) -> (usize, Option<SessionError>) {
        match chapter.page_for_offset(char_offset) {
            Some(page) => (page, None),
            None => {
                warn!(
                    "narration offset {char_offset} beyond chapter {} ({} chars), clamping",
                    chapter.index(),
                    chapter.content_chars()
                );
                (
                    chapter.last_page_index(),
                    Some(SessionError::NarrationDesync {
                        chapter_index: chapter.index(),
                        char_offset,
                    }),
                )
            }
        }
    }

    fn transition(&mut self, to: NarrationState) -> Option<NarrationState> {
        if self.state == to {
            return None;
        }
        self.state = to;
        Some(to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chapter::{Chapter, Page};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recording(Arc<Mutex<Vec<String>>>);

    impl Recording {
        fn calls(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    impl Narrator for Recording {
        fn play(&mut self, _content: &str, start_offset: usize) {
            self.0.lock().unwrap().push(format!("play@{start_offset}"));
        }
        fn pause(&mut self) {
            self.0.lock().unwrap().push("pause".into());
        }
        fn resume(&mut self) {
            self.0.lock().unwrap().push("resume".into());
        }
        fn stop(&mut self) {
            self.0.lock().unwrap().push("stop".into());
        }
    }

    fn chapter(index: usize) -> PaginatedChapter {
        let content = "a".repeat(100);
        let pages = vec![
            Page {
                text: String::new(),
                offset_start: 0,
            },
            Page {
                text: String::new(),
                offset_start: 40,
            },
        ];
        PaginatedChapter::new(Chapter::new(index, "t", content), pages)
    }

    #[test]
    fn toggle_requires_loaded_chapter() {
        let rec = Recording::default();
        let mut bridge = NarrationBridge::new(Box::new(rec.clone()));

        assert_eq!(bridge.toggle(None, 0), None);
        assert_eq!(bridge.state(), NarrationState::Stopped);
        assert!(rec.calls().is_empty());
    }

    #[test]
    fn toggle_cycles_play_pause_resume() {
        let rec = Recording::default();
        let mut bridge = NarrationBridge::new(Box::new(rec.clone()));
        let ch = chapter(0);

        assert_eq!(bridge.toggle(Some(&ch), 1), Some(NarrationState::Playing));
        assert_eq!(bridge.toggle(Some(&ch), 1), Some(NarrationState::Paused));
        assert_eq!(bridge.toggle(Some(&ch), 1), Some(NarrationState::Playing));
        assert_eq!(rec.calls(), vec!["play@40", "pause", "resume"]);
    }

    #[test]
    fn jump_navigation_stops_narration() {
        let rec = Recording::default();
        let mut bridge = NarrationBridge::new(Box::new(rec.clone()));
        let ch = chapter(0);
        bridge.toggle(Some(&ch), 0);

        let changed = bridge.on_chapter_changed(true, None);
        assert_eq!(changed, Some(NarrationState::Stopped));
        assert_eq!(rec.calls(), vec!["play@0", "stop"]);
    }

    #[test]
    fn single_step_roll_rearms_on_new_chapter() {
        let rec = Recording::default();
        let mut bridge = NarrationBridge::new(Box::new(rec.clone()));
        bridge.toggle(Some(&chapter(0)), 0);

        let next = chapter(1);
        assert_eq!(bridge.on_chapter_changed(false, Some(&next)), None);
        assert_eq!(bridge.state(), NarrationState::Playing);
        assert_eq!(rec.calls(), vec!["play@0", "play@0"]);
    }

    #[test]
    fn roll_with_absent_chapter_defers_rearm_until_ready() {
        let rec = Recording::default();
        let mut bridge = NarrationBridge::new(Box::new(rec.clone()));
        bridge.toggle(Some(&chapter(0)), 0);

        bridge.on_chapter_changed(false, None);
        assert_eq!(rec.calls(), vec!["play@0"]);

        bridge.on_current_ready(&chapter(1));
        assert_eq!(rec.calls(), vec!["play@0", "play@0"]);

        // A second ready notification does not re-arm again
        bridge.on_current_ready(&chapter(1));
        assert_eq!(rec.calls().len(), 2);
    }

    #[test]
    fn paused_narration_rearms_paused() {
        let rec = Recording::default();
        let mut bridge = NarrationBridge::new(Box::new(rec.clone()));
        let ch = chapter(0);
        bridge.toggle(Some(&ch), 0);
        bridge.toggle(Some(&ch), 0); // now paused

        bridge.on_chapter_changed(false, Some(&chapter(1)));
        assert_eq!(bridge.state(), NarrationState::Paused);
        assert_eq!(rec.calls(), vec!["play@0", "pause", "play@0", "pause"]);
    }

    #[test]
    fn seek_restarts_at_the_page_offset_and_keeps_pause() {
        let rec = Recording::default();
        let mut bridge = NarrationBridge::new(Box::new(rec.clone()));
        let ch = chapter(0);

        bridge.seek(&ch, 1); // stopped: nothing happens
        assert!(rec.calls().is_empty());

        bridge.toggle(Some(&ch), 0);
        bridge.toggle(Some(&ch), 0); // paused
        bridge.seek(&ch, 1);
        assert_eq!(rec.calls(), vec!["play@0", "pause", "play@40", "pause"]);
        assert_eq!(bridge.state(), NarrationState::Paused);
    }

    #[test]
    fn progress_beyond_content_clamps_and_reports_desync() {
        let bridge = NarrationBridge::new(Box::new(NullNarrator));
        let ch = chapter(2);

        let (page, err) = bridge.page_for_progress(&ch, 50);
        assert_eq!(page, 1);
        assert!(err.is_none());

        let (page, err) = bridge.page_for_progress(&ch, 100_000);
        assert_eq!(page, ch.last_page_index());
        assert!(matches!(
            err,
            Some(SessionError::NarrationDesync {
                chapter_index: 2,
                ..
            })
        ));
    }
}
