//! One reading session per open book.
//!
//! The session is the sole owner of the playback controller (and through it
//! the audio output context), which makes the "at most one narration
//! pipeline" rule structural instead of conventional. It consumes renderer
//! events, keeps only the most recently extracted page text, persists every
//! location change, and turns classified narration failures into notices
//! with the right display policy.

use crate::book::{Book, BookFormat, Location};
use crate::config::ReaderConfig;
use crate::error::NarrationError;
use crate::playback::{AudioOutput, PlaybackController, PlaybackStatus};
use crate::progress::ProgressStore;
use crate::renderer::RendererEvent;
use crate::speech::SpeechSource;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Which overlay is open, if any. A single value instead of independent
/// flags, so overlays are mutually exclusive by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Overlay {
    #[default]
    None,
    Bookmarks,
    Settings,
    Voice,
}

/// A user-visible failure banner. Credential problems have no expiry and
/// stay until an explicit credential action; everything else times out.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub error: NarrationError,
    expires_at: Option<Instant>,
}

impl Notice {
    fn new(error: NarrationError, now: Instant, transient_for: Duration) -> Self {
        let expires_at = if error.is_persistent() {
            None
        } else {
            Some(now + transient_for)
        };
        Notice { error, expires_at }
    }

    pub fn is_persistent(&self) -> bool {
        self.expires_at.is_none()
    }

    pub fn message(&self) -> String {
        self.error.to_string()
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Session state for one open book.
pub struct ReaderSession<S: SpeechSource, O: AudioOutput> {
    book_id: String,
    format: BookFormat,
    playback: PlaybackController<S, O>,
    store: ProgressStore,
    pending_jump: Option<Location>,
    page_text: Option<String>,
    location: Option<Location>,
    progress: Option<f32>,
    overlay: Overlay,
    chrome_hidden: bool,
    notice: Option<Notice>,
    transient_notice: Duration,
}

impl<S: SpeechSource, O: AudioOutput> ReaderSession<S, O> {
    /// Open a session on `book`. The saved position is looked up once, here,
    /// and handed out once via `take_initial_jump`.
    pub fn open(
        book: &Book,
        config: &ReaderConfig,
        source: S,
        output: O,
        store: ProgressStore,
    ) -> Self {
        let pending_jump = store.saved_location(&book.id);
        if let Some(location) = &pending_jump {
            info!(book_id = %book.id, %location, "Resuming from saved position");
        }
        Self {
            book_id: book.id.clone(),
            format: book.format,
            playback: PlaybackController::new(
                source,
                output,
                config.voice.clone(),
                config.playback_rate,
            ),
            store,
            pending_jump,
            page_text: None,
            location: None,
            progress: None,
            overlay: Overlay::None,
            chrome_hidden: false,
            notice: None,
            transient_notice: notice_window(config.transient_notice_secs),
        }
    }

    pub fn book_id(&self) -> &str {
        &self.book_id
    }

    pub fn format(&self) -> BookFormat {
        self.format
    }

    /// The saved location to hand to the renderer's `jump_to`, yielded at
    /// most once so re-renders never fight user navigation.
    pub fn take_initial_jump(&mut self) -> Option<Location> {
        self.pending_jump.take()
    }

    /// Feed a renderer notification into the session.
    pub fn handle_event(&mut self, event: RendererEvent) {
        match event {
            RendererEvent::TextExtracted(text) => {
                // Most recent page wins; nothing is queued for narration.
                self.page_text = Some(text);
            }
            RendererEvent::LocationChanged {
                location,
                total_extent,
            } => {
                self.progress =
                    self.store
                        .on_location_changed(&self.book_id, location.clone(), total_extent);
                debug!(%location, progress = ?self.progress, "Location changed");
                self.location = Some(location);
            }
        }
    }

    /// Narrate the most recently extracted page text. Rejected silently if
    /// a narration is already active (stop first); classified failures
    /// become a notice.
    pub fn narrate(&mut self) {
        let Some(text) = self.page_text.clone() else {
            debug!("No extracted text yet; nothing to narrate");
            return;
        };
        if let Err(err) = self.playback.start(&text) {
            self.notice = Some(Notice::new(err, Instant::now(), self.transient_notice));
        }
    }

    pub fn pause(&mut self) {
        self.playback.pause();
    }

    pub fn resume(&mut self) {
        self.playback.resume();
    }

    pub fn stop(&mut self) {
        self.playback.stop();
    }

    pub fn playback_status(&self) -> PlaybackStatus {
        self.playback.status()
    }

    /// Applies to the next narration, not audio already playing.
    pub fn set_playback_rate(&mut self, rate: f32) {
        self.playback.set_rate(rate);
    }

    pub fn set_voice(&mut self, voice: impl Into<String>) {
        self.playback.set_voice(voice);
    }

    /// Drive time-based transitions: natural end of buffer and notice
    /// expiry. Front ends call this from their tick/animation loop.
    pub fn tick(&mut self, now: Instant) {
        self.playback.finish_if_done();
        if self.notice.as_ref().is_some_and(|n| n.is_expired(now)) {
            self.notice = None;
        }
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    /// Called after the user picks or re-enters a credential; this is the
    /// only way a persistent notice goes away.
    pub fn acknowledge_credentials(&mut self) {
        if self.notice.as_ref().is_some_and(Notice::is_persistent) {
            self.notice = None;
        }
    }

    pub fn overlay(&self) -> Overlay {
        self.overlay
    }

    pub fn set_overlay(&mut self, overlay: Overlay) {
        self.overlay = overlay;
    }

    /// Zen mode: hide all chrome. Opening an overlay leaves zen mode.
    pub fn toggle_chrome(&mut self) {
        self.chrome_hidden = !self.chrome_hidden;
        if self.chrome_hidden {
            self.overlay = Overlay::None;
        }
    }

    pub fn chrome_hidden(&self) -> bool {
        self.chrome_hidden
    }

    pub fn location(&self) -> Option<&Location> {
        self.location.as_ref()
    }

    /// Displayable fraction from the latest numeric location, when known.
    pub fn progress(&self) -> Option<f32> {
        self.progress
    }

    pub fn page_text(&self) -> Option<&str> {
        self.page_text.as_deref()
    }
}

/// Configs built by hand may carry values `clamp_config` never saw;
/// `Duration::from_secs_f32` panics on non-finite input, so sanitize here.
fn notice_window(secs: f32) -> Duration {
    let secs = if secs.is_finite() {
        secs.clamp(1.0, 30.0)
    } else {
        4.0
    };
    Duration::from_secs_f32(secs)
}

impl<S: SpeechSource, O: AudioOutput> Drop for ReaderSession<S, O> {
    fn drop(&mut self) {
        // Playback (and with it the output context) tears down with the
        // controller; stopping first silences output immediately.
        self.playback.stop();
        debug!(book_id = %self.book_id, "Reader session closed");
    }
}
