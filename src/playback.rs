//! Playback lifecycle for a single narration.
//!
//! The controller owns the one audio output context for the reading session
//! and drives the `Idle -> Loading -> Playing -> Paused` state machine. At
//! most one audio handle is ever connected: starting while a narration is
//! active is rejected rather than queued, and `stop()` is the only
//! cancellation primitive. The output context is opened lazily on the first
//! `start()` and torn down exactly once when the controller drops.

use crate::audio::{self, AudioBuffer, SOURCE_SAMPLE_RATE};
use crate::error::NarrationError;
use crate::speech::{MAX_NARRATION_CHARS, SpeechSource};
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, OutputStreamHandle, Sink};
use tracing::{debug, info, warn};

pub const MIN_PLAYBACK_RATE: f32 = 0.25;
pub const MAX_PLAYBACK_RATE: f32 = 3.0;

/// Lifecycle of the current narration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    Idle,
    Loading,
    Playing,
    Paused,
}

/// A connected buffer mid-playback. Pausing suspends the output clock
/// without discarding the buffer; halting disconnects for good.
pub trait AudioHandle {
    fn pause(&mut self);
    fn resume(&mut self);
    fn halt(&mut self);
    fn is_finished(&self) -> bool;
}

/// Owner of the audio output context. One per reading session.
pub trait AudioOutput {
    type Handle: AudioHandle;

    /// Connect a decoded buffer to the output at the given playback rate.
    fn begin(&mut self, buffer: AudioBuffer, rate: f32) -> Result<Self::Handle, NarrationError>;
}

/// Default output backed by the system audio device. The stream is opened
/// on the first narration and lives until the controller is dropped.
#[derive(Default)]
pub struct SystemAudioOutput {
    stream: Option<(OutputStream, OutputStreamHandle)>,
}

impl SystemAudioOutput {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&mut self) -> Result<&OutputStreamHandle, NarrationError> {
        if self.stream.is_none() {
            let opened = OutputStream::try_default()
                .map_err(|err| NarrationError::Unknown(format!("audio output: {err}")))?;
            debug!("Opened audio output stream");
            self.stream = Some(opened);
        }
        Ok(&self.stream.as_ref().unwrap().1)
    }
}

impl AudioOutput for SystemAudioOutput {
    type Handle = SinkHandle;

    fn begin(&mut self, buffer: AudioBuffer, rate: f32) -> Result<SinkHandle, NarrationError> {
        let channels = buffer.channel_count();
        let sample_rate = buffer.sample_rate();
        let samples = buffer.interleaved();
        let handle = self.handle()?;
        let sink = Sink::try_new(handle)
            .map_err(|err| NarrationError::Unknown(format!("audio sink: {err}")))?;
        sink.set_speed(rate);
        sink.append(SamplesBuffer::new(channels, sample_rate, samples));
        sink.play();
        Ok(SinkHandle { sink })
    }
}

pub struct SinkHandle {
    sink: Sink,
}

impl AudioHandle for SinkHandle {
    fn pause(&mut self) {
        self.sink.pause();
    }

    fn resume(&mut self) {
        self.sink.play();
    }

    fn halt(&mut self) {
        self.sink.stop();
    }

    fn is_finished(&self) -> bool {
        self.sink.empty()
    }
}

/// State machine owning the active narration for one reading session.
pub struct PlaybackController<S, O: AudioOutput> {
    source: S,
    output: O,
    status: PlaybackStatus,
    voice: String,
    rate: f32,
    active: Option<O::Handle>,
}

impl<S: SpeechSource, O: AudioOutput> PlaybackController<S, O> {
    pub fn new(source: S, output: O, voice: impl Into<String>, rate: f32) -> Self {
        Self {
            source,
            output,
            status: PlaybackStatus::Idle,
            voice: voice.into(),
            rate: rate.clamp(MIN_PLAYBACK_RATE, MAX_PLAYBACK_RATE),
            active: None,
        }
    }

    pub fn status(&self) -> PlaybackStatus {
        self.status
    }

    pub fn voice(&self) -> &str {
        &self.voice
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }

    pub fn set_voice(&mut self, voice: impl Into<String>) {
        self.voice = voice.into();
    }

    /// Takes effect on the next narration; audio already playing keeps the
    /// rate it started with.
    pub fn set_rate(&mut self, rate: f32) {
        self.rate = rate.clamp(MIN_PLAYBACK_RATE, MAX_PLAYBACK_RATE);
        info!(rate = self.rate, "Adjusted narration rate");
    }

    /// Begin narrating `text`. A no-op unless idle with non-blank text; any
    /// classified failure lands back in `Idle` and is returned to the
    /// caller to surface.
    pub fn start(&mut self, text: &str) -> Result<(), NarrationError> {
        if self.status != PlaybackStatus::Idle {
            debug!(status = ?self.status, "Narration already active; start rejected");
            return Ok(());
        }
        let text = text.trim();
        if text.is_empty() {
            debug!("No text to narrate; start rejected");
            return Ok(());
        }

        self.status = PlaybackStatus::Loading;
        let text = truncate_chars(text, MAX_NARRATION_CHARS);
        match self.load(text) {
            Ok(handle) => {
                self.active = Some(handle);
                self.status = PlaybackStatus::Playing;
                info!(voice = %self.voice, rate = self.rate, "Narration playing");
                Ok(())
            }
            Err(err) => {
                // A failure must never leave the controller in Loading.
                self.status = PlaybackStatus::Idle;
                warn!(kind = err.kind(), "Narration failed: {err}");
                Err(err)
            }
        }
    }

    fn load(&mut self, text: &str) -> Result<O::Handle, NarrationError> {
        let payload = self.source.fetch_narration(text, &self.voice)?;
        let bytes = audio::decode_base64(&payload)?;
        let buffer = audio::decode_audio_data(&bytes, SOURCE_SAMPLE_RATE, 1)?;
        if buffer.frame_count() == 0 {
            return Err(NarrationError::EmptyResponse);
        }
        debug!(frames = buffer.frame_count(), "Decoded narration buffer");
        self.output.begin(buffer, self.rate)
    }

    /// Suspend the output clock. The decoded buffer and its position stay
    /// attached for `resume()`.
    pub fn pause(&mut self) {
        if self.status != PlaybackStatus::Playing {
            return;
        }
        if let Some(handle) = self.active.as_mut() {
            handle.pause();
            self.status = PlaybackStatus::Paused;
            debug!("Narration paused");
        }
    }

    pub fn resume(&mut self) {
        if self.status != PlaybackStatus::Paused {
            return;
        }
        if let Some(handle) = self.active.as_mut() {
            handle.resume();
            self.status = PlaybackStatus::Playing;
            debug!("Narration resumed");
        }
    }

    /// Halt output and return to idle. Safe from any state; idempotent.
    /// Taking the handle here is what keeps late completions harmless:
    /// once discarded, there is nothing left for `finish_if_done` to see.
    pub fn stop(&mut self) {
        if let Some(mut handle) = self.active.take() {
            handle.halt();
            debug!("Narration stopped");
        }
        self.status = PlaybackStatus::Idle;
    }

    /// Poll for natural end of buffer. Returns true when the narration just
    /// completed and the controller moved back to idle.
    pub fn finish_if_done(&mut self) -> bool {
        if self.status != PlaybackStatus::Playing {
            return false;
        }
        let finished = self.active.as_ref().map(AudioHandle::is_finished);
        if finished == Some(true) {
            self.active = None;
            self.status = PlaybackStatus::Idle;
            info!("Narration finished");
            true
        } else {
            false
        }
    }
}

impl<S, O: AudioOutput> Drop for PlaybackController<S, O> {
    fn drop(&mut self) {
        if let Some(mut handle) = self.active.take() {
            handle.halt();
        }
        // The output context drops with the controller, closing it once.
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Scripted source for tests: yields a fixed payload or failure.
    pub(crate) struct ScriptedSource {
        pub(crate) result: Result<String, NarrationError>,
    }

    impl ScriptedSource {
        pub(crate) fn payload_of(samples: &[i16]) -> Self {
            let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
            Self {
                result: Ok(crate::audio::encode_base64(&bytes)),
            }
        }

        pub(crate) fn failing(err: NarrationError) -> Self {
            Self { result: Err(err) }
        }
    }

    impl SpeechSource for ScriptedSource {
        fn fetch_narration(&self, _text: &str, _voice: &str) -> Result<String, NarrationError> {
            self.result.clone()
        }
    }

    #[derive(Clone, Default)]
    pub(crate) struct FakeControls {
        pub(crate) begun: Rc<Cell<u32>>,
        pub(crate) paused: Rc<Cell<bool>>,
        pub(crate) halted: Rc<Cell<bool>>,
        pub(crate) finished: Rc<Cell<bool>>,
        pub(crate) last_rate: Rc<Cell<f32>>,
        pub(crate) last_frames: Rc<Cell<usize>>,
        pub(crate) last_sample_rate: Rc<Cell<u32>>,
        pub(crate) last_channels: Rc<Cell<u16>>,
    }

    /// Output that records what was connected instead of making sound.
    #[derive(Clone, Default)]
    pub(crate) struct FakeOutput {
        pub(crate) controls: FakeControls,
    }

    pub(crate) struct FakeHandle {
        controls: FakeControls,
    }

    impl AudioOutput for FakeOutput {
        type Handle = FakeHandle;

        fn begin(&mut self, buffer: AudioBuffer, rate: f32) -> Result<FakeHandle, NarrationError> {
            let c = &self.controls;
            c.begun.set(c.begun.get() + 1);
            c.paused.set(false);
            c.halted.set(false);
            c.finished.set(false);
            c.last_rate.set(rate);
            c.last_frames.set(buffer.frame_count());
            c.last_sample_rate.set(buffer.sample_rate());
            c.last_channels.set(buffer.channel_count());
            Ok(FakeHandle {
                controls: self.controls.clone(),
            })
        }
    }

    impl AudioHandle for FakeHandle {
        fn pause(&mut self) {
            self.controls.paused.set(true);
        }

        fn resume(&mut self) {
            self.controls.paused.set(false);
        }

        fn halt(&mut self) {
            self.controls.halted.set(true);
        }

        fn is_finished(&self) -> bool {
            self.controls.finished.get()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fakes::{FakeOutput, ScriptedSource};
    use super::*;

    fn controller(
        source: ScriptedSource,
    ) -> (
        PlaybackController<ScriptedSource, FakeOutput>,
        super::fakes::FakeControls,
    ) {
        let output = FakeOutput::default();
        let controls = output.controls.clone();
        (PlaybackController::new(source, output, "Kore", 1.0), controls)
    }

    #[test]
    fn happy_path_runs_idle_loading_playing_idle() {
        let (mut pc, controls) = controller(ScriptedSource::payload_of(&[1, 2, 3, 4]));
        assert_eq!(pc.status(), PlaybackStatus::Idle);

        pc.start("Hello world").unwrap();
        assert_eq!(pc.status(), PlaybackStatus::Playing);
        assert_eq!(controls.begun.get(), 1);
        assert!(controls.last_frames.get() > 0);
        assert_eq!(controls.last_sample_rate.get(), 24_000);
        assert_eq!(controls.last_channels.get(), 1);
        assert_eq!(controls.last_rate.get(), 1.0);

        // Natural end of buffer.
        assert!(!pc.finish_if_done());
        controls.finished.set(true);
        assert!(pc.finish_if_done());
        assert_eq!(pc.status(), PlaybackStatus::Idle);
    }

    #[test]
    fn start_while_active_is_rejected_without_state_change() {
        let (mut pc, controls) = controller(ScriptedSource::payload_of(&[1, 2]));
        pc.start("page one").unwrap();
        assert_eq!(pc.status(), PlaybackStatus::Playing);

        pc.start("page two").unwrap();
        assert_eq!(pc.status(), PlaybackStatus::Playing);
        assert_eq!(controls.begun.get(), 1);

        pc.pause();
        pc.start("page two").unwrap();
        assert_eq!(pc.status(), PlaybackStatus::Paused);
        assert_eq!(controls.begun.get(), 1);
    }

    #[test]
    fn blank_text_is_rejected() {
        let (mut pc, controls) = controller(ScriptedSource::payload_of(&[1]));
        pc.start("   \n ").unwrap();
        assert_eq!(pc.status(), PlaybackStatus::Idle);
        assert_eq!(controls.begun.get(), 0);
    }

    #[test]
    fn pause_and_resume_keep_the_same_handle() {
        let (mut pc, controls) = controller(ScriptedSource::payload_of(&[5, 6, 7]));
        pc.start("text").unwrap();

        pc.pause();
        assert_eq!(pc.status(), PlaybackStatus::Paused);
        assert!(controls.paused.get());

        pc.resume();
        assert_eq!(pc.status(), PlaybackStatus::Playing);
        assert!(!controls.paused.get());
        // No reallocation: still the single buffer connected at start.
        assert_eq!(controls.begun.get(), 1);
    }

    #[test]
    fn stop_is_idempotent_from_any_state() {
        let (mut pc, controls) = controller(ScriptedSource::payload_of(&[5, 6]));
        pc.stop();
        assert_eq!(pc.status(), PlaybackStatus::Idle);

        pc.start("text").unwrap();
        pc.stop();
        assert_eq!(pc.status(), PlaybackStatus::Idle);
        assert!(controls.halted.get());
        pc.stop();
        assert_eq!(pc.status(), PlaybackStatus::Idle);

        pc.start("text").unwrap();
        pc.pause();
        pc.stop();
        assert_eq!(pc.status(), PlaybackStatus::Idle);
    }

    #[test]
    fn completion_after_stop_does_not_fire() {
        let (mut pc, controls) = controller(ScriptedSource::payload_of(&[5, 6]));
        pc.start("text").unwrap();
        pc.stop();
        // Buffer "finishes" after the explicit stop; the handle is gone, so
        // the completion must not transition anything.
        controls.finished.set(true);
        assert!(!pc.finish_if_done());
        assert_eq!(pc.status(), PlaybackStatus::Idle);
    }

    #[test]
    fn failures_during_loading_always_return_to_idle() {
        for err in [
            NarrationError::Offline,
            NarrationError::KeyMissing,
            NarrationError::KeyInvalid,
            NarrationError::QuotaExceeded,
            NarrationError::Network("reset".into()),
            NarrationError::EmptyResponse,
            NarrationError::Unknown("?".into()),
        ] {
            let (mut pc, _) = controller(ScriptedSource::failing(err.clone()));
            assert_eq!(pc.start("text"), Err(err));
            assert_eq!(pc.status(), PlaybackStatus::Idle);
        }
    }

    #[test]
    fn malformed_payload_is_a_decode_error() {
        let (mut pc, _) = controller(ScriptedSource {
            result: Ok("!!not-base64!!".into()),
        });
        assert!(matches!(
            pc.start("text"),
            Err(NarrationError::Decode(_))
        ));
        assert_eq!(pc.status(), PlaybackStatus::Idle);
    }

    #[test]
    fn empty_audio_payload_is_an_empty_response() {
        let (mut pc, _) = controller(ScriptedSource {
            result: Ok(String::new()),
        });
        assert_eq!(pc.start("text"), Err(NarrationError::EmptyResponse));
        assert_eq!(pc.status(), PlaybackStatus::Idle);
    }

    #[test]
    fn rate_changes_apply_to_the_next_narration_only() {
        let (mut pc, controls) = controller(ScriptedSource::payload_of(&[1, 2]));
        pc.start("text").unwrap();
        assert_eq!(controls.last_rate.get(), 1.0);

        pc.set_rate(1.5);
        // Still playing at the old rate; nothing reconnected.
        assert_eq!(controls.begun.get(), 1);
        assert_eq!(controls.last_rate.get(), 1.0);

        pc.stop();
        pc.start("next page").unwrap();
        assert_eq!(controls.last_rate.get(), 1.5);
    }

    #[test]
    fn rate_is_clamped() {
        let (mut pc, _) = controller(ScriptedSource::payload_of(&[1]));
        pc.set_rate(99.0);
        assert_eq!(pc.rate(), MAX_PLAYBACK_RATE);
        pc.set_rate(0.0);
        assert_eq!(pc.rate(), MIN_PLAYBACK_RATE);
    }

    #[test]
    fn long_text_is_truncated_to_the_request_limit() {
        assert_eq!(truncate_chars("abc", 5), "abc");
        let long = "x".repeat(2000);
        assert_eq!(truncate_chars(&long, MAX_NARRATION_CHARS).chars().count(), 1500);
        // Multi-byte boundaries stay intact.
        let accented = "é".repeat(2000);
        let cut = truncate_chars(&accented, MAX_NARRATION_CHARS);
        assert_eq!(cut.chars().count(), 1500);
    }
}
