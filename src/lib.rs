//! Reading-session and narration core for the Lumina e-book reader.
//!
//! The rendering engines (PDF and EPUB), the library UI, and the key-value
//! store behind the book collection all live outside this crate. What lives
//! here is the part worth getting right once:
//!
//! - decoding the speech service's base64 16-bit PCM payloads into playable
//!   buffers ([`audio`]),
//! - the one HTTP narration call and its failure taxonomy ([`speech`],
//!   [`error`]),
//! - the playback state machine that guarantees a single active narration
//!   per session ([`playback`]),
//! - persisted reading positions and the last-opened-book pointer
//!   ([`progress`]),
//! - bookmarks keyed by exact location equality ([`book`]),
//! - and the per-book session gluing those together behind the renderer
//!   seam ([`session`], [`renderer`]).

pub mod audio;
pub mod book;
pub mod config;
pub mod error;
pub mod playback;
pub mod progress;
pub mod renderer;
pub mod session;
pub mod speech;
pub mod telemetry;

pub use audio::{AudioBuffer, SOURCE_SAMPLE_RATE, decode_audio_data, decode_base64};
pub use book::{Book, BookFormat, Bookmark, Library, Location};
pub use config::{LogLevel, ReaderConfig, load_config};
pub use error::NarrationError;
pub use playback::{
    AudioHandle, AudioOutput, PlaybackController, PlaybackStatus, SystemAudioOutput,
};
pub use progress::{ProgressEntry, ProgressStore, progress_fraction};
pub use renderer::{Appearance, ColorMode, FontFamily, PageRenderer, RendererEvent};
pub use session::{Notice, Overlay, ReaderSession};
pub use speech::{DEFAULT_VOICE, MAX_NARRATION_CHARS, SpeechClient, SpeechSource};
