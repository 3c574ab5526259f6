//! Reader configuration.
//!
//! All user-tunable settings are centralized here and loaded from a TOML
//! file if present. Any missing or invalid entries fall back to sensible
//! defaults so a front end can always start.

use crate::playback::{MAX_PLAYBACK_RATE, MIN_PLAYBACK_RATE};
use crate::renderer::{Appearance, ColorMode, FontFamily};
use crate::speech::DEFAULT_VOICE;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Reader-session configuration; deserializable from TOML.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReaderConfig {
    #[serde(default = "default_voice")]
    pub voice: String,
    #[serde(default = "default_playback_rate")]
    pub playback_rate: f32,
    #[serde(default)]
    pub color_mode: ColorMode,
    #[serde(default)]
    pub font_family: FontFamily,
    #[serde(default = "default_line_height")]
    pub line_height: f32,
    #[serde(default)]
    pub letter_spacing: f32,
    #[serde(default = "default_notice_secs")]
    pub transient_notice_secs: f32,
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        ReaderConfig {
            voice: default_voice(),
            playback_rate: default_playback_rate(),
            color_mode: ColorMode::default(),
            font_family: FontFamily::default(),
            line_height: default_line_height(),
            letter_spacing: 0.0,
            transient_notice_secs: default_notice_secs(),
            log_level: default_log_level(),
        }
    }
}

impl ReaderConfig {
    /// Display settings in the shape the renderer seam expects.
    pub fn appearance(&self) -> Appearance {
        Appearance {
            color_mode: self.color_mode,
            font_family: self.font_family,
            line_height: self.line_height,
            letter_spacing: self.letter_spacing,
        }
    }
}

/// Load configuration from the given path, falling back to defaults on
/// error. Out-of-range values are clamped rather than rejected.
pub fn load_config(path: &Path) -> ReaderConfig {
    let contents = match fs::read_to_string(path) {
        Ok(data) => {
            info!(path = %path.display(), "Loaded reader config");
            data
        }
        Err(err) => {
            warn!(
                path = %path.display(),
                "Falling back to default config: {err}"
            );
            return ReaderConfig::default();
        }
    };

    match toml::from_str::<ReaderConfig>(&contents) {
        Ok(mut cfg) => {
            debug!("Parsed configuration from disk");
            clamp_config(&mut cfg);
            cfg
        }
        Err(err) => {
            warn!(path = %path.display(), "Invalid config TOML: {err}");
            ReaderConfig::default()
        }
    }
}

pub fn clamp_config(config: &mut ReaderConfig) {
    if config.voice.trim().is_empty() {
        config.voice = default_voice();
    }
    config.playback_rate = config
        .playback_rate
        .clamp(MIN_PLAYBACK_RATE, MAX_PLAYBACK_RATE);
    config.line_height = config.line_height.clamp(1.0, 2.5);
    config.letter_spacing = config.letter_spacing.clamp(0.0, 3.0);
    config.transient_notice_secs = config.transient_notice_secs.clamp(1.0, 30.0);
}

fn default_voice() -> String {
    DEFAULT_VOICE.to_string()
}

fn default_playback_rate() -> f32 {
    1.0
}

fn default_line_height() -> f32 {
    1.6
}

fn default_notice_secs() -> f32 {
    4.0
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

/// Supported logging verbosity levels.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_filter_str())
    }
}

impl LogLevel {
    pub fn as_filter_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}
