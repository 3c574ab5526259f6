//! Seam between the core and the external page/chapter renderers.
//!
//! The PDF and EPUB engines live outside this crate. Each is wrapped once
//! behind the same narrow capability set: it emits extracted text and a
//! location on every page change, accepts a jump to a saved position, and
//! takes an appearance configuration that has no behavioral effect on the
//! core. Which wrapper to construct is decided by `Book::format`.

use crate::book::{BookFormat, Location};
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Notifications flowing from the renderer into the session, in page-visit
/// order.
#[derive(Debug, Clone, PartialEq)]
pub enum RendererEvent {
    /// Full text of the newly visible page or view.
    TextExtracted(String),
    /// The reader navigated; `total_extent` is the page count when the
    /// renderer knows one (PDF does, EPUB does not).
    LocationChanged {
        location: Location,
        total_extent: Option<u32>,
    },
}

/// Commands the session issues back to whichever renderer is active.
pub trait PageRenderer {
    fn format(&self) -> BookFormat;

    /// Navigate to a saved or bookmarked position.
    fn jump_to(&mut self, location: &Location) -> Result<()>;

    /// Display-only typography and color settings.
    fn apply_appearance(&mut self, appearance: &Appearance);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColorMode {
    Light,
    Sepia,
    Dark,
}

impl Default for ColorMode {
    fn default() -> Self {
        ColorMode::Light
    }
}

impl std::fmt::Display for ColorMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ColorMode::Light => "Light",
            ColorMode::Sepia => "Sepia",
            ColorMode::Dark => "Dark",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FontFamily {
    Serif,
    Sans,
}

impl Default for FontFamily {
    fn default() -> Self {
        FontFamily::Serif
    }
}

impl std::fmt::Display for FontFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            FontFamily::Serif => "Serif",
            FontFamily::Sans => "Sans",
        };
        write!(f, "{}", label)
    }
}

/// Pure display configuration handed to the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Appearance {
    pub color_mode: ColorMode,
    pub font_family: FontFamily,
    pub line_height: f32,
    pub letter_spacing: f32,
}

impl Default for Appearance {
    fn default() -> Self {
        Appearance {
            color_mode: ColorMode::default(),
            font_family: FontFamily::default(),
            line_height: 1.6,
            letter_spacing: 0.0,
        }
    }
}
