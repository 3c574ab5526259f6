//! Persisted reading positions.
//!
//! One TOML file under the store root holds everything: the id of the book
//! that was open most recently, and a per-book `{location, last_read}`
//! record. Last write wins; no history is kept. Write failures are logged
//! and swallowed at the tracker API, matching the assumption that a durable
//! local map does not fail.

use crate::book::{Location, unix_millis};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const PROGRESS_FILE: &str = "progress.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub location: Location,
    /// Unix millis of the last location write.
    pub last_read: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ProgressFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_opened: Option<String>,
    #[serde(default)]
    books: BTreeMap<String, ProgressEntry>,
}

/// Tracker for per-book reading positions.
#[derive(Debug, Clone)]
pub struct ProgressStore {
    root: PathBuf,
}

impl ProgressStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Persist the latest location for a book, overwriting any prior entry,
    /// and point the last-opened marker at it. Returns the displayable
    /// progress fraction when one exists for this location.
    pub fn on_location_changed(
        &self,
        book_id: &str,
        location: Location,
        total_extent: Option<u32>,
    ) -> Option<f32> {
        let fraction = progress_fraction(&location, total_extent);
        let mut file = self.load();
        file.books.insert(
            book_id.to_string(),
            ProgressEntry {
                location,
                last_read: unix_millis(),
            },
        );
        file.last_opened = Some(book_id.to_string());
        if let Err(err) = self.save(&file) {
            warn!(book_id, "Failed to persist reading position: {err:#}");
        }
        fraction
    }

    /// The saved position for a book, if any. Callers apply this once per
    /// book-open (see `ReaderSession::take_initial_jump`); re-applying on
    /// every render would fight user navigation.
    pub fn saved_location(&self, book_id: &str) -> Option<Location> {
        self.entry(book_id).map(|entry| entry.location)
    }

    pub fn entry(&self, book_id: &str) -> Option<ProgressEntry> {
        self.load().books.remove(book_id)
    }

    /// Most recently active book, used to default-open on app start.
    pub fn last_opened_book_id(&self) -> Option<String> {
        self.load().last_opened
    }

    /// Drop a book's record, e.g. when it is deleted from the library.
    pub fn clear(&self, book_id: &str) {
        let mut file = self.load();
        if file.books.remove(book_id).is_none() {
            return;
        }
        if file.last_opened.as_deref() == Some(book_id) {
            file.last_opened = None;
        }
        if let Err(err) = self.save(&file) {
            warn!(book_id, "Failed to clear reading position: {err:#}");
        }
    }

    fn path(&self) -> PathBuf {
        self.root.join(PROGRESS_FILE)
    }

    fn load(&self) -> ProgressFile {
        let path = self.path();
        match read_progress(&path) {
            Ok(Some(file)) => file,
            Ok(None) => ProgressFile::default(),
            Err(err) => {
                warn!(path = %path.display(), "Unreadable progress file, starting fresh: {err:#}");
                ProgressFile::default()
            }
        }
    }

    fn save(&self, file: &ProgressFile) -> Result<()> {
        fs::create_dir_all(&self.root).context("Creating progress store directory")?;
        let contents = toml::to_string(file).context("Serializing progress map")?;
        fs::write(self.path(), contents).context("Writing progress map")?;
        debug!(books = file.books.len(), "Saved reading progress");
        Ok(())
    }
}

fn read_progress(path: &Path) -> Result<Option<ProgressFile>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = fs::read_to_string(path).context("Reading progress map")?;
    let file = toml::from_str(&data).context("Parsing progress map")?;
    Ok(Some(file))
}

/// Fraction in [0, 1] for display. Only numeric page locations with a known
/// total extent produce one; CFI locations never do.
pub fn progress_fraction(location: &Location, total_extent: Option<u32>) -> Option<f32> {
    let page = location.as_page()?;
    let total = total_extent.filter(|t| *t > 0)?;
    Some((page as f32 / total as f32).clamp(0.0, 1.0))
}
