//! Books, locations, and bookmarks.
//!
//! A location is a page number for PDF and an opaque CFI token for EPUB; the
//! variant is dictated by the book's format. Bookmark identity is by id, but
//! "is this spot bookmarked" is exact location equality, so EPUB bookmarks
//! only survive as long as the renderer keeps emitting byte-identical CFI
//! strings (a known correctness risk, not something this module can repair).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookFormat {
    Pdf,
    Epub,
}

impl std::fmt::Display for BookFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            BookFormat::Pdf => "pdf",
            BookFormat::Epub => "epub",
        };
        write!(f, "{}", label)
    }
}

/// A point within a book, as reported by the format's renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Location {
    Page(u32),
    Cfi(String),
}

impl Location {
    pub fn as_page(&self) -> Option<u32> {
        match self {
            Location::Page(page) => Some(*page),
            Location::Cfi(_) => None,
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Location::Page(page) => write!(f, "page {page}"),
            Location::Cfi(cfi) => write!(f, "{cfi}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: String,
    pub label: String,
    pub location: Location,
    /// Unix millis at creation.
    pub timestamp: u64,
}

/// An imported book. The payload bytes are opaque to the core; they are
/// handed to the external renderer untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: String,
    pub title: String,
    pub author: String,
    pub format: BookFormat,
    #[serde(skip)]
    pub data: Vec<u8>,
    /// Unix millis at import.
    pub added_at: u64,
    #[serde(default)]
    pub bookmarks: Vec<Bookmark>,
}

impl Book {
    /// Build a book from an imported file. Returns `None` for anything that
    /// is not a `.pdf` or `.epub`.
    pub fn from_import(file_name: &str, data: Vec<u8>) -> Option<Book> {
        let lower = file_name.to_ascii_lowercase();
        let format = if lower.ends_with(".pdf") {
            BookFormat::Pdf
        } else if lower.ends_with(".epub") {
            BookFormat::Epub
        } else {
            return None;
        };
        let title = file_name
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(file_name)
            .to_string();
        let added_at = unix_millis();
        let id = digest_id(&title, added_at, data.len() as u64);
        info!(%format, %title, bytes = data.len(), "Imported book");
        Some(Book {
            id,
            title,
            author: "Unknown author".to_string(),
            format,
            data,
            added_at,
            bookmarks: Vec::new(),
        })
    }

    pub fn is_bookmarked(&self, location: &Location) -> bool {
        self.bookmarks.iter().any(|b| &b.location == location)
    }

    /// Add a bookmark at `location`, or remove the existing one if that
    /// exact location is already bookmarked.
    pub fn toggle_bookmark(&mut self, location: &Location) {
        if let Some(idx) = self.bookmarks.iter().position(|b| &b.location == location) {
            let removed = self.bookmarks.remove(idx);
            debug!(id = %removed.id, location = %location, "Removed bookmark");
            return;
        }
        let timestamp = unix_millis();
        let label = match location {
            Location::Page(page) => format!("Page {page}"),
            Location::Cfi(_) => format!("Marker {}", self.bookmarks.len() + 1),
        };
        let id = digest_id(&format!("{location}"), timestamp, self.bookmarks.len() as u64);
        debug!(%id, location = %location, "Added bookmark");
        self.bookmarks.push(Bookmark {
            id,
            label,
            location: location.clone(),
            timestamp,
        });
    }

    /// Remove a bookmark by id; no-op when absent.
    pub fn remove_bookmark(&mut self, id: &str) {
        self.bookmarks.retain(|b| b.id != id);
    }
}

/// The in-memory book collection behind the library view. Storage of the
/// collection itself is an external concern.
#[derive(Debug, Default)]
pub struct Library {
    books: Vec<Book>,
}

impl Library {
    pub fn new(books: Vec<Book>) -> Self {
        Self { books }
    }

    pub fn books(&self) -> &[Book] {
        &self.books
    }

    pub fn get(&self, id: &str) -> Option<&Book> {
        self.books.iter().find(|b| b.id == id)
    }

    /// Insert a new book, or replace the stored copy of an existing one.
    pub fn upsert(&mut self, book: Book) {
        match self.books.iter_mut().find(|b| b.id == book.id) {
            Some(existing) => *existing = book,
            None => self.books.push(book),
        }
    }

    pub fn remove(&mut self, id: &str) {
        self.books.retain(|b| b.id != id);
    }
}

pub(crate) fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn digest_id(seed: &str, timestamp: u64, salt: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hasher.update(timestamp.to_le_bytes());
    hasher.update(salt.to_le_bytes());
    let hash = format!("{:x}", hasher.finalize());
    hash[..16].to_string()
}
