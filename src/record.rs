//! The persisted book record the loader reads and updates.
//!
//! Storage is the host's business. The loader only needs the narrow
//! [`BookRecord`] surface, and [`MemoryBookRecord`] covers the CLI and tests.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::chapters::ChapterTable;

/// Where the reader left off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(serde::Serialize))]
pub struct ReadingPosition {
    pub chapter: usize,
    pub page: usize,
}

/// Library record of one book.
///
/// Methods are called from worker threads with the record locked, so
/// implementations should not block on other locks.
pub trait BookRecord: Send {
    /// Encoding label remembered from an earlier load.
    fn persisted_encoding(&self) -> Option<String>;

    fn set_persisted_encoding(&mut self, label: &str);

    /// The chapter table stored with the record, if any.
    fn chapter_table(&self) -> Option<ChapterTable>;

    fn set_chapter_table(&mut self, table: ChapterTable);

    fn has_non_empty_chapter_table(&self) -> bool {
        self.chapter_table().is_some_and(|table| !table.is_empty())
    }

    /// True when the stored chapter table must be rebuilt.
    fn needs_refresh(&self) -> bool;

    fn clear_refresh_flag(&mut self);

    /// True when the book is in the library. Untracked books are opened
    /// ad hoc and never saved.
    fn is_tracked(&self) -> bool;

    /// Save the record with its new chapter table.
    fn persist(&mut self, table: &ChapterTable, refreshed_at: u64);

    fn reading_position(&self) -> ReadingPosition;
}

/// A record shared between the loader and its worker jobs.
pub type SharedRecord = Arc<Mutex<dyn BookRecord>>;

/// In-memory [`BookRecord`].
#[derive(Debug, Clone, Default)]
pub struct MemoryBookRecord {
    pub encoding: Option<String>,
    pub chapters: Option<ChapterTable>,
    pub needs_refresh: bool,
    pub tracked: bool,
    pub position: ReadingPosition,
    /// Timestamp passed to the last [`BookRecord::persist`].
    pub last_refreshed: Option<u64>,
    /// Number of [`BookRecord::persist`] calls.
    pub save_count: usize,
}

impl MemoryBookRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_encoding(mut self, label: impl Into<String>) -> Self {
        self.encoding = Some(label.into());
        self
    }

    pub fn with_chapters(mut self, table: ChapterTable) -> Self {
        self.chapters = Some(table);
        self
    }

    pub fn with_needs_refresh(mut self, needs_refresh: bool) -> Self {
        self.needs_refresh = needs_refresh;
        self
    }

    pub fn tracked(mut self, tracked: bool) -> Self {
        self.tracked = tracked;
        self
    }

    pub fn with_position(mut self, chapter: usize, page: usize) -> Self {
        self.position = ReadingPosition { chapter, page };
        self
    }

    /// Wrap into a [`SharedRecord`], keeping a typed handle for inspection.
    pub fn shared(self) -> (Arc<Mutex<MemoryBookRecord>>, SharedRecord) {
        let typed = Arc::new(Mutex::new(self));
        let shared: SharedRecord = typed.clone();
        (typed, shared)
    }
}

impl BookRecord for MemoryBookRecord {
    fn persisted_encoding(&self) -> Option<String> {
        self.encoding.clone()
    }

    fn set_persisted_encoding(&mut self, label: &str) {
        self.encoding = Some(label.to_string());
    }

    fn chapter_table(&self) -> Option<ChapterTable> {
        self.chapters.clone()
    }

    fn set_chapter_table(&mut self, table: ChapterTable) {
        self.chapters = Some(table);
    }

    fn has_non_empty_chapter_table(&self) -> bool {
        self.chapters.as_ref().is_some_and(|table| !table.is_empty())
    }

    fn needs_refresh(&self) -> bool {
        self.needs_refresh
    }

    fn clear_refresh_flag(&mut self) {
        self.needs_refresh = false;
    }

    fn is_tracked(&self) -> bool {
        self.tracked
    }

    fn persist(&mut self, _table: &ChapterTable, refreshed_at: u64) {
        self.last_refreshed = Some(refreshed_at);
        self.save_count += 1;
    }

    fn reading_position(&self) -> ReadingPosition {
        self.position
    }
}
