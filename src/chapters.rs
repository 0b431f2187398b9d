//! Chapter table construction.
//!
//! Every spine unit becomes one chapter, in spine order. Titles come from the
//! unit's `<title>` element; the lead unit always gets a fixed label.

use std::sync::atomic::{AtomicBool, Ordering};

use encoding_rs::Encoding;
use log::{info, warn};

use crate::dom::parse_markup;
use crate::encoding::decode_markup;
use crate::epub::{ContentUnit, Document};
use crate::error::BuildError;
use crate::util::collapse_whitespace;

/// Default title of chapter 0.
pub const DEFAULT_LEAD_UNIT_LABEL: &str = "Cover";

/// One chapter of a book.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(serde::Serialize))]
pub struct ChapterEntry {
    /// Position in the spine, starting at 0.
    pub index: usize,
    /// Archive path of the spine unit.
    pub source_ref: String,
    /// Display title. Empty when the unit has no usable `<title>`.
    pub title: String,
}

/// Ordered chapters of a book, indexed `0..len()` in spine order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(serde::Serialize))]
#[cfg_attr(feature = "cli", serde(transparent))]
pub struct ChapterTable {
    entries: Vec<ChapterEntry>,
}

impl ChapterTable {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ChapterEntry> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChapterEntry> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[ChapterEntry] {
        &self.entries
    }
}

impl From<Vec<ChapterEntry>> for ChapterTable {
    fn from(entries: Vec<ChapterEntry>) -> Self {
        Self { entries }
    }
}

impl<'a> IntoIterator for &'a ChapterTable {
    type Item = &'a ChapterEntry;
    type IntoIter = std::slice::Iter<'a, ChapterEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Build the chapter table of `document`.
///
/// A unit whose bytes cannot be read still gets an entry, with an empty
/// title. Fails with [`BuildError::Empty`] when the spine is empty.
pub fn build_chapter_table(
    document: &Document,
    encoding: &'static Encoding,
    lead_unit_label: &str,
) -> Result<ChapterTable, BuildError> {
    build_chapter_table_cancellable(document, encoding, lead_unit_label, &AtomicBool::new(false))
}

/// [`build_chapter_table`] that stops with [`BuildError::Cancelled`] once
/// `cancel` is set. The flag is checked before each unit.
pub(crate) fn build_chapter_table_cancellable(
    document: &Document,
    encoding: &'static Encoding,
    lead_unit_label: &str,
    cancel: &AtomicBool,
) -> Result<ChapterTable, BuildError> {
    let mut entries = Vec::with_capacity(document.len());

    for unit in document.units() {
        if cancel.load(Ordering::Relaxed) {
            return Err(BuildError::Cancelled);
        }

        let title = if unit.index() == 0 {
            lead_unit_label.to_string()
        } else {
            unit_title(&unit, encoding)
        };

        entries.push(ChapterEntry {
            index: unit.index(),
            source_ref: unit.href().to_string(),
            title,
        });
    }

    if entries.is_empty() {
        return Err(BuildError::Empty);
    }

    info!("built chapter table with {} entries", entries.len());
    Ok(ChapterTable::from(entries))
}

/// Text of the unit's first `<title>` element, or empty.
fn unit_title(unit: &ContentUnit<'_>, encoding: &'static Encoding) -> String {
    let bytes = match unit.data() {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("cannot read {} for its title: {e}", unit.href());
            return String::new();
        }
    };

    let dom = parse_markup(&decode_markup(&bytes, encoding));
    dom.find_by_tag("title")
        .map(|title| collapse_whitespace(&dom.text_content(title)))
        .unwrap_or_default()
}
