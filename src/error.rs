//! Error types for folio operations.

use std::io;

use thiserror::Error;

/// Errors that can occur while opening a packaged document.
#[derive(Error, Debug)]
pub enum OpenError {
    /// The underlying storage could not be opened or read.
    #[error("unreadable document: {0}")]
    Unreadable(#[from] io::Error),

    /// The container or package document could not be parsed.
    #[error("corrupt document: {0}")]
    Corrupt(String),
}

impl From<zip::result::ZipError> for OpenError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) => OpenError::Unreadable(e),
            other => OpenError::Corrupt(other.to_string()),
        }
    }
}

impl From<quick_xml::Error> for OpenError {
    fn from(err: quick_xml::Error) -> Self {
        OpenError::Corrupt(format!("XML parsing error: {err}"))
    }
}

/// Errors that can occur while building the chapter table.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildError {
    /// The spine produced no chapters.
    #[error("document has no chapters")]
    Empty,

    /// The build was abandoned because the book was closed.
    #[error("chapter table build cancelled")]
    Cancelled,
}

/// Errors that can occur while extracting one chapter's text.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// The unit's bytes could not be read or inflated.
    #[error("cannot decode {href}: {reason}")]
    Decode { href: String, reason: String },

    /// The requested chapter index is past the end of the spine.
    #[error("chapter index {index} out of range (chapter count: {len})")]
    OutOfRange { index: usize, len: usize },

    /// The chapter table has not been loaded yet.
    #[error("chapter table is not ready")]
    NotReady,

    /// The book was closed while the request was pending.
    #[error("book is closed")]
    Closed,

    /// The worker running the extraction panicked or was shut down.
    #[error("extraction worker failed: {0}")]
    Worker(String),
}

/// Why markup could not be read as well-formed XML.
///
/// Never surfaced to callers: such markup goes through the HTML parser.
#[derive(Error, Debug)]
pub enum MarkupError {
    #[error(transparent)]
    Xml(#[from] quick_xml::Error),

    /// A named entity with no XML or common HTML definition.
    #[error("undefined entity &{0};")]
    UndefinedEntity(String),

    /// The document ended with elements still open.
    #[error("unclosed element <{0}>")]
    Unclosed(String),
}

/// Why a load attempt ended in the parse-error state.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    #[error("the document file could not be read")]
    Unreadable,

    #[error("the document is not a valid package")]
    Corrupt,

    #[error("the document has no chapters")]
    Empty,

    #[error("the load worker failed")]
    Worker,
}

impl From<&OpenError> for ParseErrorKind {
    fn from(err: &OpenError) -> Self {
        match err {
            OpenError::Unreadable(_) => ParseErrorKind::Unreadable,
            OpenError::Corrupt(_) => ParseErrorKind::Corrupt,
        }
    }
}
