//! # folio
//!
//! Chapter loading for paginated EPUB readers.
//!
//! ## Features
//!
//! - Lazy EPUB archive access: the manifest and spine are read at open time,
//!   content is read and inflated only when asked for
//! - Charset detection for books in GBK, Big5, Shift_JIS and other legacy
//!   encodings
//! - Chapter tables titled from each unit's `<title>`
//! - Plain-text chapter extraction with paragraph indentation
//! - A cancellable background loader with a listener interface
//!
//! ## Quick Start
//!
//! ```no_run
//! use folio::{Document, WebTextFormatter, build_chapter_table, extract_chapter_text, resolve_encoding};
//!
//! let doc = Document::open("book.epub").unwrap();
//! let encoding = resolve_encoding(&doc);
//! let table = build_chapter_table(&doc, encoding, "Cover").unwrap();
//!
//! for entry in &table {
//!     println!("{:>3} {}", entry.index, entry.title);
//! }
//!
//! let unit = doc.unit(1).unwrap();
//! let text = extract_chapter_text(&unit, encoding, &WebTextFormatter).unwrap();
//! println!("{text}");
//! ```
//!
//! ## Background Loading
//!
//! [`PageLoader`] runs the same steps on tokio's blocking pool and reports
//! back through a [`PageListener`]. Outcomes are applied when the owner
//! dispatches them, so callbacks always run on the owner's task:
//!
//! ```no_run
//! use folio::{
//!     ChapterTable, LoaderOptions, MemoryBookRecord, PageListener, PageLoader, ParseErrorKind,
//!     ReadingPosition,
//! };
//!
//! struct Printer;
//!
//! impl PageListener for Printer {
//!     fn on_chapter_table_ready(&mut self, table: &ChapterTable) {
//!         println!("{} chapters", table.len());
//!     }
//!     fn on_parse_error(&mut self, kind: ParseErrorKind) {
//!         eprintln!("{kind}");
//!     }
//!     fn skip_to_chapter(&mut self, position: ReadingPosition) {
//!         println!("resume at chapter {}", position.chapter);
//!     }
//! }
//!
//! # async fn run() {
//! let (_, record) = MemoryBookRecord::new().shared();
//! let mut loader = PageLoader::new("book.epub", record, Box::new(Printer), LoaderOptions::default());
//! loader.refresh_chapter_list();
//! loader.dispatch_next().await;
//!
//! if let Some(entry) = loader.chapter_table().and_then(|t| t.get(1)).cloned() {
//!     let text = loader.chapter_content(&entry).await.unwrap();
//!     println!("{text}");
//! }
//! # }
//! ```

pub mod chapters;
pub mod dom;
pub mod encoding;
pub mod epub;
pub mod error;
pub mod extract;
pub mod io;
pub mod loader;
pub mod record;
pub(crate) mod util;

pub use chapters::{ChapterEntry, ChapterTable, build_chapter_table};
pub use encoding::{charset_hint, detect, resolve_encoding};
pub use epub::{ContentUnit, Document, PackageMetadata};
pub use error::{BuildError, ExtractError, MarkupError, OpenError, ParseErrorKind};
pub use extract::{TextFormatter, WebTextFormatter, extract_chapter_text};
pub use io::{ByteSource, FileSource, MemorySource};
pub use loader::{LoadState, LoaderOptions, PageListener, PageLoader};
pub use record::{BookRecord, MemoryBookRecord, ReadingPosition, SharedRecord};
