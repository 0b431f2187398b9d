//! EPUB archive reading.

mod archive;
mod parser;

pub use archive::{ContentUnit, Document};
pub use parser::PackageMetadata;
