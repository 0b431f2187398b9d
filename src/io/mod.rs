//! Random-access byte sources backing an opened archive.
//!
//! Archive entries are read on demand with positional reads, so a single
//! [`ByteSource`] can serve worker threads without a shared cursor.

mod adapter;
mod byte_source;

pub use adapter::ByteSourceCursor;
pub use byte_source::{ByteSource, FileSource, MemorySource};
