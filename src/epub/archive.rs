//! Lazily read EPUB archives.
//!
//! Opening a [`Document`] scans the ZIP central directory and parses the
//! container and package documents. Nothing else is read until a content
//! unit or asset is requested, so images, audio and stylesheets cost nothing
//! unless someone asks for them.

use std::collections::HashMap;
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;

use log::{info, warn};
use zip::ZipArchive;

use super::parser::{PackageMetadata, parse_container_xml, parse_opf, resolve_href};
use crate::error::{ExtractError, OpenError};
use crate::io::{ByteSource, ByteSourceCursor, FileSource, MemorySource};

const CONTAINER_PATH: &str = "META-INF/container.xml";

/// Deflate never expands more than this, so a larger declared size is forged.
const MAX_DEFLATE_RATIO: u64 = 1032;

/// Upper bound on the buffer reserved up front for one inflated entry.
const MAX_PREALLOC: u64 = 16 * 1024 * 1024;

/// An opened packaged document.
///
/// `Document` is `Send + Sync`: entry reads are positional and never touch
/// shared state, so extraction may run on any worker thread.
pub struct Document {
    source: Arc<dyn ByteSource>,

    /// ZIP entry locations, keyed by archive path.
    entries: HashMap<String, EntryLoc>,

    metadata: PackageMetadata,

    /// Reading order, with hrefs resolved to archive paths.
    spine: Vec<SpineItem>,

    /// Spine position of the cover/title unit.
    lead: Option<usize>,

    /// Archive path of the package document.
    package_path: String,
}

#[derive(Debug, Clone, Copy)]
struct EntryLoc {
    /// Offset of the entry data within the archive.
    data_offset: u64,
    compressed_size: u64,
    uncompressed_size: u64,
    /// 0 = stored, 8 = deflate.
    compression: u16,
}

#[derive(Debug, Clone)]
struct SpineItem {
    id: String,
    path: String,
    media_type: String,
    linear: bool,
}

/// One spine entry of a [`Document`].
///
/// Holding a `ContentUnit` reads nothing; call [`ContentUnit::data`] to load
/// its bytes.
#[derive(Clone, Copy)]
pub struct ContentUnit<'a> {
    document: &'a Document,
    index: usize,
    item: &'a SpineItem,
}

impl Document {
    /// Open a document from local storage.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, OpenError> {
        let file = std::fs::File::open(path.as_ref())?;
        let source = Arc::new(FileSource::new(file)?);
        let document = Self::from_source(source)?;
        info!(
            "opened {} ({} spine units)",
            path.as_ref().display(),
            document.len()
        );
        Ok(document)
    }

    /// Open a document held in memory.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, OpenError> {
        Self::from_source(Arc::new(MemorySource::new(data)))
    }

    /// Open a document from any random-access byte source.
    pub fn from_source(source: Arc<dyn ByteSource>) -> Result<Self, OpenError> {
        // 1. Scan the central directory once and remember where entries live
        let mut archive = ZipArchive::new(ByteSourceCursor::new(source.clone()))?;
        let mut entries = HashMap::with_capacity(archive.len());
        for i in 0..archive.len() {
            let file = archive.by_index_raw(i)?;
            if file.is_dir() {
                continue;
            }
            entries.insert(
                file.name().to_string(),
                EntryLoc {
                    data_offset: file.data_start(),
                    compressed_size: file.compressed_size(),
                    uncompressed_size: file.size(),
                    compression: compression_to_u16(file.compression()),
                },
            );
        }

        // 2. Locate and parse the package document
        let container = read_entry(&source, &entries, CONTAINER_PATH).map_err(corrupt)?;
        let package_path = parse_container_xml(&container)?;
        let package_bytes = read_entry(&source, &entries, &package_path).map_err(corrupt)?;
        let package = parse_opf(&package_bytes)?;

        let base_dir = package_path
            .rsplit_once('/')
            .map(|(dir, _)| dir)
            .unwrap_or_default();

        // 3. Resolve the spine against the manifest
        let mut spine = Vec::with_capacity(package.spine.len());
        for spine_ref in &package.spine {
            let Some(item) = package.manifest.get(&spine_ref.idref) else {
                warn!("spine item '{}' is not in the manifest, skipping", spine_ref.idref);
                continue;
            };
            spine.push(SpineItem {
                id: spine_ref.idref.clone(),
                path: resolve_href(base_dir, &item.href),
                media_type: item.media_type.clone(),
                linear: spine_ref.linear,
            });
        }

        // 4. The guide's cover reference names the lead unit when it is in the spine
        let lead = package
            .cover_href
            .map(|href| resolve_href(base_dir, &href))
            .and_then(|path| spine.iter().position(|item| item.path == path))
            .or_else(|| (!spine.is_empty()).then_some(0));

        Ok(Self {
            source,
            entries,
            metadata: package.metadata,
            spine,
            lead,
            package_path,
        })
    }

    pub fn metadata(&self) -> &PackageMetadata {
        &self.metadata
    }

    /// Archive path of the package document.
    pub fn package_path(&self) -> &str {
        &self.package_path
    }

    /// Number of spine units.
    pub fn len(&self) -> usize {
        self.spine.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spine.is_empty()
    }

    /// Look up the spine unit at `index`.
    pub fn unit(&self, index: usize) -> Result<ContentUnit<'_>, ExtractError> {
        self.spine
            .get(index)
            .map(|item| ContentUnit {
                document: self,
                index,
                item,
            })
            .ok_or(ExtractError::OutOfRange {
                index,
                len: self.spine.len(),
            })
    }

    /// Spine units in reading order.
    pub fn units(&self) -> impl ExactSizeIterator<Item = ContentUnit<'_>> + '_ {
        self.spine
            .iter()
            .enumerate()
            .map(move |(index, item)| ContentUnit {
                document: self,
                index,
                item,
            })
    }

    /// The cover/title unit used for charset detection.
    ///
    /// This is the guide's `cover` reference when it points into the spine,
    /// otherwise the first spine unit.
    pub fn lead_unit(&self) -> Option<ContentUnit<'_>> {
        self.lead.and_then(|index| self.unit(index).ok())
    }

    /// Archive paths of every entry, in no particular order.
    pub fn assets(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.keys().map(String::as_str)
    }

    /// Read any archive entry by path.
    pub fn asset(&self, path: &str) -> io::Result<Vec<u8>> {
        read_entry(&self.source, &self.entries, path)
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("package_path", &self.package_path)
            .field("spine_len", &self.spine.len())
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl<'a> ContentUnit<'a> {
    /// Position of this unit in the spine.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Manifest id.
    pub fn id(&self) -> &'a str {
        &self.item.id
    }

    /// Archive path of the unit, e.g. `OEBPS/Text/chapter1.xhtml`.
    pub fn href(&self) -> &'a str {
        &self.item.path
    }

    pub fn media_type(&self) -> &'a str {
        &self.item.media_type
    }

    /// False for spine items marked `linear="no"`.
    pub fn is_linear(&self) -> bool {
        self.item.linear
    }

    /// Read and inflate the unit's bytes.
    pub fn data(&self) -> io::Result<Vec<u8>> {
        self.document.asset(&self.item.path)
    }
}

impl std::fmt::Debug for ContentUnit<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentUnit")
            .field("index", &self.index)
            .field("href", &self.item.path)
            .field("media_type", &self.item.media_type)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// ZIP Helpers
// ----------------------------------------------------------------------------

fn read_entry(
    source: &Arc<dyn ByteSource>,
    entries: &HashMap<String, EntryLoc>,
    path: &str,
) -> io::Result<Vec<u8>> {
    let loc = match entries.get(path) {
        Some(loc) => loc,
        None => {
            // Fallback: hrefs are often percent-encoded while entry names are not
            let decoded = percent_encoding::percent_decode_str(path)
                .decode_utf8()
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            entries.get(decoded.as_ref()).ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("file not found in archive: {path}"),
                )
            })?
        }
    };

    let compressed = source.read_at(loc.data_offset, loc.compressed_size as usize)?;

    match loc.compression {
        0 => Ok(compressed),
        8 => {
            let mut decoder = flate2::read::DeflateDecoder::new(&compressed[..]);
            // The declared size comes from the archive and only sizes the hint.
            let hint = loc
                .uncompressed_size
                .min(loc.compressed_size.saturating_mul(MAX_DEFLATE_RATIO))
                .min(MAX_PREALLOC);
            let mut out = Vec::with_capacity(hint as usize);
            decoder.read_to_end(&mut out)?;
            Ok(out)
        }
        method => Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("unsupported compression method {method} for {path}"),
        )),
    }
}

fn corrupt(err: io::Error) -> OpenError {
    match err.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::InvalidData | io::ErrorKind::Unsupported => {
            OpenError::Corrupt(err.to_string())
        }
        _ => OpenError::Unreadable(err),
    }
}

fn compression_to_u16(method: zip::CompressionMethod) -> u16 {
    match method {
        zip::CompressionMethod::Stored => 0,
        zip::CompressionMethod::Deflated => 8,
        _ => 255,
    }
}
