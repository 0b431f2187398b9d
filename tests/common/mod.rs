//! EPUB fixtures built in memory.
#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::PathBuf;

use tempfile::TempDir;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

/// An XHTML document with an optional `<title>`.
pub fn xhtml(title: Option<&str>, body: &str) -> String {
    let title = title
        .map(|t| format!("<title>{t}</title>"))
        .unwrap_or_default();
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
         <html xmlns=\"http://www.w3.org/1999/xhtml\">\
         <head>{title}</head><body>{body}</body></html>"
    )
}

struct Unit {
    id: String,
    href: String,
    /// `None` leaves the unit out of the archive.
    bytes: Option<Vec<u8>>,
}

/// Builds a minimal EPUB 2 package: `OEBPS/content.opf` plus spine units.
#[derive(Default)]
pub struct EpubBuilder {
    title: String,
    units: Vec<Unit>,
    assets: Vec<(String, Vec<u8>)>,
    guide_cover: Option<String>,
    dangling_itemrefs: Vec<String>,
}

impl EpubBuilder {
    pub fn new() -> Self {
        Self {
            title: "Test Book".to_string(),
            ..Self::default()
        }
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    /// Add a spine unit at `OEBPS/<href>`.
    pub fn unit(self, id: &str, href: &str, markup: &str) -> Self {
        self.unit_bytes(id, href, markup.as_bytes().to_vec())
    }

    pub fn unit_bytes(mut self, id: &str, href: &str, bytes: Vec<u8>) -> Self {
        self.units.push(Unit {
            id: id.to_string(),
            href: href.to_string(),
            bytes: Some(bytes),
        });
        self
    }

    /// Add a spine unit that the manifest names but the archive lacks.
    pub fn missing_unit(mut self, id: &str, href: &str) -> Self {
        self.units.push(Unit {
            id: id.to_string(),
            href: href.to_string(),
            bytes: None,
        });
        self
    }

    /// Add a spine itemref with no manifest item.
    pub fn dangling_itemref(mut self, idref: &str) -> Self {
        self.dangling_itemrefs.push(idref.to_string());
        self
    }

    /// Add a non-spine entry at `OEBPS/<href>`.
    pub fn asset(mut self, href: &str, bytes: &[u8]) -> Self {
        self.assets.push((href.to_string(), bytes.to_vec()));
        self
    }

    /// Add a `<guide>` cover reference.
    pub fn guide_cover(mut self, href: &str) -> Self {
        self.guide_cover = Some(href.to_string());
        self
    }

    fn opf(&self) -> String {
        let mut manifest = String::new();
        let mut spine = String::new();
        for unit in &self.units {
            manifest.push_str(&format!(
                "    <item id=\"{}\" href=\"{}\" media-type=\"application/xhtml+xml\"/>\n",
                unit.id, unit.href
            ));
            spine.push_str(&format!("    <itemref idref=\"{}\"/>\n", unit.id));
        }
        for idref in &self.dangling_itemrefs {
            spine.push_str(&format!("    <itemref idref=\"{idref}\"/>\n"));
        }
        for (i, (href, _)) in self.assets.iter().enumerate() {
            manifest.push_str(&format!(
                "    <item id=\"asset{i}\" href=\"{href}\" media-type=\"application/octet-stream\"/>\n"
            ));
        }
        let guide = self
            .guide_cover
            .as_ref()
            .map(|href| {
                format!("  <guide>\n    <reference type=\"cover\" title=\"Cover\" href=\"{href}\"/>\n  </guide>\n")
            })
            .unwrap_or_default();

        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>{title}</dc:title>
    <dc:creator>Test Author</dc:creator>
    <dc:language>en</dc:language>
    <dc:identifier id="uid">urn:uuid:00000000-0000-0000-0000-000000000000</dc:identifier>
  </metadata>
  <manifest>
{manifest}  </manifest>
  <spine>
{spine}  </spine>
{guide}</package>"#,
            title = self.title
        )
    }

    /// Serialize to EPUB bytes.
    pub fn build(&self) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let stored = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        let deflated =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        zip.start_file("mimetype", stored).unwrap();
        zip.write_all(b"application/epub+zip").unwrap();

        zip.start_file("META-INF/container.xml", deflated).unwrap();
        zip.write_all(CONTAINER_XML.as_bytes()).unwrap();

        zip.start_file("OEBPS/content.opf", deflated).unwrap();
        zip.write_all(self.opf().as_bytes()).unwrap();

        for unit in &self.units {
            let Some(bytes) = &unit.bytes else { continue };
            let path = percent_encoding::percent_decode_str(&unit.href)
                .decode_utf8()
                .unwrap()
                .into_owned();
            zip.start_file(format!("OEBPS/{path}"), deflated).unwrap();
            zip.write_all(bytes).unwrap();
        }

        for (href, bytes) in &self.assets {
            zip.start_file(format!("OEBPS/{href}"), stored).unwrap();
            zip.write_all(bytes).unwrap();
        }

        zip.finish().unwrap().into_inner()
    }

    /// Write to `book.epub` inside `dir`.
    pub fn write(&self, dir: &TempDir) -> PathBuf {
        let path = dir.path().join("book.epub");
        std::fs::write(&path, self.build()).unwrap();
        path
    }
}

/// The three-unit book used throughout: a titled cover, a chapter with two
/// paragraphs, and a unit with no text.
pub fn three_unit_book() -> EpubBuilder {
    EpubBuilder::new()
        .unit(
            "cover",
            "Text/cover.xhtml",
            &xhtml(Some("Front Cover"), "<div><img src=\"../Images/cover.jpg\"/></div>"),
        )
        .unit(
            "c1",
            "Text/chapter1.xhtml",
            &xhtml(Some("Chapter One"), "<p>Hello</p>\n<p>World</p>"),
        )
        .unit("c2", "Text/chapter2.xhtml", &xhtml(None, "<div><img src=\"../Images/map.png\"/></div>"))
        .asset("Images/cover.jpg", b"\xFF\xD8\xFF\xE0jpeg")
}
