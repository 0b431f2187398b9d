//! OCF container and OPF package parsing.

use std::collections::HashMap;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::OpenError;
use crate::util::resolve_xml_entity;

/// Dublin Core metadata from the package document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageMetadata {
    pub title: String,
    pub authors: Vec<String>,
    pub language: String,
    pub identifier: String,
}

/// A manifest `<item>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ManifestItem {
    pub href: String,
    pub media_type: String,
}

/// A spine `<itemref>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SpineRef {
    pub idref: String,
    pub linear: bool,
}

/// Parsed OPF package. Hrefs are relative to the package document.
#[derive(Debug, Default)]
pub(crate) struct Package {
    pub metadata: PackageMetadata,
    pub manifest: HashMap<String, ManifestItem>,
    pub spine: Vec<SpineRef>,
    /// Href of the `<guide>` reference typed `cover`, if any.
    pub cover_href: Option<String>,
}

/// Parse `META-INF/container.xml` and return the package document path.
pub(crate) fn parse_container_xml(bytes: &[u8]) -> Result<String, OpenError> {
    let content = std::str::from_utf8(strip_bom(bytes))
        .map_err(|e| OpenError::Corrupt(format!("container.xml is not UTF-8: {e}")))?;

    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event()? {
            Event::Empty(e) | Event::Start(e) if local_name(e.name().as_ref()) == b"rootfile" => {
                if let Some(path) = attr_value(&e, b"full-path") {
                    return Ok(path);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Err(OpenError::Corrupt(
        "no rootfile found in container.xml".into(),
    ))
}

/// Parse the OPF package document.
pub(crate) fn parse_opf(bytes: &[u8]) -> Result<Package, OpenError> {
    let content = std::str::from_utf8(strip_bom(bytes))
        .map_err(|e| OpenError::Corrupt(format!("package document is not UTF-8: {e}")))?;

    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut package = Package::default();
    let mut in_metadata = false;
    let mut current_field: Option<&'static str> = None;
    let mut buf_text = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = e.name();
                match local_name(name.as_ref()) {
                    b"metadata" => in_metadata = true,
                    b"title" if in_metadata => current_field = Some("title"),
                    b"creator" if in_metadata => current_field = Some("creator"),
                    b"language" if in_metadata => current_field = Some("language"),
                    b"identifier" if in_metadata => current_field = Some("identifier"),
                    // Some packages write `<item ...></item>` instead of self-closing.
                    _ => handle_empty(&e, &mut package),
                }
                if current_field.is_some() {
                    buf_text.clear();
                }
            }
            Event::Empty(e) => handle_empty(&e, &mut package),
            Event::Text(e) => {
                if current_field.is_some() {
                    buf_text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Event::GeneralRef(e) => {
                if current_field.is_some() {
                    let entity = String::from_utf8_lossy(e.as_ref());
                    if let Some(resolved) = resolve_xml_entity(&entity) {
                        buf_text.push_str(&resolved);
                    }
                }
            }
            Event::End(e) => {
                let name = e.name();
                if local_name(name.as_ref()) == b"metadata" {
                    in_metadata = false;
                }
                if let Some(field) = current_field.take() {
                    let value = buf_text.trim().to_string();
                    let metadata = &mut package.metadata;
                    match field {
                        "title" if metadata.title.is_empty() => metadata.title = value,
                        "creator" => metadata.authors.push(value),
                        "language" if metadata.language.is_empty() => metadata.language = value,
                        "identifier" if metadata.identifier.is_empty() => {
                            metadata.identifier = value
                        }
                        _ => {}
                    }
                    buf_text.clear();
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(package)
}

/// Handle the attribute-only package elements: manifest items, spine
/// itemrefs and guide references.
fn handle_empty(e: &BytesStart<'_>, package: &mut Package) {
    let name = e.name();
    match local_name(name.as_ref()) {
        b"item" => {
            let (Some(id), Some(href)) = (attr_value(e, b"id"), attr_value(e, b"href")) else {
                return;
            };
            let media_type = attr_value(e, b"media-type").unwrap_or_default();
            package.manifest.insert(id, ManifestItem { href, media_type });
        }
        b"itemref" => {
            if let Some(idref) = attr_value(e, b"idref") {
                let linear = attr_value(e, b"linear").is_none_or(|v| v != "no");
                package.spine.push(SpineRef { idref, linear });
            }
        }
        b"reference" => {
            let is_cover = attr_value(e, b"type")
                .is_some_and(|t| t.eq_ignore_ascii_case("cover"));
            if is_cover && package.cover_href.is_none() {
                package.cover_href = attr_value(e, b"href");
            }
        }
        _ => {}
    }
}

fn attr_value(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| local_name(attr.key.as_ref()) == key)
        .map(|attr| {
            let raw = String::from_utf8_lossy(&attr.value);
            match quick_xml::escape::unescape(&raw) {
                Ok(value) => value.into_owned(),
                Err(_) => raw.into_owned(),
            }
        })
}

/// Resolve an href against the directory of the package document, dropping
/// any fragment and folding `.` and `..` segments.
pub(crate) fn resolve_href(base_dir: &str, href: &str) -> String {
    let href = href.split('#').next().unwrap_or(href);
    let mut segments: Vec<&str> = if href.starts_with('/') {
        Vec::new()
    } else {
        base_dir.split('/').filter(|s| !s.is_empty()).collect()
    };

    for segment in href.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    segments.join("/")
}

pub(crate) fn strip_bom(data: &[u8]) -> &[u8] {
    data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data)
}

/// Extract local name from potentially namespaced XML name
fn local_name(name: &[u8]) -> &[u8] {
    name.iter()
        .rposition(|&b| b == b':')
        .map(|i| &name[i + 1..])
        .unwrap_or(name)
}
