//! Well-formed XHTML into an ArenaDom.
//!
//! The HTML tree builder treats `<title/>` or `<script src="a.js"/>` as open
//! tags that swallow the rest of the file. XHTML units are XML, so when the
//! markup is well-formed it is read with quick-xml instead and every empty
//! element closes where it stands.

use html5ever::{LocalName, QualName, ns};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use super::arena::{ArenaDom, Attribute, NodeId};
use crate::error::MarkupError;
use crate::util::resolve_xml_entity;

/// Parse well-formed XML markup.
///
/// Element and attribute names lose their prefixes and are lowercased, so the
/// tree reads the same as one built by the HTML parser.
pub fn parse_xhtml(markup: &str) -> Result<ArenaDom, MarkupError> {
    let mut reader = Reader::from_str(markup);
    reader.config_mut().check_end_names = true;

    let mut dom = ArenaDom::new();
    let mut open: Vec<NodeId> = vec![dom.document()];

    loop {
        let parent = open.last().copied().unwrap_or(dom.document());
        match reader.read_event()? {
            Event::Start(e) => {
                let id = create_element(&mut dom, &e);
                dom.append(parent, id);
                open.push(id);
            }
            Event::Empty(e) => {
                let id = create_element(&mut dom, &e);
                dom.append(parent, id);
            }
            Event::End(_) => {
                open.pop();
            }
            Event::Text(e) => {
                dom.append_text(parent, &String::from_utf8_lossy(e.as_ref()));
            }
            Event::CData(e) => {
                dom.append_text(parent, &String::from_utf8_lossy(&e));
            }
            Event::GeneralRef(e) => {
                let entity = String::from_utf8_lossy(e.as_ref());
                let resolved = resolve_xml_entity(&entity)
                    .or_else(|| html_entity(&entity).map(str::to_string))
                    .ok_or_else(|| MarkupError::UndefinedEntity(entity.to_string()))?;
                dom.append_text(parent, &resolved);
            }
            Event::Eof => break,
            // Declarations, doctypes, comments and processing instructions
            // carry no text.
            _ => {}
        }
    }

    if open.len() > 1 {
        let name = open
            .last()
            .and_then(|&id| dom.element_name(id))
            .map(|name| name.to_string())
            .unwrap_or_default();
        return Err(MarkupError::Unclosed(name));
    }

    Ok(dom)
}

fn create_element(dom: &mut ArenaDom, e: &BytesStart<'_>) -> NodeId {
    let name = QualName::new(None, ns!(html), lowered_local_name(e.name().as_ref()));
    let attrs = e
        .attributes()
        .flatten()
        .map(|attr| {
            let raw = String::from_utf8_lossy(&attr.value);
            let value = match quick_xml::escape::unescape(&raw) {
                Ok(value) => value.into_owned(),
                Err(_) => raw.into_owned(),
            };
            Attribute {
                name: QualName::new(None, ns!(), lowered_local_name(attr.key.as_ref())),
                value,
            }
        })
        .collect();
    dom.create_element(name, attrs)
}

fn lowered_local_name(name: &[u8]) -> LocalName {
    let local = name
        .iter()
        .rposition(|&b| b == b':')
        .map_or(name, |i| &name[i + 1..]);
    LocalName::from(String::from_utf8_lossy(local).to_ascii_lowercase())
}

/// HTML entities that turn up in XHTML chapters without a DTD to define them.
fn html_entity(name: &str) -> Option<&'static str> {
    Some(match name {
        "nbsp" => "\u{a0}",
        "ensp" => "\u{2002}",
        "emsp" => "\u{2003}",
        "thinsp" => "\u{2009}",
        "shy" => "\u{ad}",
        "zwnj" => "\u{200c}",
        "zwj" => "\u{200d}",
        "ndash" => "\u{2013}",
        "mdash" => "\u{2014}",
        "lsquo" => "\u{2018}",
        "rsquo" => "\u{2019}",
        "sbquo" => "\u{201a}",
        "ldquo" => "\u{201c}",
        "rdquo" => "\u{201d}",
        "bdquo" => "\u{201e}",
        "laquo" => "\u{ab}",
        "raquo" => "\u{bb}",
        "hellip" => "\u{2026}",
        "middot" => "\u{b7}",
        "bull" => "\u{2022}",
        "copy" => "\u{a9}",
        "reg" => "\u{ae}",
        "trade" => "\u{2122}",
        "deg" => "\u{b0}",
        "times" => "\u{d7}",
        "divide" => "\u{f7}",
        "sect" => "\u{a7}",
        "para" => "\u{b6}",
        "eacute" => "\u{e9}",
        "egrave" => "\u{e8}",
        "agrave" => "\u{e0}",
        "ccedil" => "\u{e7}",
        "uuml" => "\u{fc}",
        "ouml" => "\u{f6}",
        "auml" => "\u{e4}",
        "szlig" => "\u{df}",
        _ => return None,
    })
}
