//! Chapter text extraction.
//!
//! A chapter's markup is flattened to plain text for the page renderer.
//! Every text node outside non-content elements is one run. Runs are
//! trimmed and normalized, and empty ones are dropped. When more than one
//! run is left, each becomes an indented paragraph:
//!
//! ```text
//! <p>Hello</p><p>World</p>  →  "　　Hello\r\n　　World"
//! <pre>Hello</pre>          →  "Hello"
//! ```

use encoding_rs::Encoding;
use html5ever::LocalName;

use crate::dom::{ArenaDom, parse_markup};
use crate::encoding::decode_markup;
use crate::epub::ContentUnit;
use crate::error::ExtractError;
use crate::util::collapse_whitespace;

/// Prefix of every paragraph: two ideographic spaces.
pub const PARAGRAPH_INDENT: &str = "\u{3000}\u{3000}";

/// Separator between paragraphs.
pub const PARAGRAPH_SEPARATOR: &str = "\r\n";

/// Cleans up one trimmed text run.
///
/// Implementations must be pure; they run on worker threads.
pub trait TextFormatter: Send + Sync {
    fn normalize(&self, text: &str) -> String;
}

/// Default [`TextFormatter`] for text scraped from web-style markup.
///
/// Drops zero-width characters, turns non-breaking and ideographic spaces
/// into plain spaces, collapses whitespace runs and trims.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebTextFormatter;

impl TextFormatter for WebTextFormatter {
    fn normalize(&self, text: &str) -> String {
        let visible: String = text
            .chars()
            .filter(|c| !matches!(c, '\u{200B}'..='\u{200D}' | '\u{2060}' | '\u{FEFF}'))
            .collect();
        collapse_whitespace(&visible)
    }
}

/// Elements whose text never reaches the page.
fn is_non_content(name: &LocalName) -> bool {
    matches!(
        &**name,
        "head" | "title" | "script" | "style" | "noscript" | "template"
    )
}

/// Normalized, non-empty text runs of `dom` in document order.
fn text_runs(dom: &ArenaDom, formatter: &dyn TextFormatter) -> Vec<String> {
    dom.descendants(dom.document())
        .pruning(&is_non_content)
        .filter_map(|id| dom.text(id))
        .map(|text| formatter.normalize(text.trim()))
        .filter(|text| !text.is_empty())
        .collect()
}

/// Flatten decoded markup to chapter text.
pub fn extract_markup_text(markup: &str, formatter: &dyn TextFormatter) -> String {
    let dom = parse_markup(markup);
    let runs = text_runs(&dom, formatter);

    match runs.as_slice() {
        [] => String::new(),
        [only] => only.clone(),
        runs => {
            let mut content = String::new();
            for run in runs {
                if !content.is_empty() {
                    content.push_str(PARAGRAPH_SEPARATOR);
                }
                content.push_str(PARAGRAPH_INDENT);
                content.push_str(run);
            }
            content
        }
    }
}

/// Read, decode and flatten one spine unit.
///
/// Fails with [`ExtractError::Decode`] only when the unit's bytes cannot be
/// read or inflated. Malformed sequences in readable bytes are replaced.
pub fn extract_chapter_text(
    unit: &ContentUnit<'_>,
    encoding: &'static Encoding,
    formatter: &dyn TextFormatter,
) -> Result<String, ExtractError> {
    let bytes = unit.data().map_err(|e| ExtractError::Decode {
        href: unit.href().to_string(),
        reason: e.to_string(),
    })?;

    Ok(extract_markup_text(&decode_markup(&bytes, encoding), formatter))
}
