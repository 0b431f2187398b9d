//! Markup parsing into an arena tree.
//!
//! Content units are parsed into an [`ArenaDom`]. Well-formed units are read
//! as XML, and everything else goes through html5ever, which recovers from
//! the broken markup common in real books.

mod arena;
mod tree_sink;
mod xml;

pub use arena::{ArenaDom, Attribute, Children, Descendants, Node, NodeData, NodeId};
pub use tree_sink::ArenaSink;
pub use xml::parse_xhtml;

use html5ever::driver::ParseOpts;
use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use log::debug;

/// Parse decoded markup with the HTML tree builder.
pub fn parse_html(markup: &str) -> ArenaDom {
    parse_document(ArenaSink::new(), ParseOpts::default())
        .from_utf8()
        .one(markup.as_bytes())
        .into_dom()
}

/// Parse a content unit's decoded markup.
///
/// XHTML empty elements such as `<title/>` close immediately here, which the
/// HTML tree builder does not do for non-void elements. Markup that is not
/// well-formed XML falls back to [`parse_html`].
pub fn parse_markup(markup: &str) -> ArenaDom {
    match parse_xhtml(markup) {
        Ok(dom) => dom,
        Err(e) => {
            debug!("markup is not well-formed XML ({e}), parsing as HTML");
            parse_html(markup)
        }
    }
}
