//! Content stream interpretation
//!
//! Shared by text location, positional matching and redaction so all three agree
//! on where every glyph sits on the page.

use lopdf::{Dictionary, Document, Object, Stream};

use crate::error::{Error, Result};

pub mod cmap;
pub mod fonts;
pub mod interpreter;
pub mod matrix;
pub mod parser;
pub mod streams;

pub use fonts::{CharCode, FontMetrics};
pub use interpreter::{interpret, Glyph, ImagePlacement, PageContent};
pub use matrix::Matrix;
pub use parser::{decode_operations, encode_operations, INLINE_IMAGE};
pub use streams::{
    page_content, page_content_streams, ContentStreamPart, ContentStreamRole, FormXObject,
    PageResources, MAX_FORM_DEPTH,
};

/// Parses PDF bytes; anything lopdf cannot read is a malformed document.
pub fn load_pdf(bytes: &[u8]) -> Result<Document> {
    Document::load_mem(bytes).map_err(|e| Error::MalformedDocument(e.to_string()))
}

/// Reference chains deeper than this are treated as broken
const MAX_REFERENCE_DEPTH: usize = 16;

/// Follows indirect references to the direct object.
pub(crate) fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Object> {
    let mut current = object;
    for _ in 0..MAX_REFERENCE_DEPTH {
        match current {
            Object::Reference(id) => current = doc.get_object(*id).ok()?,
            other => return Some(other),
        }
    }
    None
}

pub(crate) fn resolve_dict<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Dictionary> {
    match resolve(doc, object)? {
        Object::Dictionary(dict) => Some(dict),
        Object::Stream(stream) => Some(&stream.dict),
        _ => None,
    }
}

/// Decoded stream data, or the raw bytes when the filter is unsupported
pub(crate) fn stream_bytes(stream: &Stream) -> Vec<u8> {
    stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone())
}
