//! Scanner Module Implementation
//!
//! Finds where text sits on the page: word tokens for callers, and the glyph index
//! the matcher searches.

pub mod page_index;
pub mod text_locator;

pub use self::{
    page_index::{DocumentIndex, PageIndex},
    text_locator::TextLocator,
};
