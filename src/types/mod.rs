// Type definitions for the redaction pipeline

pub mod document;
pub mod filters;

pub use document::*;
pub use filters::*;
