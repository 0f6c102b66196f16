//! Analyzer Module
//!
//! Relevance of classifier output to the requested PII categories.

pub mod pii_matcher;

pub use self::pii_matcher::{luhn_valid, passes_filter, Category, PiiMatcher};
