//! Metadata Module
//!
//! Document-level metadata removal for redacted output.

pub mod metadata_scrubber;

pub use self::metadata_scrubber::{MetadataScrubber, ScrubSummary, INFO_FIELDS};
