//! Cleaner module
//!
//! Destructive removal of located PII from page content.

pub mod redaction_applier;

pub use self::redaction_applier::{RedactionApplier, RedactionSummary};
