//! Main Library File for PII Redaction
//! Turns an encrypted PDF and a set of PII category filters into an encrypted PDF whose
//! matching text is irrecoverably removed and whose document metadata is emptied.

// Configuration and Core Pipeline
pub mod config;
pub mod error;
pub mod pipeline;
pub mod types;

// Payload envelope
pub mod encryption;

// Content stream interpretation
pub mod content;

// Stage 2: Text location and rasterization
pub mod render;
pub mod scanner;

// Stage 3: Classification
pub mod classifier;

// Stage 4: Matching
pub mod analyzer;

// Stage 5: Redaction
pub mod cleaner;

// Stage 6: Metadata scrubbing
pub mod metadata;

// Run reports
pub mod report;

// Shared Utilities
pub mod utils;

#[cfg(test)]
mod test_fixtures;

// Re-exports for crate consumers
pub use analyzer::PiiMatcher;
pub use classifier::{Classification, Classifier, ClassifierAdapter, HttpClassifier};
pub use cleaner::{RedactionApplier, RedactionSummary};
pub use config::{ClassifierFailurePolicy, KeySource, ProcessingConfig};
pub use encryption::{EnvelopeCipher, KeyProvider, StaticKeyProvider, SymmetricKey};
pub use error::{ClassifierError, Error, ErrorKind, Result};
pub use metadata::{MetadataScrubber, ScrubSummary};
pub use pipeline::{Pipeline, PipelineError, PipelineState, ProcessingOutcome};
pub use render::{PageRasterizer, PdfiumRasterizer};
pub use report::{FailureReport, ProcessingReport};
pub use scanner::{DocumentIndex, TextLocator};
pub use types::{
    candidates_from_text, BBox, CandidateSet, Document, Filters, PiiCandidate, RasterImage,
    RedactionMark, TextToken,
};
pub use utils::WorkingScope;
