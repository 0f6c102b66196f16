//! Report Module Implementation
//!
//! Structured, JSON-serializable summaries of a pipeline run. Reports carry counts and
//! states only; no document text or candidate value ever appears in them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cleaner::RedactionSummary;
use crate::error::{Error, ErrorKind, Result};
use crate::metadata::ScrubSummary;
use crate::pipeline::PipelineState;

/// Summary of a successful run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingReport {
    pub request_id: String,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub key_id: String,
    pub pages: usize,
    pub tokens: usize,
    pub rasterized: bool,
    pub candidates: usize,
    pub marks: usize,
    pub redaction: RedactionSummary,
    pub metadata: ScrubSummary,
    /// The classifier could not be consulted, so redaction may be incomplete
    pub coverage_degraded: bool,
    pub degradation_reason: Option<String>,
    pub states: Vec<PipelineState>,
}

/// Structured failure handed back instead of a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReport {
    pub request_id: String,
    pub failed_at: DateTime<Utc>,
    pub error_kind: ErrorKind,
    /// Stage that was being entered when the error occurred
    pub stage: PipelineState,
    pub message: String,
    pub states: Vec<PipelineState>,
}

impl ProcessingReport {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::InternalError(format!("report serialization: {}", e)))
    }
}

impl FailureReport {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::InternalError(format!("report serialization: {}", e)))
    }
}
