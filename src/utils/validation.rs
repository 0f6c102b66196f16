//! Inbound request validation
//!
//! Runs before any pipeline stage; rejected payloads never enter the pipeline.

use crate::error::{Error, Result};
use crate::types::PDF_SIGNATURE;

/// Rejects absent payloads and payloads without a PDF content signature.
pub fn validate_payload(payload: &[u8]) -> Result<()> {
    if payload.is_empty() {
        return Err(Error::InvalidRequest("No file provided".into()));
    }
    if !payload.starts_with(PDF_SIGNATURE) {
        return Err(Error::InvalidRequest(
            "Invalid file format. Please upload a PDF.".into(),
        ));
    }
    Ok(())
}
