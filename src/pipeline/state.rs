//! Pipeline state machine
//!
//! A run moves strictly forward through the stages; any error moves it to `Failed`.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Received,
    Decrypted,
    LocatedAndRasterized,
    Classified,
    Matched,
    Redacted,
    Scrubbed,
    Encrypted,
    Failed,
}

impl PipelineState {
    /// The only state reachable on success
    pub fn next(self) -> Option<Self> {
        use PipelineState::*;
        match self {
            Received => Some(Decrypted),
            Decrypted => Some(LocatedAndRasterized),
            LocatedAndRasterized => Some(Classified),
            Classified => Some(Matched),
            Matched => Some(Redacted),
            Redacted => Some(Scrubbed),
            Scrubbed => Some(Encrypted),
            Encrypted | Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Encrypted | PipelineState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PipelineState::Received => "received",
            PipelineState::Decrypted => "decrypted",
            PipelineState::LocatedAndRasterized => "located_and_rasterized",
            PipelineState::Classified => "classified",
            PipelineState::Matched => "matched",
            PipelineState::Redacted => "redacted",
            PipelineState::Scrubbed => "scrubbed",
            PipelineState::Encrypted => "encrypted",
            PipelineState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Records the path of one run
#[derive(Debug, Clone)]
pub struct StateTracker {
    visited: Vec<PipelineState>,
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StateTracker {
    pub fn new() -> Self {
        Self {
            visited: vec![PipelineState::Received],
        }
    }

    pub fn current(&self) -> PipelineState {
        self.visited.last().copied().unwrap_or(PipelineState::Received)
    }

    /// The state the run is working towards, `Failed` once terminal
    pub fn pending(&self) -> PipelineState {
        self.current().next().unwrap_or(PipelineState::Failed)
    }

    pub fn advance(&mut self, to: PipelineState) -> Result<()> {
        if self.current().next() != Some(to) {
            return Err(Error::InternalError(format!(
                "illegal transition {} -> {}",
                self.current(),
                to
            )));
        }
        self.visited.push(to);
        Ok(())
    }

    pub fn fail(&mut self) {
        if !self.current().is_terminal() {
            self.visited.push(PipelineState::Failed);
        }
    }

    pub fn visited(&self) -> &[PipelineState] {
        &self.visited
    }
}
