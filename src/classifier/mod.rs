//! Classifier Module Implementation
//!
//! The classifier is an external inference service: a raster of the first page goes in,
//! a blob of suspected PII text comes out. The adapter bounds the call with a timeout and
//! never lets a classifier failure escape as an error; it degrades to an empty candidate
//! set and records why.

pub mod http;

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::error::ClassifierError;
use crate::types::{candidates_from_text, CandidateSet, RasterImage};

pub use self::http::HttpClassifier;

/// An inference backend returning the raw text it recognized
#[async_trait]
pub trait Classifier: Send + Sync + Debug {
    fn name(&self) -> &str;

    async fn recognize(&self, image: &RasterImage) -> Result<String, ClassifierError>;
}

/// Candidates from one classification, with the reason coverage degraded if it did
#[derive(Debug, Clone, Default)]
pub struct Classification {
    pub candidates: CandidateSet,
    pub degraded: Option<ClassifierError>,
}

impl Classification {
    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct ClassifierAdapter {
    backend: Arc<dyn Classifier>,
    timeout: Duration,
}

impl ClassifierAdapter {
    pub fn new(backend: Arc<dyn Classifier>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Never fails: transport, timeout and parse problems yield an empty set.
    #[instrument(skip_all, fields(backend = self.backend.name(), bytes = image.data.len()))]
    pub async fn classify(&self, image: &RasterImage) -> Classification {
        let outcome = match tokio::time::timeout(self.timeout, self.backend.recognize(image)).await {
            Ok(result) => result,
            Err(_) => Err(ClassifierError::Timeout(self.timeout.as_millis() as u64)),
        };

        match outcome {
            Ok(text) => {
                let candidates = candidates_from_text(&text);
                debug!("Classifier returned {} characters", text.len());
                info!("🤖 {} candidates from {}", candidates.len(), self.backend.name());
                Classification {
                    candidates,
                    degraded: None,
                }
            }
            Err(e) => {
                warn!("⚠️ Classifier unavailable, continuing without candidates: {}", e);
                Classification {
                    candidates: CandidateSet::new(),
                    degraded: Some(e),
                }
            }
        }
    }
}
