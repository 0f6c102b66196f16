//! Redaction Pipeline: Stage-by-Stage Execution
//!
//! decrypt → (locate ∥ rasterize) → classify → match → redact → scrub → encrypt.
//! A run either returns sealed, redacted and scrubbed bytes or a structured failure;
//! partially processed bytes never leave this module.

pub mod state;

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};
use uuid::Uuid;

use crate::{
    analyzer::PiiMatcher,
    classifier::{Classification, Classifier, ClassifierAdapter, HttpClassifier},
    cleaner::{RedactionApplier, RedactionSummary},
    config::{ClassifierFailurePolicy, ProcessingConfig},
    encryption::{EnvelopeCipher, KeyProvider, StaticKeyProvider},
    error::{Error, ErrorKind, Result},
    metadata::{MetadataScrubber, ScrubSummary},
    render::{PageRasterizer, PdfiumRasterizer},
    report::{FailureReport, ProcessingReport},
    scanner::{DocumentIndex, TextLocator},
    types::{Document, Filters, RasterImage, RedactionMark},
    utils::WorkingScope,
};

pub use self::state::{PipelineState, StateTracker};

/// Sealed output of a successful run
#[derive(Debug, Clone)]
pub struct ProcessingOutcome {
    pub ciphertext: Vec<u8>,
    pub report: ProcessingReport,
}

/// A run that ended in `Failed`
#[derive(Debug, thiserror::Error)]
#[error("pipeline failed entering {stage}: {source}")]
pub struct PipelineError {
    pub stage: PipelineState,
    pub source: Error,
    pub report: FailureReport,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }
}

/// Orchestrates every stage of one redaction request
#[derive(Debug)]
pub struct Pipeline {
    config: ProcessingConfig,
    cipher: EnvelopeCipher,
    classifier: ClassifierAdapter,
    rasterizer: Arc<dyn PageRasterizer>,
    locator: TextLocator,
    matcher: PiiMatcher,
    applier: RedactionApplier,
    scrubber: MetadataScrubber,
}

impl Pipeline {
    pub fn new(
        config: ProcessingConfig,
        keys: Arc<dyn KeyProvider>,
        classifier: Arc<dyn Classifier>,
        rasterizer: Arc<dyn PageRasterizer>,
    ) -> Self {
        let timeout = config.classifier.timeout();
        Self {
            config,
            cipher: EnvelopeCipher::new(keys),
            classifier: ClassifierAdapter::new(classifier, timeout),
            rasterizer,
            locator: TextLocator::new(),
            matcher: PiiMatcher::new(),
            applier: RedactionApplier::new(),
            scrubber: MetadataScrubber::new(),
        }
    }

    /// HTTP classifier, PDFium rasterizer and the configured key source.
    pub fn from_config(config: ProcessingConfig) -> Result<Self> {
        config.validate()?;
        let keys: Arc<dyn KeyProvider> = Arc::new(StaticKeyProvider::from_source(&config.key)?);
        let classifier = Arc::new(HttpClassifier::from_config(&config.classifier)?);
        let rasterizer = Arc::new(PdfiumRasterizer::new(config.raster.clone()));
        Ok(Self::new(config, keys, classifier, rasterizer))
    }

    /// Liveness
    pub fn status(&self) -> &'static str {
        "running"
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    /// Cipher for the payload envelope, shared with callers that seal inputs.
    pub fn cipher(&self) -> &EnvelopeCipher {
        &self.cipher
    }

    /// Runs one request inside its own span.
    pub async fn process(
        &self,
        encrypted: &[u8],
        filters: &Filters,
    ) -> std::result::Result<ProcessingOutcome, PipelineError> {
        let request_id = Uuid::new_v4().to_string();
        let span = info_span!("request", id = %request_id);
        self.execute(request_id, encrypted, filters).instrument(span).await
    }

    async fn execute(
        &self,
        request_id: String,
        encrypted: &[u8],
        filters: &Filters,
    ) -> std::result::Result<ProcessingOutcome, PipelineError> {
        info!("🚦 Starting redaction pipeline ({} filters)", filters.len());
        let clock = Instant::now();
        let mut tracker = StateTracker::new();
        let mut report = ProcessingReport {
            request_id,
            started_at: Utc::now(),
            elapsed_ms: 0,
            key_id: String::new(),
            pages: 0,
            tokens: 0,
            rasterized: false,
            candidates: 0,
            marks: 0,
            redaction: RedactionSummary::default(),
            metadata: ScrubSummary::default(),
            coverage_degraded: false,
            degradation_reason: None,
            states: Vec::new(),
        };

        match self.run(encrypted, filters, &mut tracker, &mut report).await {
            Ok(ciphertext) => {
                report.elapsed_ms = clock.elapsed().as_millis() as u64;
                report.states = tracker.visited().to_vec();
                info!(
                    "✅ Pipeline completed in {} ms: {} marks, degraded={}",
                    report.elapsed_ms, report.marks, report.coverage_degraded
                );
                Ok(ProcessingOutcome { ciphertext, report })
            }
            Err(e) => Err(self.failure(&report.request_id, &mut tracker, e)),
        }
    }

    async fn run(
        &self,
        encrypted: &[u8],
        filters: &Filters,
        tracker: &mut StateTracker,
        report: &mut ProcessingReport,
    ) -> Result<Vec<u8>> {
        let document = self.stage_decrypt(encrypted)?;
        tracker.advance(PipelineState::Decrypted)?;

        let (document, index, raster) = self.stage_locate_and_rasterize(document).await?;
        report.pages = index.page_count();
        report.tokens = index.tokens().len();
        report.rasterized = raster.is_some();
        tracker.advance(PipelineState::LocatedAndRasterized)?;

        let classification = self.stage_classify(raster).await?;
        report.candidates = classification.candidates.len();
        report.coverage_degraded = classification.is_degraded();
        report.degradation_reason = classification.degraded.as_ref().map(ToString::to_string);
        tracker.advance(PipelineState::Classified)?;

        let marks = self.stage_match(&index, &classification, filters);
        drop(index);
        report.marks = marks.len();
        tracker.advance(PipelineState::Matched)?;

        let (document, redaction) = self.stage_redact(document, marks).await?;
        report.redaction = redaction;
        tracker.advance(PipelineState::Redacted)?;

        let (document, metadata) = self.stage_scrub(document).await?;
        report.metadata = metadata;
        tracker.advance(PipelineState::Scrubbed)?;

        let ciphertext = self.stage_encrypt(&document)?;
        report.key_id = self.cipher.key_id()?;
        tracker.advance(PipelineState::Encrypted)?;
        Ok(ciphertext)
    }

    /// Stage 1: Decrypt
    #[instrument(skip_all, fields(len = encrypted.len()))]
    fn stage_decrypt(&self, encrypted: &[u8]) -> Result<Document> {
        info!("🔓 Stage 1: Decrypt");
        let document = Document::from_bytes(self.cipher.open(encrypted)?);
        if !document.has_pdf_signature() {
            return Err(Error::MalformedDocument("decrypted payload is not a PDF".into()));
        }
        Ok(document)
    }

    /// Stage 2: Locate text and rasterize page 0 side by side. The working scope
    /// only lives for this stage and is released before the index is inspected.
    #[instrument(skip_all, fields(bytes = document.len()))]
    async fn stage_locate_and_rasterize(
        &self,
        document: Document,
    ) -> Result<(Document, DocumentIndex, Option<RasterImage>)> {
        info!("🔎 Stage 2: Locate text ∥ rasterize");
        let scope = WorkingScope::acquire(&self.config.scope)?;
        let locator = self.locator;
        let rasterizer = Arc::clone(&self.rasterizer);

        let (document, scope, index, raster) = tokio::task::spawn_blocking(move || {
            let (index, raster) = rayon::join(
                || locator.index(&document),
                || rasterizer.rasterize(&document, &scope),
            );
            (document, scope, index, raster)
        })
        .await?;

        debug!("Releasing {} spilled bytes", scope.spilled_bytes());
        scope.release()?;
        Ok((document, index?, raster))
    }

    /// Stage 3: Classify
    async fn stage_classify(&self, raster: Option<RasterImage>) -> Result<Classification> {
        info!("🤖 Stage 3: Classify");
        let Some(raster) = raster else {
            info!("🤖 No raster, classifier skipped");
            return Ok(Classification::default());
        };

        let classification = self.classifier.classify(&raster).await;
        drop(raster);

        if let Some(reason) = &classification.degraded {
            match self.config.on_classifier_failure {
                ClassifierFailurePolicy::FailClosed => {
                    return Err(Error::ClassifierUnavailable(reason.clone()))
                }
                ClassifierFailurePolicy::ReturnUnredacted => {
                    warn!("⚠️ Coverage degraded, output may contain unredacted PII: {}", reason)
                }
            }
        }
        Ok(classification)
    }

    /// Stage 4: Match
    fn stage_match(
        &self,
        index: &DocumentIndex,
        classification: &Classification,
        filters: &Filters,
    ) -> Vec<RedactionMark> {
        info!("🎯 Stage 4: Match");
        self.matcher.find_marks(index, &classification.candidates, filters)
    }

    /// Stage 5: Redact
    async fn stage_redact(
        &self,
        document: Document,
        marks: Vec<RedactionMark>,
    ) -> Result<(Document, RedactionSummary)> {
        info!("🖍️ Stage 5: Redact");
        let applier = self.applier;
        tokio::task::spawn_blocking(move || applier.apply_with_summary(document, &marks)).await?
    }

    /// Stage 6: Scrub metadata
    async fn stage_scrub(&self, document: Document) -> Result<(Document, ScrubSummary)> {
        info!("🧽 Stage 6: Scrub metadata");
        let scrubber = self.scrubber;
        tokio::task::spawn_blocking(move || scrubber.scrub_with_summary(document)).await?
    }

    /// Stage 7: Encrypt
    fn stage_encrypt(&self, document: &Document) -> Result<Vec<u8>> {
        info!("🔒 Stage 7: Encrypt");
        self.cipher.seal(document.as_bytes())
    }

    fn failure(&self, request_id: &str, tracker: &mut StateTracker, error: Error) -> PipelineError {
        let stage = tracker.pending();
        tracker.fail();
        error!("❌ Pipeline failed entering {}: {}", stage, error);
        let report = FailureReport {
            request_id: request_id.to_string(),
            failed_at: Utc::now(),
            error_kind: error.kind(),
            stage,
            message: error.to_string(),
            states: tracker.visited().to_vec(),
        };
        PipelineError {
            stage,
            source: error,
            report,
        }
    }
}
