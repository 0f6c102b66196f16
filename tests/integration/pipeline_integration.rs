use std::sync::Arc;

use pii_redact::config::ClassifierFailurePolicy;
use pii_redact::metadata::INFO_FIELDS;
use pii_redact::{
    Document, ErrorKind, Filters, Pipeline, PipelineState, ProcessingConfig, TextLocator,
};

use crate::fixtures::{BlankRasterizer, FailingClassifier, NoRasterizer, ScriptedClassifier, TestFixtures, AUTHOR};

const PAGE: &[(f64, f64, &str)] = &[
    (72.0, 720.0, "Patient: John Smith"),
    (72.0, 700.0, "Contact john@x.com for records"),
    (72.0, 680.0, "Card 4111-1111-1111-1111 on file"),
];

fn words(pdf: &[u8]) -> Vec<String> {
    TextLocator::new()
        .locate(&Document::from_bytes(pdf.to_vec()))
        .unwrap()
        .into_iter()
        .map(|token| token.text)
        .collect()
}

fn assert_metadata_empty(pdf: &[u8]) {
    let info = TestFixtures::info_entries(pdf);
    let mut keys: Vec<&str> = info.iter().map(|(key, _)| key.as_str()).collect();
    keys.sort_unstable();
    let mut expected = INFO_FIELDS.to_vec();
    expected.sort_unstable();
    assert_eq!(keys, expected);
    assert!(info.iter().all(|(_, value)| value.is_empty()));
    assert!(!TestFixtures::contains(pdf, AUTHOR));
    assert!(!TestFixtures::contains(pdf, "xmpmeta"));
}

async fn run(pipeline: &Pipeline, pdf: &[u8], filters: &Filters) -> (Vec<u8>, pii_redact::ProcessingReport) {
    let sealed = pipeline.cipher().seal(pdf).unwrap();
    let outcome = pipeline.process(&sealed, filters).await.unwrap();
    let plain = pipeline.cipher().open(&outcome.ciphertext).unwrap();
    (plain, outcome.report)
}

#[tokio::test]
async fn test_redacted_text_is_unrecoverable() {
    let root = tempfile::tempdir().unwrap();
    let pipeline = TestFixtures::pipeline(
        root.path(),
        ScriptedClassifier::new("John Smith john@x.com"),
        Arc::new(BlankRasterizer),
    );
    let input = TestFixtures::pdf(&[PAGE]);

    let (output, report) = run(&pipeline, &input, &Filters::new(["email"])).await;

    assert_eq!(report.marks, 1);
    assert_eq!(report.redaction.glyphs_removed, "john@x.com".len());
    assert!(!TestFixtures::contains(&output, "john@x.com"));
    let remaining = words(&output);
    assert!(remaining.iter().all(|w| !w.contains("john@")));
    assert!(remaining.contains(&"Contact".to_string()));
    assert!(remaining.contains(&"records".to_string()));
    assert_metadata_empty(&output);
}

#[tokio::test]
async fn test_filter_gating_redacts_only_requested_category() {
    let root = tempfile::tempdir().unwrap();
    let pipeline = TestFixtures::pipeline(
        root.path(),
        ScriptedClassifier::new("john@x.com 4111-1111-1111-1111"),
        Arc::new(BlankRasterizer),
    );

    let (output, report) = run(&pipeline, &TestFixtures::pdf(&[PAGE]), &Filters::new(["email"])).await;

    assert_eq!(report.candidates, 2);
    assert_eq!(report.marks, 1);
    let remaining = words(&output);
    assert!(remaining.contains(&"4111-1111-1111-1111".to_string()));
    assert!(!remaining.iter().any(|w| w.contains("john@x.com")));
}

#[tokio::test]
async fn test_no_pii_passes_text_through_and_scrubs_metadata() {
    let root = tempfile::tempdir().unwrap();
    let pipeline = TestFixtures::pipeline(
        root.path(),
        ScriptedClassifier::new("Patient records"),
        Arc::new(BlankRasterizer),
    );
    let input = TestFixtures::pdf(&[PAGE]);

    let (output, report) = run(&pipeline, &input, &Filters::new(["ssn"])).await;

    assert_eq!(report.marks, 0);
    assert_eq!(report.redaction.pages_rewritten, 0);
    assert_eq!(words(&output), words(&input));
    assert_metadata_empty(&output);
}

#[tokio::test]
async fn test_empty_filters_never_redact() {
    let root = tempfile::tempdir().unwrap();
    let pipeline = TestFixtures::pipeline(
        root.path(),
        ScriptedClassifier::new("john@x.com 4111-1111-1111-1111"),
        Arc::new(BlankRasterizer),
    );
    let input = TestFixtures::pdf(&[PAGE]);

    let (output, report) = run(&pipeline, &input, &Filters::default()).await;

    assert_eq!(report.marks, 0);
    assert_eq!(words(&output), words(&input));
    assert_metadata_empty(&output);
}

#[tokio::test]
async fn test_failing_classifier_still_returns_scrubbed_document() {
    let root = tempfile::tempdir().unwrap();
    let pipeline = TestFixtures::pipeline(root.path(), Arc::new(FailingClassifier), Arc::new(BlankRasterizer));
    let input = TestFixtures::pdf(&[PAGE]);

    let (output, report) = run(&pipeline, &input, &Filters::new(["email"])).await;

    assert!(report.coverage_degraded);
    assert!(report
        .degradation_reason
        .as_deref()
        .unwrap_or_default()
        .contains("connection refused"));
    assert_eq!(report.marks, 0);
    assert_eq!(words(&output), words(&input));
    assert_metadata_empty(&output);
}

#[tokio::test]
async fn test_failing_classifier_with_fail_closed_policy_aborts() {
    let root = tempfile::tempdir().unwrap();
    let mut config = ProcessingConfig::default();
    config.scope.temp_root = Some(root.path().to_path_buf());
    config.on_classifier_failure = ClassifierFailurePolicy::FailClosed;
    let pipeline = TestFixtures::pipeline_with(config, Arc::new(FailingClassifier), Arc::new(BlankRasterizer));

    let sealed = pipeline.cipher().seal(&TestFixtures::pdf(&[PAGE])).unwrap();
    let failure = pipeline.process(&sealed, &Filters::new(["email"])).await.unwrap_err();

    assert_eq!(failure.kind(), ErrorKind::ClassifierUnavailable);
    assert_eq!(failure.report.stage, PipelineState::Classified);
}

#[tokio::test]
async fn test_reprocessing_output_is_idempotent() {
    let root = tempfile::tempdir().unwrap();
    let pipeline = TestFixtures::pipeline(
        root.path(),
        ScriptedClassifier::new("john@x.com"),
        Arc::new(BlankRasterizer),
    );
    let filters = Filters::new(["email"]);

    let (first, _) = run(&pipeline, &TestFixtures::pdf(&[PAGE]), &filters).await;
    let (second, report) = run(&pipeline, &first, &filters).await;

    assert_eq!(report.marks, 0);
    assert_eq!(second, first);
}

#[tokio::test]
async fn test_missing_raster_skips_classifier() {
    let root = tempfile::tempdir().unwrap();
    let classifier = ScriptedClassifier::new("john@x.com");
    let pipeline = TestFixtures::pipeline(root.path(), classifier.clone(), Arc::new(NoRasterizer));

    let (output, report) = run(&pipeline, &TestFixtures::pdf(&[PAGE]), &Filters::new(["email"])).await;

    assert_eq!(classifier.calls(), 0);
    assert!(!report.rasterized);
    assert!(!report.coverage_degraded);
    assert_eq!(report.marks, 0);
    assert_metadata_empty(&output);
}

#[tokio::test]
async fn test_every_page_is_searched() {
    let root = tempfile::tempdir().unwrap();
    let pipeline = TestFixtures::pipeline(
        root.path(),
        ScriptedClassifier::new("123-45-6789"),
        Arc::new(BlankRasterizer),
    );
    let first: &[(f64, f64, &str)] = &[(72.0, 700.0, "SSN 123-45-6789")];
    let second: &[(f64, f64, &str)] = &[(72.0, 700.0, "Again 123-45-6789 here")];

    let (output, report) = run(&pipeline, &TestFixtures::pdf(&[first, second]), &Filters::new(["ssn"])).await;

    assert_eq!(report.pages, 2);
    assert_eq!(report.marks, 2);
    assert_eq!(report.redaction.pages_rewritten, 2);
    assert!(!TestFixtures::contains(&output, "123-45-6789"));
}

#[tokio::test]
async fn test_tampered_ciphertext_fails_closed() {
    let root = tempfile::tempdir().unwrap();
    let pipeline = TestFixtures::pipeline(root.path(), ScriptedClassifier::new(""), Arc::new(BlankRasterizer));
    let mut sealed = pipeline.cipher().seal(&TestFixtures::pdf(&[PAGE])).unwrap();
    sealed[20] ^= 0x01;

    let failure = pipeline.process(&sealed, &Filters::new(["email"])).await.unwrap_err();
    assert_eq!(failure.kind(), ErrorKind::DecryptionFailure);
    assert_eq!(failure.report.states.last(), Some(&PipelineState::Failed));
}

#[tokio::test]
async fn test_email_drawn_through_form_is_unrecoverable() {
    let root = tempfile::tempdir().unwrap();
    let pipeline = TestFixtures::pipeline(
        root.path(),
        ScriptedClassifier::new("john@x.com"),
        Arc::new(BlankRasterizer),
    );
    let input = TestFixtures::pdf_with_form(
        "BT /F1 12 Tf 72 700 Td (Mail john@x.com) Tj ET\n/Fm1 Do",
        "BT /F1 12 Tf 72 700 Td (john@x.com) Tj ET",
    );

    let (output, report) = run(&pipeline, &input, &Filters::new(["email"])).await;

    assert_eq!(report.marks, 2);
    assert_eq!(report.redaction.forms_rewritten, 1);
    assert!(!TestFixtures::contains(&output, "john@x.com"));
    assert_eq!(words(&output), vec!["Mail".to_string()]);
}

#[tokio::test]
async fn test_text_after_inline_image_is_redacted() {
    let root = tempfile::tempdir().unwrap();
    let pipeline = TestFixtures::pipeline(
        root.path(),
        ScriptedClassifier::new("john@x.com"),
        Arc::new(BlankRasterizer),
    );
    let input = TestFixtures::pdf_with_content(
        "q 10 0 0 10 300 300 cm BI /W 2 /H 1 /BPC 8 /CS /G ID \x01\x02 EI Q\n\
         BT /F1 12 Tf 72 700 Td (Mail john@x.com) Tj ET",
    );

    let (output, report) = run(&pipeline, &input, &Filters::new(["email"])).await;

    assert_eq!(report.marks, 1);
    assert!(!TestFixtures::contains(&output, "john@x.com"));
    assert!(TestFixtures::contains(&output, "/CS /G ID"));
}

#[tokio::test]
async fn test_partially_readable_page_is_fatal() {
    let root = tempfile::tempdir().unwrap();
    let pipeline = TestFixtures::pipeline(
        root.path(),
        ScriptedClassifier::new("john@x.com"),
        Arc::new(BlankRasterizer),
    );
    let sealed = pipeline
        .cipher()
        .seal(&TestFixtures::pdf_with_content(
            "BT /F1 12 Tf 72 700 Td (Mail) Tj ET ] BT (john@x.com) Tj ET",
        ))
        .unwrap();

    let failure = pipeline.process(&sealed, &Filters::new(["email"])).await.unwrap_err();
    assert_eq!(failure.kind(), ErrorKind::MalformedDocument);
    assert_eq!(failure.stage, PipelineState::LocatedAndRasterized);
}

#[tokio::test]
async fn test_malformed_pdf_is_fatal_and_scope_released() {
    let root = tempfile::tempdir().unwrap();
    let pipeline = TestFixtures::pipeline(root.path(), ScriptedClassifier::new(""), Arc::new(BlankRasterizer));
    let sealed = pipeline.cipher().seal(b"%PDF-1.7\nnot a real document").unwrap();

    let failure = pipeline.process(&sealed, &Filters::new(["email"])).await.unwrap_err();
    assert_eq!(failure.kind(), ErrorKind::MalformedDocument);
    assert_eq!(failure.stage, PipelineState::LocatedAndRasterized);
    assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_non_pdf_payload_is_rejected_after_decrypt() {
    let root = tempfile::tempdir().unwrap();
    let pipeline = TestFixtures::pipeline(root.path(), ScriptedClassifier::new(""), Arc::new(BlankRasterizer));
    let sealed = pipeline.cipher().seal(b"GIF89a").unwrap();

    let failure = pipeline.process(&sealed, &Filters::default()).await.unwrap_err();
    assert_eq!(failure.kind(), ErrorKind::MalformedDocument);
    assert_eq!(failure.stage, PipelineState::Decrypted);
}
