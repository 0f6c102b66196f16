use pii_redact::analyzer::PiiMatcher;
use pii_redact::{
    candidates_from_text, BBox, Document, Filters, MetadataScrubber, RedactionApplier, RedactionMark,
    TextLocator,
};

use crate::fixtures::TestFixtures;

fn marks_for(pdf: &Document, candidates: &str, filter: &str) -> Vec<RedactionMark> {
    PiiMatcher::new()
        .match_document(pdf, &candidates_from_text(candidates), &Filters::new([filter]))
        .unwrap()
}

fn words(pdf: &Document) -> Vec<String> {
    TextLocator::new()
        .locate(pdf)
        .unwrap()
        .into_iter()
        .map(|t| t.text)
        .collect()
}

#[test]
fn test_reapplying_marks_returns_identical_bytes() {
    let input = Document::from_bytes(TestFixtures::pdf(&[&[(72.0, 700.0, "SSN 123-45-6789 ok")]]));
    let marks = marks_for(&input, "123-45-6789", "ssn");
    assert_eq!(marks.len(), 1);

    let applier = RedactionApplier::new();
    let once = applier.apply(input, &marks).unwrap();
    let snapshot = once.as_bytes().to_vec();
    let (twice, summary) = applier.apply_with_summary(once, &marks).unwrap();

    assert!(!summary.changed());
    assert_eq!(twice.as_bytes(), snapshot.as_slice());
}

#[test]
fn test_overlapping_marks_are_both_applied() {
    let input = Document::from_bytes(TestFixtures::pdf(&[&[(72.0, 700.0, "id 555-0100-77 end")]]));
    let whole = marks_for(&input, "555-0100-77", "phone");
    assert_eq!(whole.len(), 1);
    let part = RedactionMark {
        page: 0,
        bbox: BBox::new(whole[0].bbox.x0, whole[0].bbox.y0, whole[0].bbox.x0 + 20.0, whole[0].bbox.y1),
    };

    let (output, summary) = RedactionApplier::new()
        .apply_with_summary(input, &[whole[0], part])
        .unwrap();
    assert_eq!(summary.fills_added, 2);
    assert_eq!(summary.glyphs_removed, "555-0100-77".len());
    assert_eq!(words(&output), vec!["id", "end"]);
}

#[test]
fn test_text_outside_marks_keeps_its_position() {
    let input = Document::from_bytes(TestFixtures::pdf(&[&[(72.0, 700.0, "Name Alice Example here")]]));
    let before = TextLocator::new().locate(&input).unwrap();
    let marks = marks_for(&input, "name:Alice", "name");
    // The candidate is relevant, but its exact text never occurs in the document
    assert!(marks.is_empty());

    let manual = [RedactionMark {
        page: 0,
        bbox: before[1].bbox,
    }];
    let output = RedactionApplier::new().apply(input, &manual).unwrap();
    let after = TextLocator::new().locate(&output).unwrap();

    assert_eq!(after.len(), 3);
    assert_eq!(after[0], before[0]);
    assert_eq!(after[1], before[2]);
    assert_eq!(after[2], before[3]);
}

#[test]
fn test_scrub_after_redaction_keeps_remaining_text() {
    let input = Document::from_bytes(TestFixtures::pdf(&[&[(72.0, 700.0, "mail bob@example.org now")]]));
    let marks = marks_for(&input, "bob@example.org", "email");
    let redacted = RedactionApplier::new().apply(input, &marks).unwrap();
    let scrubbed = MetadataScrubber::new().scrub(redacted).unwrap();

    assert_eq!(words(&scrubbed), vec!["mail", "now"]);
    assert!(TestFixtures::info_entries(scrubbed.as_bytes())
        .iter()
        .all(|(_, value)| value.is_empty()));
    assert!(!TestFixtures::contains(scrubbed.as_bytes(), "bob@example.org"));
}
