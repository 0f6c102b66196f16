use pii_redact::analyzer::PiiMatcher;
use pii_redact::{candidates_from_text, Document, ErrorKind, Filters, TextLocator};

use crate::fixtures::TestFixtures;

fn document(content: &str) -> Document {
    Document::from_bytes(TestFixtures::pdf_with_content(content))
}

#[test]
fn test_kerned_runs_form_one_word() {
    let pdf = document("BT /F1 10 Tf 100 500 Td [(Jo) -20 (hn)] TJ ET");
    let tokens = TextLocator::new().locate(&pdf).unwrap();
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].text, "John");
    assert!((tokens[0].bbox.x0 - 100.0).abs() < 1e-6);
}

#[test]
fn test_large_gap_splits_words() {
    let pdf = document("BT /F1 10 Tf 100 500 Td [(ab) -2000 (cd)] TJ ET");
    let words: Vec<String> = TextLocator::new()
        .locate(&pdf)
        .unwrap()
        .into_iter()
        .map(|t| t.text)
        .collect();
    assert_eq!(words, vec!["ab", "cd"]);
}

#[test]
fn test_scaled_text_reports_page_space_boxes() {
    let pdf = document("q 2 0 0 2 0 0 cm BT /F1 10 Tf 50 100 Td (x) Tj ET Q");
    let tokens = TextLocator::new().locate(&pdf).unwrap();
    let bbox = tokens[0].bbox;
    assert!((bbox.x0 - 100.0).abs() < 1e-6);
    // 500/1000 em at 10 pt, doubled by the CTM
    assert!((bbox.width() - 10.0).abs() < 1e-6);
    assert!(bbox.y0 < 200.0 && bbox.y1 > 200.0);
}

#[test]
fn test_hex_strings_are_decoded() {
    let pdf = document("BT /F1 12 Tf 72 700 Td <4A6F65> Tj ET");
    let tokens = TextLocator::new().locate(&pdf).unwrap();
    assert_eq!(tokens[0].text, "Joe");
}

#[test]
fn test_occurrence_split_across_show_operators_is_found() {
    let pdf = document("BT /F1 12 Tf 72 700 Td (john@) Tj (x.com) Tj ET");
    let marks = PiiMatcher::new()
        .match_document(&pdf, &candidates_from_text("john@x.com"), &Filters::new(["email"]))
        .unwrap();
    assert_eq!(marks.len(), 1);
    assert!((marks[0].bbox.width() - 60.0).abs() < 1e-6);
}

#[test]
fn test_wrapped_occurrence_yields_one_mark_per_line() {
    let pdf = document("BT /F1 12 Tf 14 TL 72 700 Td (Mail john@) Tj T* (x.com now) Tj ET");
    let marks = PiiMatcher::new()
        .match_document(&pdf, &candidates_from_text("john@x.com"), &Filters::new(["email"]))
        .unwrap();
    assert_eq!(marks.len(), 2);
    assert!(marks[0].bbox.y0 > marks[1].bbox.y0);
}

#[test]
fn test_unreadable_bytes_are_malformed() {
    let err = TextLocator::new()
        .locate(&Document::from_bytes(b"%PDF-1.4 truncated".to_vec()))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedDocument);
}
