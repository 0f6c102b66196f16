//! PII Matcher Implementation
//!
//! Decides which classifier candidates are relevant to the requested categories and
//! turns each relevant candidate into positional marks by searching the glyph index.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info, instrument};

use crate::error::Result;
use crate::scanner::{DocumentIndex, TextLocator};
use crate::types::{CandidateSet, Document, Filters, PiiCandidate, RedactionMark};

lazy_static! {
    static ref EMAIL: Regex =
        Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(?:\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}$").unwrap();
    static ref SSN: Regex = Regex::new(r"^\d{3}-\d{2}-\d{4}$").unwrap();
    static ref PHONE: Regex = Regex::new(r"^\+?[\d().\s-]{7,}$").unwrap();
    static ref CARD: Regex = Regex::new(r"^\d(?:[ -]?\d){12,18}$").unwrap();
    static ref IPV4: Regex = Regex::new(r"^(\d{1,3})\.(\d{1,3})\.(\d{1,3})\.(\d{1,3})$").unwrap();
    static ref DATE: Regex = Regex::new(r"^\d{1,4}[-/.]\d{1,2}[-/.]\d{1,4}$").unwrap();
}

/// Categories whose values are recognizable by shape alone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Email,
    Ssn,
    Phone,
    CreditCard,
    IpAddress,
    Date,
}

impl Category {
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "email" | "e-mail" | "email_address" => Some(Self::Email),
            "ssn" | "social_security" | "social_security_number" => Some(Self::Ssn),
            "phone" | "phone_number" | "telephone" => Some(Self::Phone),
            "credit_card" | "creditcard" | "card" | "card_number" => Some(Self::CreditCard),
            "ip" | "ip_address" => Some(Self::IpAddress),
            "date" | "dob" | "date_of_birth" => Some(Self::Date),
            _ => None,
        }
    }

    pub fn matches(&self, value: &str) -> bool {
        match self {
            Self::Email => EMAIL.is_match(value),
            Self::Ssn => SSN.is_match(value),
            Self::Phone => {
                let digits = value.chars().filter(char::is_ascii_digit).count();
                PHONE.is_match(value) && (7..=15).contains(&digits) && !DATE.is_match(value)
            }
            Self::CreditCard => CARD.is_match(value) && luhn_valid(value),
            Self::IpAddress => IPV4.captures(value).map_or(false, |caps| {
                (1..=4).all(|i| caps[i].parse::<u16>().map_or(false, |octet| octet <= 255))
            }),
            Self::Date => DATE.is_match(value),
        }
    }
}

/// Luhn checksum over the digits of `value`
pub fn luhn_valid(value: &str) -> bool {
    let digits: Vec<u32> = value.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() < 2 {
        return false;
    }
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

/// True when `candidate` is relevant to the filter `label`.
///
/// The lowercase candidate must contain the label, or, for a known category, the
/// candidate must have that category's shape.
pub fn passes_filter(candidate: &str, label: &str) -> bool {
    if candidate.to_lowercase().contains(label) {
        return true;
    }
    let trimmed = candidate.trim_matches(|c: char| matches!(c, ',' | ';' | ':' | '(' | ')' | '"' | '\''));
    Category::from_label(label).map_or(false, |category| category.matches(trimmed))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PiiMatcher;

impl PiiMatcher {
    pub fn new() -> Self {
        Self
    }

    /// Candidates satisfying at least one filter. Empty filters admit nothing.
    pub fn relevant<'c>(&self, candidates: &'c CandidateSet, filters: &Filters) -> Vec<&'c PiiCandidate> {
        candidates
            .iter()
            .filter(|candidate| filters.iter().any(|label| passes_filter(candidate.as_str(), label)))
            .collect()
    }

    /// Marks for every occurrence of every relevant candidate, using a prebuilt index.
    #[instrument(skip_all, fields(candidates = candidates.len(), filters = filters.len()))]
    pub fn find_marks(
        &self,
        index: &DocumentIndex,
        candidates: &CandidateSet,
        filters: &Filters,
    ) -> Vec<RedactionMark> {
        let relevant = self.relevant(candidates, filters);
        if relevant.is_empty() {
            info!("🎯 No candidates survived the filters");
            return Vec::new();
        }

        let mut marks = Vec::new();
        for candidate in &relevant {
            let found = index.find(candidate.as_str());
            debug!("Candidate {:?}: {} occurrences", candidate.as_str(), found.len());
            marks.extend(found);
        }

        info!(
            "🎯 {} of {} candidates relevant, {} marks",
            relevant.len(),
            candidates.len(),
            marks.len()
        );
        marks
    }

    /// Standalone form: interprets the document, then searches it.
    pub fn match_document(
        &self,
        document: &Document,
        candidates: &CandidateSet,
        filters: &Filters,
    ) -> Result<Vec<RedactionMark>> {
        if filters.is_empty() || candidates.is_empty() {
            return Ok(Vec::new());
        }
        let index = TextLocator::new().index(document)?;
        Ok(self.find_marks(&index, candidates, filters))
    }
}
