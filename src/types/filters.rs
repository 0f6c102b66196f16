//! Caller-supplied PII category filters

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Normalized set of category labels (lowercased, trimmed, blanks dropped).
///
/// An empty set never matches anything; it does not mean "redact everything".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filters {
    labels: BTreeSet<String>,
}

impl Filters {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let labels = labels
            .into_iter()
            .map(|label| label.as_ref().trim().to_lowercase())
            .filter(|label| !label.is_empty())
            .collect();
        Self { labels }
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }
}

impl<S: AsRef<str>> FromIterator<S> for Filters {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Filters::new(iter)
    }
}
