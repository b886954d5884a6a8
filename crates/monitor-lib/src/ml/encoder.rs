//! Categorical label encoding with a frozen category set

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Maps each known category to its index in sorted order.
///
/// The category set is frozen at fit time; values outside it are
/// substituted with the first known category before encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    /// Fit on observed values. Returns `None` when no category was observed.
    pub fn fit<I, S>(values: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let classes: BTreeSet<String> = values.into_iter().map(Into::into).collect();
        if classes.is_empty() {
            return None;
        }
        Some(Self {
            classes: classes.into_iter().collect(),
        })
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn first_known(&self) -> &str {
        &self.classes[0]
    }

    pub fn is_known(&self, value: &str) -> bool {
        self.position(value).is_some()
    }

    fn position(&self, value: &str) -> Option<usize> {
        self.classes
            .binary_search_by(|c| c.as_str().cmp(value))
            .ok()
    }

    /// Encode a category, falling back to the first known category
    pub fn encode_or_first(&self, value: &str) -> f64 {
        self.position(value).unwrap_or(0) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classes_sorted_and_deduplicated() {
        let enc = LabelEncoder::fit(["Middle", "Low", "High", "Low"]).unwrap();
        assert_eq!(enc.classes(), &["High", "Low", "Middle"]);
        assert_eq!(enc.first_known(), "High");
    }

    #[test]
    fn test_encode_known_and_unseen() {
        let enc = LabelEncoder::fit(["F", "M"]).unwrap();
        assert_eq!(enc.encode_or_first("M"), 1.0);
        assert!(!enc.is_known("X"));
        assert_eq!(enc.encode_or_first("X"), enc.encode_or_first("F"));
    }

    #[test]
    fn test_fit_empty() {
        assert!(LabelEncoder::fit(Vec::<String>::new()).is_none());
    }
}
