// 👀 Human review of ambiguous matches
//
// needs_review pairs wait here until a reviewer confirms or rejects them.
// Verdicts flow back into the next resolver run: confirmed → merge,
// rejected → distinct forever (never re-queued).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    Confirmed,
    Rejected,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Confirmed => "confirmed",
            ReviewStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ReviewStatus::Pending),
            "confirmed" => Some(ReviewStatus::Confirmed),
            "rejected" => Some(ReviewStatus::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order-insensitive key for a pair of node ids
pub fn pair_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// Adjudicated pairs handed to the resolver
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewFeedback {
    verdicts: BTreeMap<(String, String), ReviewStatus>,
}

impl ReviewFeedback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn confirm(&mut self, a: &str, b: &str) {
        self.verdicts.insert(pair_key(a, b), ReviewStatus::Confirmed);
    }

    pub fn reject(&mut self, a: &str, b: &str) {
        self.verdicts.insert(pair_key(a, b), ReviewStatus::Rejected);
    }

    /// Pending entries are ignored
    pub fn record(&mut self, a: &str, b: &str, status: ReviewStatus) {
        match status {
            ReviewStatus::Confirmed => self.confirm(a, b),
            ReviewStatus::Rejected => self.reject(a, b),
            ReviewStatus::Pending => {}
        }
    }

    pub fn verdict(&self, a: &str, b: &str) -> Option<ReviewStatus> {
        self.verdicts.get(&pair_key(a, b)).copied()
    }

    pub fn confirmed(&self) -> impl Iterator<Item = (&str, &str)> {
        self.verdicts
            .iter()
            .filter(|(_, s)| **s == ReviewStatus::Confirmed)
            .map(|((a, b), _)| (a.as_str(), b.as_str()))
    }

    pub fn len(&self) -> usize {
        self.verdicts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verdicts.is_empty()
    }
}
