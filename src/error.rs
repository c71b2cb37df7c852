// ⚠️ Error Taxonomy - What can fail, and where
// Data-quality problems and ambiguous matches are NOT errors (they are reported
// and routed to review). Only resource failures and detector failures live here.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// PIPELINE STAGE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Resolve,
    Derive,
    Detect,
    Commit,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Resolve => "resolve",
            Stage::Derive => "derive",
            Stage::Detect => "detect",
            Stage::Commit => "commit",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Failure talking to the graph store. Always fatal to the current run.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("review pair not found: {left} <-> {right}")]
    ReviewNotFound { left: String, right: String },
}

/// A single detector failed. Isolated: the other detectors still commit.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
#[error("detector `{detector}` failed: {message}")]
pub struct DetectorError {
    pub detector: String,
    pub message: String,
}

impl DetectorError {
    pub fn new(detector: &str, message: impl Into<String>) -> Self {
        DetectorError {
            detector: detector.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must be within [0, 1], got {value}")]
    OutOfUnitRange { field: &'static str, value: f64 },

    #[error("review threshold {review} exceeds auto-merge threshold {auto}")]
    InvertedThresholds { review: f64, auto: f64 },

    #[error("{field} must be positive")]
    NotPositive { field: &'static str },

    #[error("{field} must be at least {min}, got {value}")]
    TooSmall { field: &'static str, min: usize, value: usize },
}

/// Run-level failure. Names the stage so the caller can report it; the
/// previously committed graph state is left untouched.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("stage `{stage}` failed: {source}")]
    Store {
        stage: Stage,
        #[source]
        source: StoreError,
    },
}

impl PipelineError {
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::Config(_) => None,
            PipelineError::Store { stage, .. } => Some(*stage),
        }
    }
}
