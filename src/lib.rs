// Paper Trail - Core Library
// Entity resolution, relationship derivation, red flags and concentration
// analytics over procurement records. Used by the CLI and by tests.

pub mod analytics;
pub mod canonicalize; // Name / address / registration normal forms
pub mod config;
pub mod data_quality; // Record + fact screening before resolution
pub mod entities;
pub mod error;
pub mod graph; // Resolved snapshot every later stage reads
pub mod pipeline;
pub mod records;
pub mod red_flags;
pub mod relationships;
pub mod resolution;
pub mod similarity;
pub mod store; // SQLite graph store + review queue

// Re-export commonly used types
pub use analytics::{
    agency_concentration, contractor_reach, dynasty_scores, hhi, ConcentrationReport,
    ContractorReach, DynastyReport,
};
pub use canonicalize::{canonicalize, canonicalize_person, canonicalize_registration, surname_of};
pub use config::{
    DerivationConfig, DetectorConfig, DynastyWeights, PipelineConfig, ResolverConfig, RiskWeights,
};
pub use data_quality::{BatchSummary, DataQualityEngine, PriorIds, QualityIssue, QualityReport};
pub use entities::{CanonicalEntity, EntityRegistry};
pub use error::{ConfigError, DetectorError, PipelineError, Stage, StoreError};
pub use graph::ResolvedGraph;
pub use pipeline::{Pipeline, RunOutput, RunReport};
pub use records::{load_batch, load_records_csv, EntityKind, EntityRef, InputBatch, RawRecord};
pub use red_flags::{
    roll_up, DetectionContext, Detector, EntityRiskReport, Evidence, FlagSubject, FlagType,
    RedFlag, RedFlagEngine, Severity,
};
pub use relationships::{Derivation, DerivedEdge, EdgeEvidence, EdgeType, RelationshipDeriver};
pub use resolution::{
    Decision, EntityResolver, MergeDecision, ResolutionOutput, ReviewFeedback, ReviewStatus,
};
pub use similarity::similarity;
pub use store::{GraphStore, ReviewItem, SqliteGraphStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
