// 🔄 Pipeline - One batch, end to end
//
// screen → resolve → materialize → derive → detect → analytics → roll-up → commit
//
// Every stage before the commit is pure computation over the batch and the
// prior entities. Only the commit touches the store, in one transaction, so a
// failed run leaves the previously committed graph exactly as it was.

use crate::analytics::{
    agency_concentration, contractor_reach, dynasty_scores, ConcentrationReport, ContractorReach,
    DynastyReport,
};
use crate::config::PipelineConfig;
use crate::data_quality::{BatchSummary, DataQualityEngine, PriorIds, QualityIssue};
use crate::entities::{CanonicalEntity, EntityRegistry};
use crate::error::{DetectorError, PipelineError, Stage};
use crate::graph::ResolvedGraph;
use crate::records::InputBatch;
use crate::red_flags::{roll_up, EntityRiskReport, RedFlag, RedFlagEngine, Severity};
use crate::relationships::RelationshipDeriver;
use crate::resolution::{Decision, EntityResolver, MergeDecision, ReviewFeedback};
use crate::store::{CommitSummary, GraphStore, RunCommit};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

// ============================================================================
// RUN REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,

    pub data_quality: BatchSummary,
    pub data_quality_warnings: Vec<QualityIssue>,
    pub excluded_records: Vec<String>,

    pub entities: usize,
    pub auto_merges: usize,
    pub review_queue: usize,

    /// Edge type → count
    pub edges: BTreeMap<String, usize>,
    pub split_clusters: usize,

    /// Severity → count
    pub flags: BTreeMap<String, usize>,
    pub detector_failures: Vec<DetectorError>,

    pub risk: Vec<EntityRiskReport>,
    pub concentration: Vec<ConcentrationReport>,
    pub contractor_reach: Vec<ContractorReach>,
    pub dynasties: Vec<DynastyReport>,

    /// Filled in once the run is committed
    #[serde(default)]
    pub commit: Option<CommitSummary>,
}

impl RunReport {
    pub fn flag_count(&self, severity: Severity) -> usize {
        self.flags.get(severity.as_str()).copied().unwrap_or(0)
    }

    pub fn summary(&self) -> String {
        format!(
            "run {}: {} entities ({} auto-merged, {} to review) | {} edges | {} flags ({} critical, {} high) | {} detector failures",
            self.run_id,
            self.entities,
            self.auto_merges,
            self.review_queue,
            self.edges.values().sum::<usize>(),
            self.flags.values().sum::<usize>(),
            self.flag_count(Severity::Critical),
            self.flag_count(Severity::High),
            self.detector_failures.len()
        )
    }
}

/// Everything a run computed, ready to commit
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub graph: ResolvedGraph,
    pub flags: Vec<RedFlag>,
    pub review_queue: Vec<MergeDecision>,
    pub report: RunReport,
}

impl RunOutput {
    pub fn entities(&self) -> &[CanonicalEntity] {
        self.graph.entities.all()
    }

    fn commit_view(&self) -> RunCommit<'_> {
        RunCommit {
            run_id: &self.report.run_id,
            entities: self.graph.entities.all(),
            edges: &self.graph.edges,
            flags: &self.flags,
            concentration: &self.report.concentration,
            dynasties: &self.report.dynasties,
            review_queue: &self.review_queue,
        }
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

pub struct Pipeline {
    config: PipelineConfig,
    quality: DataQualityEngine,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Pipeline {
            config,
            quality: DataQualityEngine::new(),
        })
    }

    pub fn with_quality_engine(mut self, quality: DataQualityEngine) -> Self {
        self.quality = quality;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage in memory. Nothing here can fail: bad input is
    /// screened out and reported, detector failures are isolated.
    pub fn run(&self, batch: &InputBatch, prior: &[CanonicalEntity], feedback: &ReviewFeedback) -> RunOutput {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        info!(run_id = %run_id, records = batch.records.len(), facts = batch.fact_count(), "run started");

        // Screen
        let screened = self.quality.screen(batch, &PriorIds::from_entities(prior));
        let data_quality = self.quality.batch_summary(&screened);
        info!("{}", data_quality.summary());

        // Resolve
        let resolution = EntityResolver::new(self.config.resolver.clone()).resolve(
            &screened.batch.records,
            prior,
            feedback,
        );
        let auto_merges = resolution.count(Decision::AutoMerge);
        let review_queue = resolution.review_queue;

        // Derive
        let mut graph = ResolvedGraph::materialize(EntityRegistry::new(resolution.entities), &screened.batch);
        let derivation = RelationshipDeriver::new(self.config.derivation.clone()).derive(&graph);
        graph.attach(derivation);

        // Detect
        let detection = RedFlagEngine::new(self.config.detectors.clone()).run(&graph, started_at);
        if !detection.failures.is_empty() {
            warn!(failed = detection.failures.len(), "some detectors failed, their flags are missing");
        }

        // Analytics
        let concentration = agency_concentration(&graph, &self.config.detectors);
        let reach = contractor_reach(&graph);
        let dynasties = dynasty_scores(&graph, &self.config.dynasty);
        let risk = roll_up(&detection.flags, &self.config.risk);

        let mut edges: BTreeMap<String, usize> = BTreeMap::new();
        for edge in &graph.edges {
            *edges.entry(edge.edge_type.as_str().to_string()).or_default() += 1;
        }
        let mut flags: BTreeMap<String, usize> = BTreeMap::new();
        for flag in &detection.flags {
            *flags.entry(flag.severity.as_str().to_string()).or_default() += 1;
        }

        let report = RunReport {
            run_id,
            started_at,
            data_quality,
            data_quality_warnings: screened.warnings(),
            excluded_records: screened.excluded_records,
            entities: graph.entities.count(),
            auto_merges,
            review_queue: review_queue.len(),
            edges,
            split_clusters: graph.split_clusters.len(),
            flags,
            detector_failures: detection.failures,
            risk,
            concentration,
            contractor_reach: reach,
            dynasties,
            commit: None,
        };
        info!("{}", report.summary());

        RunOutput {
            graph,
            flags: detection.flags,
            review_queue,
            report,
        }
    }

    /// Load prior state from the store, run, and commit atomically
    pub fn run_and_commit<S: GraphStore>(&self, batch: &InputBatch, store: &mut S) -> Result<RunOutput, PipelineError> {
        let prior = store.load_entities().map_err(|source| PipelineError::Store {
            stage: Stage::Resolve,
            source,
        })?;
        let feedback = store.review_feedback().map_err(|source| PipelineError::Store {
            stage: Stage::Resolve,
            source,
        })?;

        let mut output = self.run(batch, &prior, &feedback);

        let summary = store.commit_run(&output.commit_view()).map_err(|source| {
            warn!(run_id = %output.report.run_id, error = %source, "commit failed, nothing was written");
            PipelineError::Store {
                stage: Stage::Commit,
                source,
            }
        })?;
        output.report.commit = Some(summary);
        Ok(output)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Pipeline {
            config: PipelineConfig::default(),
            quality: DataQualityEngine::new(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
