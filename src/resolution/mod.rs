// 🔍 Entity Resolver - Collapse noisy spellings into canonical entities
//
// records → blocks → scored pairs → decisions → union-find → clusters → entities
//
// Decision bands (configurable):
//   score ≥ auto_merge_threshold                → AutoMerge
//   review_threshold ≤ score < auto threshold   → NeedsReview (queued, never merged)
//   below                                       → Distinct

pub mod blocking;
pub mod review;
pub mod union_find;

pub use review::{pair_key, ReviewFeedback, ReviewStatus};

use crate::canonicalize::{canonicalize, canonicalize_registration};
use crate::config::ResolverConfig;
use crate::entities::CanonicalEntity;
use crate::records::{EntityKind, RawRecord};
use crate::similarity::similarity;
use blocking::{build_blocks, candidate_pairs, ResolutionNode};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use tracing::{debug, info, warn};
use union_find::UnionFind;

// ============================================================================
// DECISIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    AutoMerge,
    NeedsReview,
    Distinct,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::AutoMerge => "auto_merge",
            Decision::NeedsReview => "needs_review",
            Decision::Distinct => "distinct",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome for one scored pair. `left < right` always.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeDecision {
    pub left: String,
    pub right: String,
    pub kind: EntityKind,
    pub left_name: String,
    pub right_name: String,
    pub score: f64,
    pub decision: Decision,
    pub rationale: String,
}

#[derive(Debug, Clone, Default)]
pub struct ResolutionOutput {
    /// Sorted by id
    pub entities: Vec<CanonicalEntity>,
    /// Every scored pair, sorted by (left, right)
    pub decisions: Vec<MergeDecision>,
    /// The NeedsReview subset
    pub review_queue: Vec<MergeDecision>,
}

impl ResolutionOutput {
    pub fn count(&self, decision: Decision) -> usize {
        self.decisions.iter().filter(|d| d.decision == decision).count()
    }
}

// ============================================================================
// RESOLVER
// ============================================================================

const CONFIRMED: &str = "confirmed by reviewer";

enum NodeSource<'a> {
    Record(&'a RawRecord),
    Prior(&'a CanonicalEntity),
}

pub struct EntityResolver {
    config: ResolverConfig,
}

impl EntityResolver {
    pub fn new(config: ResolverConfig) -> Self {
        EntityResolver { config }
    }

    /// Resolve a batch of well-formed records against prior entities.
    ///
    /// Prior entities untouched by this batch come back unchanged. A cluster
    /// that overlaps prior entities keeps the id of the one with the largest
    /// record overlap (ties → smallest id) and absorbs the others.
    pub fn resolve(
        &self,
        records: &[RawRecord],
        prior: &[CanonicalEntity],
        feedback: &ReviewFeedback,
    ) -> ResolutionOutput {
        let (nodes, sources) = build_nodes(records, prior);
        let index: HashMap<&str, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.as_str(), i))
            .collect();

        let blocks = build_blocks(&nodes, self.config.registration_prefix_len);
        let pairs = candidate_pairs(&blocks, &nodes);
        debug!(nodes = nodes.len(), blocks = blocks.len(), pairs = pairs.len(), "blocking done");

        let mut decisions: Vec<MergeDecision> = pairs
            .par_iter()
            .map(|&(i, j)| self.decide(&nodes[i], &nodes[j], feedback))
            .collect();

        // Confirmed pairs merge even when blocking never put them together.
        // Their endpoints may be records absorbed into prior entities.
        let mut confirmed = confirmed_node_pairs(&nodes, &sources, &index, feedback);
        for d in decisions.iter_mut() {
            if let (Some(&i), Some(&j)) = (index.get(d.left.as_str()), index.get(d.right.as_str())) {
                if confirmed.remove(&(i, j)) {
                    d.decision = Decision::AutoMerge;
                    d.rationale = CONFIRMED.to_string();
                }
            }
        }
        decisions.extend(confirmed.into_iter().map(|(i, j)| {
            let mut forced = self.decide(&nodes[i], &nodes[j], feedback);
            forced.decision = Decision::AutoMerge;
            forced.rationale = CONFIRMED.to_string();
            forced
        }));
        decisions.sort_by(|x, y| x.left.cmp(&y.left).then_with(|| x.right.cmp(&y.right)));

        // Cluster
        let mut uf = UnionFind::new(nodes.len());
        for d in decisions.iter().filter(|d| d.decision == Decision::AutoMerge) {
            if let (Some(&i), Some(&j)) = (index.get(d.left.as_str()), index.get(d.right.as_str())) {
                uf.union(i, j);
            }
        }
        link_previously_resolved(&mut uf, &sources, &index);

        let mut entities: Vec<CanonicalEntity> = uf
            .groups()
            .into_iter()
            .filter_map(|group| build_entity(&group, &sources))
            .collect();
        entities.sort_by(|a, b| a.id.cmp(&b.id));

        let review_queue: Vec<MergeDecision> = decisions
            .iter()
            .filter(|d| d.decision == Decision::NeedsReview)
            .cloned()
            .collect();

        let output = ResolutionOutput {
            entities,
            decisions,
            review_queue,
        };

        info!(
            records = records.len(),
            prior = prior.len(),
            entities = output.entities.len(),
            auto_merge = output.count(Decision::AutoMerge),
            needs_review = output.count(Decision::NeedsReview),
            "entity resolution complete"
        );

        output
    }

    fn decide(&self, a: &ResolutionNode, b: &ResolutionNode, feedback: &ReviewFeedback) -> MergeDecision {
        let (left, right) = if a.id <= b.id { (a, b) } else { (b, a) };
        let score = name_score(left, right);

        let (decision, rationale) = match feedback.verdict(&left.id, &right.id) {
            Some(ReviewStatus::Confirmed) => (Decision::AutoMerge, CONFIRMED.to_string()),
            Some(ReviewStatus::Rejected) => (Decision::Distinct, "rejected by reviewer".to_string()),
            _ => self.classify(left, right, score),
        };

        MergeDecision {
            left: left.id.clone(),
            right: right.id.clone(),
            kind: left.kind,
            left_name: left.names.first().cloned().unwrap_or_default(),
            right_name: right.names.first().cloned().unwrap_or_default(),
            score,
            decision,
            rationale,
        }
    }

    fn classify(&self, a: &ResolutionNode, b: &ResolutionNode, score: f64) -> (Decision, String) {
        let same_registration = matches!(
            (&a.registration, &b.registration),
            (Some(x), Some(y)) if !x.is_empty() && x == y
        );
        if same_registration {
            return (Decision::AutoMerge, "registration number match".to_string());
        }

        if score >= self.config.auto_merge_threshold {
            (
                Decision::AutoMerge,
                format!(
                    "name similarity {:.3} ≥ auto-merge threshold {:.2}",
                    score, self.config.auto_merge_threshold
                ),
            )
        } else if score >= self.config.review_threshold {
            (
                Decision::NeedsReview,
                format!(
                    "name similarity {:.3} in review band [{:.2}, {:.2})",
                    score, self.config.review_threshold, self.config.auto_merge_threshold
                ),
            )
        } else {
            (
                Decision::Distinct,
                format!(
                    "name similarity {:.3} below review threshold {:.2}",
                    score, self.config.review_threshold
                ),
            )
        }
    }
}

impl Default for EntityResolver {
    fn default() -> Self {
        Self::new(ResolverConfig::default())
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn build_nodes<'a>(
    records: &'a [RawRecord],
    prior: &'a [CanonicalEntity],
) -> (Vec<ResolutionNode>, Vec<NodeSource<'a>>) {
    let mut nodes = Vec::with_capacity(records.len() + prior.len());
    let mut sources = Vec::with_capacity(records.len() + prior.len());

    for record in records {
        let name = canonicalize(&record.name);
        if name.is_empty() {
            warn!(record_id = %record.record_id, "record without a usable name reached the resolver");
            continue;
        }
        nodes.push(ResolutionNode {
            id: record.record_id.clone(),
            kind: record.kind,
            names: vec![name],
            registration: canonical_registration(&record.registration_number),
            prior: false,
        });
        sources.push(NodeSource::Record(record));
    }

    for entity in prior {
        let mut names: Vec<String> = Vec::new();
        for name in entity.all_names() {
            let canonical = canonicalize(&name);
            if !canonical.is_empty() && !names.contains(&canonical) {
                names.push(canonical);
            }
        }
        nodes.push(ResolutionNode {
            id: entity.id.clone(),
            kind: entity.kind,
            names,
            registration: canonical_registration(&entity.registration_number),
            prior: true,
        });
        sources.push(NodeSource::Prior(entity));
    }

    (nodes, sources)
}

fn canonical_registration(raw: &Option<String>) -> Option<String> {
    raw.as_deref()
        .map(canonicalize_registration)
        .filter(|r| !r.is_empty())
}

/// Best similarity over every name pairing
fn name_score(a: &ResolutionNode, b: &ResolutionNode) -> f64 {
    a.names
        .iter()
        .flat_map(|x| b.names.iter().map(move |y| similarity(x, y)))
        .fold(0.0, f64::max)
}

/// Map each confirmed pair onto node indices, ordered so that
/// `nodes[i].id < nodes[j].id`. An endpoint is either a node id itself or a
/// record id (or retired entity id) held by a prior entity.
fn confirmed_node_pairs(
    nodes: &[ResolutionNode],
    sources: &[NodeSource<'_>],
    index: &HashMap<&str, usize>,
    feedback: &ReviewFeedback,
) -> BTreeSet<(usize, usize)> {
    let mut absorbed: HashMap<&str, usize> = HashMap::new();
    for (idx, source) in sources.iter().enumerate() {
        if let NodeSource::Prior(entity) = source {
            for id in entity.sources.iter().chain(entity.merged_from.iter()) {
                absorbed.insert(id.as_str(), idx);
            }
        }
    }
    let locate = |id: &str| index.get(id).or_else(|| absorbed.get(id)).copied();

    let mut pairs = BTreeSet::new();
    for (a, b) in feedback.confirmed() {
        match (locate(a), locate(b)) {
            (Some(i), Some(j)) if i == j => {}
            (Some(i), Some(j)) if nodes[i].kind == nodes[j].kind => {
                if nodes[i].id <= nodes[j].id {
                    pairs.insert((i, j));
                } else {
                    pairs.insert((j, i));
                }
            }
            (Some(_), Some(_)) => {
                warn!(left = a, right = b, "ignoring confirmed pair of different kinds");
            }
            _ => {
                warn!(left = a, right = b, "confirmed pair does not match any known record or entity");
            }
        }
    }
    pairs
}

/// A record already listed as a source of a prior entity rejoins it
fn link_previously_resolved(
    uf: &mut UnionFind,
    sources: &[NodeSource<'_>],
    index: &HashMap<&str, usize>,
) {
    for (prior_idx, source) in sources.iter().enumerate() {
        if let NodeSource::Prior(entity) = source {
            for record_id in &entity.sources {
                if let Some(&record_idx) = index.get(record_id.as_str()) {
                    if record_idx != prior_idx {
                        uf.union(record_idx, prior_idx);
                    }
                }
            }
        }
    }
}

fn build_entity(group: &[usize], sources: &[NodeSource<'_>]) -> Option<CanonicalEntity> {
    let mut records: Vec<&RawRecord> = Vec::new();
    let mut priors: Vec<&CanonicalEntity> = Vec::new();
    for &idx in group {
        match sources[idx] {
            NodeSource::Record(r) => records.push(r),
            NodeSource::Prior(e) => priors.push(e),
        }
    }

    if priors.is_empty() {
        return CanonicalEntity::from_cluster(&records);
    }

    priors.sort_by(|a, b| a.id.cmp(&b.id));
    let overlap = |e: &CanonicalEntity| {
        records
            .iter()
            .filter(|r| e.sources.contains(&r.record_id))
            .count()
    };
    // Largest overlap; on a tie the earlier (smaller) id wins
    let survivor_pos = priors
        .iter()
        .enumerate()
        .max_by(|(ia, a), (ib, b)| overlap(**a).cmp(&overlap(**b)).then_with(|| ib.cmp(ia)))
        .map(|(pos, _)| pos)?;

    let mut survivor = priors[survivor_pos].clone();
    for (pos, other) in priors.iter().enumerate() {
        if pos != survivor_pos {
            survivor.absorb(other);
        }
    }

    records.sort_by(|a, b| {
        a.retrieved_at
            .cmp(&b.retrieved_at)
            .then_with(|| a.record_id.cmp(&b.record_id))
    });
    for record in records {
        survivor.add_record(record);
    }

    Some(survivor)
}

// ============================================================================
// TESTS
// ============================================================================
