// 🔗 Relationship Deriver - Edges no single source states
//
// Every derivation reads the resolved graph and emits typed edges between
// canonical entities. Output is sorted by (type, source, target) so identical
// inputs always give an identical edge list.

pub mod co_bidding;
pub mod family;
pub mod shell;
pub mod splitting;
pub mod subcontracts;

use crate::config::DerivationConfig;
use crate::graph::ResolvedGraph;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

// ============================================================================
// EDGE TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeType {
    CoBidWith,
    SubcontractedTo,
    SharesDirectorWith,
    SameAddressAs,
    ReRegisteredAs,
    FamilyOf,
    AssociatedWith,
    AlliedWith,
}

impl EdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::CoBidWith => "CO_BID_WITH",
            EdgeType::SubcontractedTo => "SUBCONTRACTED_TO",
            EdgeType::SharesDirectorWith => "SHARES_DIRECTOR_WITH",
            EdgeType::SameAddressAs => "SAME_ADDRESS_AS",
            EdgeType::ReRegisteredAs => "RE_REGISTERED_AS",
            EdgeType::FamilyOf => "FAMILY_OF",
            EdgeType::AssociatedWith => "ASSOCIATED_WITH",
            EdgeType::AlliedWith => "ALLIED_WITH",
        }
    }

    /// Symmetric edges are stored once with source < target
    pub fn is_symmetric(&self) -> bool {
        matches!(
            self,
            EdgeType::CoBidWith
                | EdgeType::SharesDirectorWith
                | EdgeType::SameAddressAs
                | EdgeType::AlliedWith
        )
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WinPattern {
    /// Wins alternate between the pair and both have won
    Rotating,
    Competitive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoBidIntensity {
    Frequent,
    Occasional,
}

// ============================================================================
// EVIDENCE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EdgeEvidence {
    CoBidding {
        contract_count: usize,
        /// Time-ordered
        shared_contracts: Vec<String>,
        win_pattern: WinPattern,
        intensity: CoBidIntensity,
        source_wins: usize,
        target_wins: usize,
    },
    Subcontracting {
        total_value: f64,
        subcontract_count: usize,
        contract_refs: Vec<String>,
    },
    SharedDirectors {
        directors: Vec<String>,
    },
    SharedAddress {
        address: String,
    },
    ReRegistration {
        shared_directors: Vec<String>,
        address: String,
        blacklist_offense: String,
        source_registered_on: Option<NaiveDate>,
        target_registered_on: Option<NaiveDate>,
    },
    SurnameMatch {
        owners: Vec<String>,
        owner_surname: String,
        politician_surname: String,
        similarity: f64,
        jurisdictions: Vec<String>,
        /// Always true: a surname match is a heuristic, never proof of kinship
        heuristic: bool,
    },
    PoliticalFamily {
        family: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedEdge {
    pub edge_type: EdgeType,
    pub source: String,
    pub target: String,
    pub evidence: EdgeEvidence,
}

impl DerivedEdge {
    /// Build an edge, ordering the endpoints of symmetric types
    pub fn new(edge_type: EdgeType, source: &str, target: &str, evidence: EdgeEvidence) -> Self {
        let (source, target) = if edge_type.is_symmetric() && target < source {
            (target, source)
        } else {
            (source, target)
        };
        DerivedEdge {
            edge_type,
            source: source.to_string(),
            target: target.to_string(),
            evidence,
        }
    }

    pub fn touches(&self, id: &str) -> bool {
        self.source == id || self.target == id
    }

    /// The other endpoint, if `id` is one of them
    pub fn other(&self, id: &str) -> Option<&str> {
        if self.source == id {
            Some(self.target.as_str())
        } else if self.target == id {
            Some(self.source.as_str())
        } else {
            None
        }
    }
}

/// Contracts from one agency to one contractor that together dodge the
/// competitive-bidding threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitCluster {
    pub agency: String,
    pub contractor: String,
    /// Time-ordered
    pub contract_refs: Vec<String>,
    pub amounts: Vec<f64>,
    pub total: f64,
    pub threshold: f64,
    pub first_award: NaiveDate,
    pub last_award: NaiveDate,
}

// ============================================================================
// DERIVER
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Derivation {
    pub edges: Vec<DerivedEdge>,
    pub split_clusters: Vec<SplitCluster>,
}

impl Derivation {
    pub fn count(&self, edge_type: EdgeType) -> usize {
        self.edges.iter().filter(|e| e.edge_type == edge_type).count()
    }
}

pub struct RelationshipDeriver {
    config: DerivationConfig,
}

impl RelationshipDeriver {
    pub fn new(config: DerivationConfig) -> Self {
        RelationshipDeriver { config }
    }

    pub fn derive(&self, graph: &ResolvedGraph) -> Derivation {
        let mut edges = Vec::new();
        edges.extend(co_bidding::derive_co_bidding(graph, &self.config));
        edges.extend(subcontracts::derive_subcontracting(graph));
        edges.extend(shell::derive_shell_links(graph));
        edges.extend(family::derive_surname_links(graph, &self.config));
        edges.extend(family::derive_alliances(graph));

        edges.sort_by(|a, b| {
            a.edge_type
                .cmp(&b.edge_type)
                .then_with(|| a.source.cmp(&b.source))
                .then_with(|| a.target.cmp(&b.target))
        });

        let split_clusters = splitting::find_split_clusters(graph, &self.config);

        let derivation = Derivation {
            edges,
            split_clusters,
        };

        info!(
            edges = derivation.edges.len(),
            co_bid = derivation.count(EdgeType::CoBidWith),
            subcontracted = derivation.count(EdgeType::SubcontractedTo),
            re_registered = derivation.count(EdgeType::ReRegisteredAs),
            family = derivation.count(EdgeType::FamilyOf),
            split_clusters = derivation.split_clusters.len(),
            "relationship derivation complete"
        );

        derivation
    }
}

impl Default for RelationshipDeriver {
    fn default() -> Self {
        Self::new(DerivationConfig::default())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Small graph builders shared by derivation and detector tests

    use crate::entities::{CanonicalEntity, EntityRegistry};
    use crate::graph::ResolvedGraph;
    use crate::records::{BidFact, ContractFact, EntityKind, EntityRef, InputBatch, RawRecord};
    use chrono::NaiveDate;

    /// Records become singleton entities; facts refer to them by record id
    pub fn graph_from(records: Vec<RawRecord>, batch: InputBatch) -> ResolvedGraph {
        let entities = EntityRegistry::new(
            records
                .iter()
                .filter_map(|r| CanonicalEntity::from_cluster(&[r]))
                .collect(),
        );
        ResolvedGraph::materialize(entities, &batch)
    }

    pub fn record(id: &str, kind: EntityKind, name: &str) -> RawRecord {
        RawRecord::new(id, kind, name, "test")
    }

    pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    pub fn contract(reference: &str, agency: &str, awardee: Option<&str>, amount: f64, day: NaiveDate) -> ContractFact {
        ContractFact {
            reference: reference.to_string(),
            agency: EntityRef::record(agency),
            awardee: awardee.map(EntityRef::record),
            title: String::new(),
            amount,
            award_date: day,
            bid_count: None,
        }
    }

    pub fn bid(contract_ref: &str, bidder: &str, amount: f64, won: bool) -> BidFact {
        BidFact {
            contract_ref: contract_ref.to_string(),
            bidder: EntityRef::record(bidder),
            amount,
            won,
        }
    }

    /// Canonical id of a record in a graph built by `graph_from`
    pub fn id_of(graph: &ResolvedGraph, record: &str) -> String {
        graph
            .entities
            .resolve(&EntityRef::record(record))
            .unwrap()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::records::{EntityKind, InputBatch};

    fn bidding_batch() -> (Vec<crate::records::RawRecord>, InputBatch) {
        let records = vec![
            record("a1", EntityKind::Agency, "DPWH Region VII"),
            record("c1", EntityKind::Contractor, "Alpha Builders"),
            record("c2", EntityKind::Contractor, "Bravo Construction"),
            record("c3", EntityKind::Contractor, "Charlie Aggregates"),
        ];
        let batch = InputBatch {
            contracts: vec![
                contract("C-1", "a1", Some("c1"), 3_000_000.0, date(2024, 1, 10)),
                contract("C-2", "a1", Some("c2"), 3_000_000.0, date(2024, 2, 10)),
                contract("C-3", "a1", Some("c1"), 3_000_000.0, date(2024, 3, 10)),
            ],
            bids: vec![
                bid("C-1", "c1", 2_900_000.0, true),
                bid("C-1", "c2", 2_950_000.0, false),
                bid("C-1", "c3", 2_990_000.0, false),
                bid("C-2", "c2", 2_900_000.0, true),
                bid("C-2", "c1", 2_950_000.0, false),
                bid("C-3", "c1", 2_900_000.0, true),
                bid("C-3", "c2", 2_950_000.0, false),
            ],
            ..Default::default()
        };
        (records, batch)
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let (records, batch) = bidding_batch();
        let graph = graph_from(records.clone(), batch.clone());
        let first = RelationshipDeriver::default().derive(&graph);

        let mut shuffled = batch;
        shuffled.bids.reverse();
        shuffled.contracts.reverse();
        let mut reversed_records = records;
        reversed_records.reverse();
        let second = RelationshipDeriver::default().derive(&graph_from(reversed_records, shuffled));

        assert_eq!(first, second);
        assert_eq!(first.count(EdgeType::CoBidWith), 1);
    }

    #[test]
    fn test_symmetric_edges_order_endpoints() {
        let edge = DerivedEdge::new(
            EdgeType::SameAddressAs,
            "ent-b",
            "ent-a",
            EdgeEvidence::SharedAddress {
                address: "12 rizal st".to_string(),
            },
        );
        assert_eq!(edge.source, "ent-a");
        assert_eq!(edge.other("ent-a"), Some("ent-b"));

        let directed = DerivedEdge::new(
            EdgeType::SubcontractedTo,
            "ent-b",
            "ent-a",
            EdgeEvidence::Subcontracting {
                total_value: 1.0,
                subcontract_count: 1,
                contract_refs: vec![],
            },
        );
        assert_eq!(directed.source, "ent-b");
    }
}
