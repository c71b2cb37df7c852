// Collusion rings: dense communities of co-bidders whose wins rotate.

use super::community::{detect_communities, WeightedGraph};
use super::{DetectionContext, Detector, Evidence, FlagSubject, FlagType, RedFlag, Severity};
use crate::error::DetectorError;
use crate::relationships::{EdgeEvidence, EdgeType, WinPattern};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

pub struct CollusionRingDetector;

struct CoBid<'a> {
    a: usize,
    b: usize,
    rotating: bool,
    contracts: &'a [String],
}

impl Detector for CollusionRingDetector {
    fn name(&self) -> &'static str {
        "collusion_ring"
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Result<Vec<RedFlag>, DetectorError> {
        let graph = ctx.graph;
        let config = ctx.config;

        let ids: BTreeSet<&str> = graph
            .edges_of(EdgeType::CoBidWith)
            .flat_map(|e| [e.source.as_str(), e.target.as_str()])
            .collect();
        let ids: Vec<&str> = ids.into_iter().collect();
        let index: BTreeMap<&str, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();

        let mut weighted = WeightedGraph::new(ids.len());
        let mut co_bids = Vec::new();
        for edge in graph.edges_of(EdgeType::CoBidWith) {
            let EdgeEvidence::CoBidding {
                contract_count,
                shared_contracts,
                win_pattern,
                ..
            } = &edge.evidence
            else {
                continue;
            };
            let (a, b) = (index[edge.source.as_str()], index[edge.target.as_str()]);
            weighted.add_edge(a, b, *contract_count as f64);
            co_bids.push(CoBid {
                a,
                b,
                rotating: *win_pattern == WinPattern::Rotating,
                contracts: shared_contracts,
            });
        }

        let partition = detect_communities(&weighted, config.community_max_iterations);
        if !partition.converged && !weighted.is_empty() {
            warn!(
                sweeps = partition.sweeps,
                "community detection hit its sweep budget, using the current partition"
            );
        }

        let mut flags = Vec::new();
        for members in &partition.communities {
            if members.len() < config.ring_min_size {
                continue;
            }
            let in_ring: BTreeSet<usize> = members.iter().copied().collect();
            let internal: Vec<&CoBid> = co_bids
                .iter()
                .filter(|c| in_ring.contains(&c.a) && in_ring.contains(&c.b))
                .collect();

            let n = members.len() as f64;
            let density = internal.len() as f64 / (n * (n - 1.0) / 2.0);
            let rotation = if internal.is_empty() {
                0.0
            } else {
                internal.iter().filter(|c| c.rotating).count() as f64 / internal.len() as f64
            };
            debug!(size = members.len(), density, rotation, "co-bidding community");
            if density < config.ring_min_density || rotation < config.ring_min_rotation {
                continue;
            }

            let severity = if members.len() >= 4 && rotation >= 0.75 {
                Severity::Critical
            } else {
                Severity::High
            };
            let member_ids: Vec<String> = members.iter().map(|&i| ids[i].to_string()).collect();
            let shared_contracts: Vec<String> = internal
                .iter()
                .flat_map(|c| c.contracts.iter().cloned())
                .collect::<BTreeSet<String>>()
                .into_iter()
                .collect();
            let names: Vec<&str> = member_ids.iter().map(|id| graph.name_of(id)).collect();

            // One flag per member so each member's risk roll-up sees it
            for member in &member_ids {
                flags.push(ctx.flag(
                    self.name(),
                    FlagType::CollusionRing,
                    severity,
                    FlagSubject::entity(member),
                    format!(
                        "{} is part of a {}-member bidding ring ({}) with {:.0}% rotating wins",
                        graph.name_of(member),
                        members.len(),
                        names.join(", "),
                        rotation * 100.0
                    ),
                    Evidence::CollusionRing {
                        members: member_ids.clone(),
                        density,
                        rotation,
                        shared_contracts: shared_contracts.clone(),
                    },
                )?);
            }
        }

        Ok(flags)
    }
}
