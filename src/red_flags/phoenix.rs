// Phoenix companies: a contractor that re-registered as, or shares both an
// address and a director with, a blacklisted contractor.

use super::{DetectionContext, Detector, Evidence, FlagSubject, FlagType, RedFlag, Severity};
use crate::error::DetectorError;
use crate::relationships::EdgeType;
use std::collections::{BTreeMap, BTreeSet};

pub struct PhoenixDetector;

impl Detector for PhoenixDetector {
    fn name(&self) -> &'static str {
        "phoenix_company"
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Result<Vec<RedFlag>, DetectorError> {
        let graph = ctx.graph;

        // (successor, blacklisted) → edge types that link them
        let mut links: BTreeMap<(&str, &str), BTreeSet<EdgeType>> = BTreeMap::new();

        for edge in graph.edges_of(EdgeType::ReRegisteredAs) {
            if graph.is_blacklisted(&edge.target) {
                links
                    .entry((edge.source.as_str(), edge.target.as_str()))
                    .or_default()
                    .insert(EdgeType::ReRegisteredAs);
            }
        }

        let shared_address: BTreeSet<(&str, &str)> = graph
            .edges_of(EdgeType::SameAddressAs)
            .map(|e| (e.source.as_str(), e.target.as_str()))
            .collect();
        for edge in graph.edges_of(EdgeType::SharesDirectorWith) {
            let pair = (edge.source.as_str(), edge.target.as_str());
            if !shared_address.contains(&pair) {
                continue;
            }
            for (successor, old) in [(pair.0, pair.1), (pair.1, pair.0)] {
                if graph.is_blacklisted(old) && !graph.is_blacklisted(successor) {
                    let via = links.entry((successor, old)).or_default();
                    via.insert(EdgeType::SameAddressAs);
                    via.insert(EdgeType::SharesDirectorWith);
                }
            }
        }

        let mut flags = Vec::new();
        for ((successor, old), via) in links {
            let offense = graph
                .blacklist
                .get(old)
                .map(|b| b.offense.clone())
                .unwrap_or_default();
            flags.push(ctx.flag(
                self.name(),
                FlagType::PhoenixCompany,
                Severity::Critical,
                FlagSubject::entity(successor),
                format!(
                    "{} looks like a re-registration of blacklisted {} (offense: {})",
                    graph.name_of(successor),
                    graph.name_of(old),
                    offense
                ),
                Evidence::Phoenix {
                    blacklisted: old.to_string(),
                    offense,
                    via: via.iter().map(|t| t.as_str().to_string()).collect(),
                },
            )?);
        }
        Ok(flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectorConfig;
    use crate::records::{BlacklistFact, EntityKind, EntityRef, InputBatch, OwnershipFact, OwnershipRole, RawRecord};
    use crate::relationships::test_support::*;
    use crate::relationships::{DerivedEdge, EdgeEvidence, RelationshipDeriver};
    use crate::graph::ResolvedGraph;
    use chrono::Utc;

    fn scenario(b_address: &str) -> ResolvedGraph {
        let records: Vec<RawRecord> = vec![
            record("a", EntityKind::Contractor, "Golden Arc Builders").with_address("12 Rizal St., Cebu City"),
            record("b", EntityKind::Contractor, "Silver Line Infra").with_address(b_address),
        ];
        let director = |c: &str| OwnershipFact {
            contractor: EntityRef::record(c),
            person_name: "Roberto Santos".to_string(),
            role: OwnershipRole::Director,
        };
        let batch = InputBatch {
            ownerships: vec![director("a"), director("b")],
            blacklist: vec![BlacklistFact {
                contractor: EntityRef::record("a"),
                offense: "Abandonment of project".to_string(),
                sanction_date: None,
            }],
            ..Default::default()
        };
        let mut graph = graph_from(records, batch);
        let derivation = RelationshipDeriver::default().derive(&graph);
        graph.attach(derivation);
        graph
    }

    #[test]
    fn test_successor_of_blacklisted_is_critical() {
        let graph = scenario("12 RIZAL ST CEBU CITY");
        let config = DetectorConfig::default();
        let ctx = DetectionContext::new(&graph, &config, Utc::now());

        let flags = PhoenixDetector.detect(&ctx).unwrap();

        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].severity, Severity::Critical);
        assert_eq!(flags[0].subject, FlagSubject::entity(&id_of(&graph, "b")));
        match &flags[0].evidence {
            Evidence::Phoenix { blacklisted, via, .. } => {
                assert_eq!(blacklisted, &id_of(&graph, "a"));
                assert!(via.contains(&"RE_REGISTERED_AS".to_string()));
                assert!(via.contains(&"SAME_ADDRESS_AS".to_string()));
            }
            other => panic!("unexpected evidence {:?}", other),
        }
    }

    #[test]
    fn test_shared_director_alone_is_not_phoenix() {
        let graph = scenario("99 Osmena Blvd, Cebu City");
        let config = DetectorConfig::default();
        let ctx = DetectionContext::new(&graph, &config, Utc::now());

        assert!(PhoenixDetector.detect(&ctx).unwrap().is_empty());
    }

    #[test]
    fn test_address_and_director_edges_without_re_registration() {
        let mut graph = scenario("99 Osmena Blvd, Cebu City");
        let (a, b) = (id_of(&graph, "a"), id_of(&graph, "b"));
        graph.edges.push(DerivedEdge::new(
            EdgeType::SameAddressAs,
            &a,
            &b,
            EdgeEvidence::SharedAddress {
                address: "shared".to_string(),
            },
        ));
        let config = DetectorConfig::default();
        let ctx = DetectionContext::new(&graph, &config, Utc::now());

        let flags = PhoenixDetector.detect(&ctx).unwrap();

        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].subject, FlagSubject::entity(&b));
    }
}
