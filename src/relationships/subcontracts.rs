// SUBCONTRACTED_TO: one edge per (contractor, subcontractor), value summed.

use super::{DerivedEdge, EdgeEvidence, EdgeType};
use crate::graph::ResolvedGraph;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

#[derive(Default)]
struct Aggregate<'a> {
    total: f64,
    count: usize,
    refs: BTreeSet<&'a str>,
}

pub fn derive_subcontracting(graph: &ResolvedGraph) -> Vec<DerivedEdge> {
    let mut pairs: BTreeMap<(&str, &str), Aggregate> = BTreeMap::new();

    for sub in &graph.subcontracts {
        if sub.contractor == sub.subcontractor {
            debug!(entity = %sub.contractor, "ignoring subcontract to self");
            continue;
        }
        let agg = pairs
            .entry((sub.contractor.as_str(), sub.subcontractor.as_str()))
            .or_default();
        agg.total += sub.amount;
        agg.count += 1;
        if let Some(r) = sub.contract_ref.as_deref() {
            agg.refs.insert(r);
        }
    }

    pairs
        .into_iter()
        .map(|((from, to), agg)| {
            DerivedEdge::new(
                EdgeType::SubcontractedTo,
                from,
                to,
                EdgeEvidence::Subcontracting {
                    total_value: agg.total,
                    subcontract_count: agg.count,
                    contract_refs: agg.refs.into_iter().map(str::to_string).collect(),
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::records::{EntityKind, EntityRef, InputBatch, SubcontractFact};

    fn sub(from: &str, to: &str, amount: f64, contract_ref: Option<&str>) -> SubcontractFact {
        SubcontractFact {
            contract_ref: contract_ref.map(str::to_string),
            contractor: EntityRef::record(from),
            subcontractor: EntityRef::record(to),
            amount,
        }
    }

    #[test]
    fn test_subcontracts_aggregate_per_pair() {
        let records = vec![
            record("c1", EntityKind::Contractor, "Alpha Builders"),
            record("c2", EntityKind::Contractor, "Bravo Construction"),
        ];
        let batch = InputBatch {
            subcontracts: vec![
                sub("c1", "c2", 10_000_000.0, Some("C-1")),
                sub("c1", "c2", 5_000_000.0, Some("C-2")),
                sub("c2", "c1", 1_000_000.0, None),
                sub("c1", "c1", 1_000_000.0, None),
            ],
            ..Default::default()
        };
        let graph = graph_from(records, batch);
        let (c1, c2) = (id_of(&graph, "c1"), id_of(&graph, "c2"));

        let edges = derive_subcontracting(&graph);

        assert_eq!(edges.len(), 2);
        let forward = edges.iter().find(|e| e.source == c1 && e.target == c2).unwrap();
        assert_eq!(
            forward.evidence,
            EdgeEvidence::Subcontracting {
                total_value: 15_000_000.0,
                subcontract_count: 2,
                contract_refs: vec!["C-1".to_string(), "C-2".to_string()],
            }
        );
    }
}
