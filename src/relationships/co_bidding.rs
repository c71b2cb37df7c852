// CO_BID_WITH: contractors that keep showing up on the same contracts.

use super::{CoBidIntensity, DerivedEdge, EdgeEvidence, EdgeType, WinPattern};
use crate::config::DerivationConfig;
use crate::graph::ResolvedGraph;
use std::collections::{BTreeMap, BTreeSet};

pub fn derive_co_bidding(graph: &ResolvedGraph, config: &DerivationConfig) -> Vec<DerivedEdge> {
    // (a, b) with a < b → time-ordered (contract ref, winner)
    let mut shared: BTreeMap<(&str, &str), Vec<(&str, Option<&str>)>> = BTreeMap::new();

    for contract in &graph.contracts {
        let bidders: BTreeSet<&str> = graph
            .bids_on(&contract.reference)
            .map(|b| b.bidder.as_str())
            .collect();
        if bidders.len() < 2 {
            continue;
        }

        let winner = graph.winner_of(contract);
        let bidders: Vec<&str> = bidders.into_iter().collect();
        for (i, &a) in bidders.iter().enumerate() {
            for &b in &bidders[i + 1..] {
                shared
                    .entry((a, b))
                    .or_default()
                    .push((contract.reference.as_str(), winner));
            }
        }
    }

    shared
        .into_iter()
        .filter(|(_, contracts)| contracts.len() >= config.min_shared_contracts)
        .map(|((a, b), contracts)| {
            let winners: Vec<&str> = contracts
                .iter()
                .filter_map(|(_, w)| *w)
                .filter(|w| *w == a || *w == b)
                .collect();
            let source_wins = winners.iter().filter(|w| **w == a).count();
            let target_wins = winners.len() - source_wins;

            let intensity = if contracts.len() >= config.frequent_co_bid_count {
                CoBidIntensity::Frequent
            } else {
                CoBidIntensity::Occasional
            };

            DerivedEdge::new(
                EdgeType::CoBidWith,
                a,
                b,
                EdgeEvidence::CoBidding {
                    contract_count: contracts.len(),
                    shared_contracts: contracts.iter().map(|(r, _)| r.to_string()).collect(),
                    win_pattern: win_pattern(&winners, source_wins, target_wins),
                    intensity,
                    source_wins,
                    target_wins,
                },
            )
        })
        .collect()
}

/// Rotating: both members won, and the same member never won twice in a row
fn win_pattern(winners: &[&str], source_wins: usize, target_wins: usize) -> WinPattern {
    let alternates = winners.windows(2).all(|w| w[0] != w[1]);
    if source_wins > 0 && target_wins > 0 && alternates {
        WinPattern::Rotating
    } else {
        WinPattern::Competitive
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::records::{EntityKind, InputBatch};

    fn graph(winners: &[&str]) -> ResolvedGraph {
        let records = vec![
            record("a1", EntityKind::Agency, "DPWH"),
            record("c1", EntityKind::Contractor, "Alpha Builders"),
            record("c2", EntityKind::Contractor, "Bravo Construction"),
        ];
        let mut batch = InputBatch::default();
        for (i, w) in winners.iter().enumerate() {
            let reference = format!("C-{}", i);
            batch.contracts.push(contract(
                &reference,
                "a1",
                Some(*w),
                1_000_000.0,
                date(2024, 1 + i as u32, 1),
            ));
            batch.bids.push(bid(&reference, "c1", 990_000.0, *w == "c1"));
            batch.bids.push(bid(&reference, "c2", 995_000.0, *w == "c2"));
        }
        graph_from(records, batch)
    }

    fn evidence(edges: &[DerivedEdge]) -> (usize, WinPattern, CoBidIntensity) {
        match &edges[0].evidence {
            EdgeEvidence::CoBidding {
                contract_count,
                win_pattern,
                intensity,
                ..
            } => (*contract_count, *win_pattern, *intensity),
            other => panic!("unexpected evidence {:?}", other),
        }
    }

    #[test]
    fn test_alternating_wins_are_rotating() {
        let g = graph(&["c1", "c2", "c1", "c2"]);
        let edges = derive_co_bidding(&g, &DerivationConfig::default());

        assert_eq!(edges.len(), 1);
        assert_eq!(
            evidence(&edges),
            (4, WinPattern::Rotating, CoBidIntensity::Occasional)
        );
    }

    #[test]
    fn test_repeat_winner_is_competitive() {
        let g = graph(&["c1", "c1", "c2", "c1", "c2"]);
        let edges = derive_co_bidding(&g, &DerivationConfig::default());

        assert_eq!(
            evidence(&edges),
            (5, WinPattern::Competitive, CoBidIntensity::Frequent)
        );
    }

    #[test]
    fn test_single_shared_contract_is_not_an_edge() {
        let g = graph(&["c1"]);
        assert!(derive_co_bidding(&g, &DerivationConfig::default()).is_empty());
    }

    #[test]
    fn test_one_member_always_winning_is_competitive() {
        let g = graph(&["c2", "c2"]);
        let edges = derive_co_bidding(&g, &DerivationConfig::default());
        assert_eq!(evidence(&edges).1, WinPattern::Competitive);
    }
}
