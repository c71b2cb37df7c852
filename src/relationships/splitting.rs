// Contract splitting: several awards just under the public-bidding threshold,
// same agency, same contractor, close in time, similar titles.

use super::SplitCluster;
use crate::canonicalize::canonicalize;
use crate::config::DerivationConfig;
use crate::graph::{Contract, ResolvedGraph};
use crate::similarity::similarity;
use std::collections::BTreeMap;

pub fn find_split_clusters(graph: &ResolvedGraph, config: &DerivationConfig) -> Vec<SplitCluster> {
    // Contracts at or above the threshold went through public bidding anyway
    let mut groups: BTreeMap<(&str, &str), Vec<&Contract>> = BTreeMap::new();
    for contract in &graph.contracts {
        if contract.amount >= config.bidding_threshold {
            continue;
        }
        if let Some(awardee) = contract.awardee.as_deref() {
            groups
                .entry((contract.agency.as_str(), awardee))
                .or_default()
                .push(contract);
        }
    }

    let mut clusters = Vec::new();
    for ((agency, contractor), contracts) in groups {
        for members in window_clusters(&contracts, config) {
            let total: f64 = members.iter().map(|c| c.amount).sum();
            if members.len() < 2 || total < config.bidding_threshold {
                continue;
            }

            let (Some(first), Some(last)) = (members.first(), members.last()) else {
                continue;
            };
            clusters.push(SplitCluster {
                agency: agency.to_string(),
                contractor: contractor.to_string(),
                contract_refs: members.iter().map(|c| c.reference.clone()).collect(),
                amounts: members.iter().map(|c| c.amount).collect(),
                total,
                threshold: config.bidding_threshold,
                first_award: first.award_date,
                last_award: last.award_date,
            });
        }
    }

    clusters
}

/// Greedy clustering over time-ordered contracts: each unclaimed contract
/// opens a cluster and claims every later unclaimed contract awarded within
/// the window of it whose title is compatible.
fn window_clusters<'a>(contracts: &[&'a Contract], config: &DerivationConfig) -> Vec<Vec<&'a Contract>> {
    let titles: Vec<String> = contracts.iter().map(|c| canonicalize(&c.title)).collect();
    let mut claimed = vec![false; contracts.len()];
    let mut clusters = Vec::new();

    for start in 0..contracts.len() {
        if claimed[start] {
            continue;
        }
        claimed[start] = true;
        let opened = contracts[start].award_date;
        let mut members = vec![contracts[start]];

        for next in start + 1..contracts.len() {
            if claimed[next] {
                continue;
            }
            let gap = (contracts[next].award_date - opened).num_days();
            if gap > config.split_window_days {
                break;
            }
            if titles_compatible(&titles[start], &titles[next], config.split_title_similarity) {
                claimed[next] = true;
                members.push(contracts[next]);
            }
        }

        clusters.push(members);
    }

    clusters
}

/// An untitled contract never blocks a cluster
fn titles_compatible(a: &str, b: &str, threshold: f64) -> bool {
    a.is_empty() || b.is_empty() || similarity(a, b) >= threshold
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::records::{EntityKind, InputBatch};

    fn records() -> Vec<crate::records::RawRecord> {
        vec![
            record("a1", EntityKind::Agency, "DPWH Region VII"),
            record("c1", EntityKind::Contractor, "Mega Builders"),
        ]
    }

    #[test]
    fn test_three_contracts_under_threshold_form_split() {
        let batch = InputBatch {
            contracts: vec![
                contract("C-1", "a1", Some("c1"), 4_950_000.0, date(2025, 3, 3)),
                contract("C-2", "a1", Some("c1"), 4_890_000.0, date(2025, 3, 4)),
                contract("C-3", "a1", Some("c1"), 4_920_000.0, date(2025, 3, 5)),
            ],
            ..Default::default()
        };
        let graph = graph_from(records(), batch);

        let clusters = find_split_clusters(&graph, &DerivationConfig::default());

        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].contract_refs, vec!["C-1", "C-2", "C-3"]);
        assert!((clusters[0].total - 14_760_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_window_is_measured_from_cluster_start() {
        let batch = InputBatch {
            contracts: vec![
                contract("C-1", "a1", Some("c1"), 3_000_000.0, date(2025, 3, 1)),
                contract("C-2", "a1", Some("c1"), 3_000_000.0, date(2025, 3, 6)),
                // 10 days after C-1: outside its window, starts its own cluster
                contract("C-3", "a1", Some("c1"), 3_000_000.0, date(2025, 3, 11)),
            ],
            ..Default::default()
        };
        let graph = graph_from(records(), batch);

        let clusters = find_split_clusters(&graph, &DerivationConfig::default());

        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].contract_refs, vec!["C-1", "C-2"]);
    }

    #[test]
    fn test_dissimilar_titles_do_not_cluster() {
        let mut c1 = contract("C-1", "a1", Some("c1"), 3_000_000.0, date(2025, 3, 1));
        c1.title = "Road concreting".to_string();
        let mut c2 = contract("C-2", "a1", Some("c1"), 3_000_000.0, date(2025, 3, 2));
        c2.title = "Laptops".to_string();
        let graph = graph_from(
            records(),
            InputBatch {
                contracts: vec![c1, c2],
                ..Default::default()
            },
        );

        assert!(find_split_clusters(&graph, &DerivationConfig::default()).is_empty());
    }

    #[test]
    fn test_sum_below_threshold_is_not_split() {
        let batch = InputBatch {
            contracts: vec![
                contract("C-1", "a1", Some("c1"), 1_000_000.0, date(2025, 3, 1)),
                contract("C-2", "a1", Some("c1"), 1_000_000.0, date(2025, 3, 2)),
            ],
            ..Default::default()
        };
        let graph = graph_from(records(), batch);

        assert!(find_split_clusters(&graph, &DerivationConfig::default()).is_empty());
    }
}
