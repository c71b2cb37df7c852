// Bid-level detectors: single bidders and identical bid amounts.

use super::{peso, DetectionContext, Detector, Evidence, FlagSubject, FlagType, RedFlag, Severity};
use crate::error::DetectorError;
use std::collections::{BTreeMap, BTreeSet};

// ============================================================================
// SINGLE BIDDER
// ============================================================================

pub struct SingleBidderDetector;

#[derive(Default)]
struct Tally<'a> {
    known: usize,
    single: Vec<&'a crate::graph::Contract>,
}

impl Detector for SingleBidderDetector {
    fn name(&self) -> &'static str {
        "single_bidder"
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Result<Vec<RedFlag>, DetectorError> {
        let graph = ctx.graph;
        let config = ctx.config;

        // Only contracts with a known bidder count enter the rate
        let mut by_contractor: BTreeMap<&str, Tally> = BTreeMap::new();
        for contract in &graph.contracts {
            let (Some(winner), Some(bidders)) = (graph.winner_of(contract), graph.bidder_count(contract)) else {
                continue;
            };
            let tally = by_contractor.entry(winner).or_default();
            tally.known += 1;
            if bidders == 1 {
                tally.single.push(contract);
            }
        }

        let mut flags = Vec::new();
        for (contractor, tally) in by_contractor {
            if tally.single.is_empty() {
                continue;
            }
            let rate = tally.single.len() as f64 / tally.known as f64;
            let escalated = rate > config.single_bidder_escalation_rate;
            let severity = if escalated { Severity::High } else { Severity::Medium };
            let name = graph.name_of(contractor);

            for contract in &tally.single {
                flags.push(ctx.flag(
                    self.name(),
                    FlagType::SingleBidder,
                    severity,
                    FlagSubject::entity(contractor),
                    format!(
                        "Contract {} ({}) from {} was awarded to {} with a single bidder",
                        contract.reference,
                        peso(contract.amount),
                        graph.name_of(&contract.agency),
                        name
                    ),
                    Evidence::SingleBid {
                        contract_ref: contract.reference.clone(),
                        agency: contract.agency.clone(),
                        amount: contract.amount,
                        contractor_single_bid_rate: rate,
                    },
                )?);
            }

            if escalated && tally.single.len() >= config.single_bidder_aggregate_min {
                flags.push(ctx.flag(
                    self.name(),
                    FlagType::SingleBidder,
                    Severity::Critical,
                    FlagSubject::entity(contractor),
                    format!(
                        "{} won {} of {} contracts as the only bidder ({:.0}%)",
                        name,
                        tally.single.len(),
                        tally.known,
                        rate * 100.0
                    ),
                    Evidence::SingleBidPattern {
                        single_bid_contracts: tally.single.iter().map(|c| c.reference.clone()).collect(),
                        total_contracts: tally.known,
                        rate,
                    },
                )?);
            }
        }

        Ok(flags)
    }
}

// ============================================================================
// IDENTICAL BID AMOUNTS
// ============================================================================

pub struct IdenticalBidsDetector;

fn relative_difference(a: f64, b: f64) -> f64 {
    let scale = a.abs().max(b.abs());
    if scale == 0.0 {
        0.0
    } else {
        (a - b).abs() / scale
    }
}

impl Detector for IdenticalBidsDetector {
    fn name(&self) -> &'static str {
        "identical_bid_amounts"
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Result<Vec<RedFlag>, DetectorError> {
        let graph = ctx.graph;
        let mut flags = Vec::new();

        for contract in &graph.contracts {
            let bids: Vec<_> = graph.bids_on(&contract.reference).collect();
            let mut seen: BTreeSet<(&str, &str)> = BTreeSet::new();

            for (i, first) in bids.iter().enumerate() {
                for second in &bids[i + 1..] {
                    if first.bidder == second.bidder {
                        continue;
                    }
                    let diff = relative_difference(first.amount, second.amount);
                    if diff >= ctx.config.identical_bid_epsilon {
                        continue;
                    }

                    let (left, right) = if first.bidder <= second.bidder {
                        (first, second)
                    } else {
                        (second, first)
                    };
                    if !seen.insert((left.bidder.as_str(), right.bidder.as_str())) {
                        continue;
                    }

                    flags.push(ctx.flag(
                        self.name(),
                        FlagType::IdenticalBidAmounts,
                        Severity::Critical,
                        FlagSubject::pair(&left.bidder, &right.bidder),
                        format!(
                            "{} and {} bid {} and {} on contract {}",
                            graph.name_of(&left.bidder),
                            graph.name_of(&right.bidder),
                            peso(left.amount),
                            peso(right.amount),
                            contract.reference
                        ),
                        Evidence::IdenticalBids {
                            contract_ref: contract.reference.clone(),
                            first_bidder: left.bidder.clone(),
                            second_bidder: right.bidder.clone(),
                            first_amount: left.amount,
                            second_amount: right.amount,
                            relative_difference: diff,
                        },
                    )?);
                }
            }
        }

        Ok(flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectorConfig;
    use crate::records::{EntityKind, InputBatch};
    use crate::relationships::test_support::*;
    use chrono::Utc;

    fn monopoly_batch() -> InputBatch {
        let mut batch = InputBatch::default();
        for i in 0..4 {
            let reference = format!("C-{}", i);
            batch.contracts.push(contract(&reference, "a1", Some("c1"), 2_000_000.0, date(2024, 1 + i, 1)));
            batch.bids.push(bid(&reference, "c1", 2_000_000.0, true));
        }
        batch
    }

    fn records() -> Vec<crate::records::RawRecord> {
        vec![
            record("a1", EntityKind::Agency, "DPWH Region VII"),
            record("c1", EntityKind::Contractor, "Alpha Builders"),
            record("c2", EntityKind::Contractor, "Bravo Construction"),
        ]
    }

    #[test]
    fn test_single_bid_monopoly_escalates() {
        let graph = graph_from(records(), monopoly_batch());
        let config = DetectorConfig::default();
        let ctx = DetectionContext::new(&graph, &config, Utc::now());

        let flags = SingleBidderDetector.detect(&ctx).unwrap();

        let high = flags.iter().filter(|f| f.severity == Severity::High).count();
        let critical: Vec<&RedFlag> = flags.iter().filter(|f| f.severity == Severity::Critical).collect();
        assert_eq!(high, 4);
        assert_eq!(critical.len(), 1);
        assert_eq!(critical[0].subject, FlagSubject::entity(&id_of(&graph, "c1")));
    }

    #[test]
    fn test_occasional_single_bid_is_medium() {
        let mut batch = InputBatch::default();
        batch.contracts.push(contract("C-1", "a1", Some("c1"), 2_000_000.0, date(2024, 1, 1)));
        batch.bids.push(bid("C-1", "c1", 2_000_000.0, true));
        batch.contracts.push(contract("C-2", "a1", Some("c1"), 2_000_000.0, date(2024, 2, 1)));
        batch.bids.push(bid("C-2", "c1", 2_000_000.0, true));
        batch.bids.push(bid("C-2", "c2", 2_100_000.0, false));
        let graph = graph_from(records(), batch);
        let config = DetectorConfig::default();
        let ctx = DetectionContext::new(&graph, &config, Utc::now());

        let flags = SingleBidderDetector.detect(&ctx).unwrap();

        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].severity, Severity::Medium);
    }

    #[test]
    fn test_identical_bids_are_critical() {
        let mut batch = InputBatch::default();
        batch.contracts.push(contract("C-1", "a1", Some("c1"), 2_000_000.0, date(2024, 1, 1)));
        batch.bids.push(bid("C-1", "c1", 2_000_000.0, true));
        batch.bids.push(bid("C-1", "c2", 2_001_000.0, false));
        batch.contracts.push(contract("C-2", "a1", Some("c1"), 2_000_000.0, date(2024, 2, 1)));
        batch.bids.push(bid("C-2", "c1", 2_000_000.0, true));
        batch.bids.push(bid("C-2", "c2", 2_100_000.0, false));
        let graph = graph_from(records(), batch);
        let config = DetectorConfig::default();
        let ctx = DetectionContext::new(&graph, &config, Utc::now());

        let flags = IdenticalBidsDetector.detect(&ctx).unwrap();

        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].severity, Severity::Critical);
        match &flags[0].evidence {
            Evidence::IdenticalBids { contract_ref, .. } => assert_eq!(contract_ref, "C-1"),
            other => panic!("unexpected evidence {:?}", other),
        }
    }
}
