// Market concentration per agency (Herfindahl-Hirschman Index).
//
// HHI is reported on the 0..1 scale: Σ share² where share is a contractor's
// fraction of the agency's awarded value. One contractor holding everything
// scores exactly 1.0.

use crate::config::DetectorConfig;
use crate::graph::{Contract, ResolvedGraph};
use crate::records::EntityKind;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractorShare {
    pub contractor: String,
    pub contractor_name: String,
    pub amount: f64,
    pub contracts: usize,
    /// Fraction of the agency total, 0..1
    pub share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcentrationReport {
    pub agency: String,
    pub agency_name: String,
    pub total_value: f64,
    pub contract_count: usize,
    /// None when the agency awarded nothing inside the window
    pub hhi: Option<f64>,
    /// Largest share first
    pub shares: Vec<ContractorShare>,
}

impl ConcentrationReport {
    pub fn top_contractor(&self) -> Option<&ContractorShare> {
        self.shares.first()
    }

    pub fn contractor_count(&self) -> usize {
        self.shares.len()
    }
}

/// A contractor winning from more than one agency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractorReach {
    pub contractor: String,
    pub contractor_name: String,
    pub agency_count: usize,
    pub total_value: f64,
    pub agencies: Vec<String>,
}

/// Σ share² over contractor amounts. None when nothing was awarded.
pub fn hhi(amounts: &[f64]) -> Option<f64> {
    let total: f64 = amounts.iter().sum();
    if amounts.is_empty() || total <= 0.0 {
        return None;
    }
    let index = amounts.iter().map(|a| (a / total).powi(2)).sum::<f64>();
    Some(index.min(1.0))
}

fn in_window(contract: &Contract, start: Option<NaiveDate>, end: Option<NaiveDate>) -> bool {
    start.map_or(true, |s| contract.award_date >= s) && end.map_or(true, |e| contract.award_date <= e)
}

/// One report per agency entity, sorted by HHI (highest first), agencies
/// with no awards last
pub fn agency_concentration(graph: &ResolvedGraph, config: &DetectorConfig) -> Vec<ConcentrationReport> {
    // agency → contractor → (amount, contracts)
    let mut awarded: BTreeMap<&str, BTreeMap<&str, (f64, usize)>> = BTreeMap::new();
    for contract in &graph.contracts {
        if !in_window(contract, config.window_start, config.window_end) {
            continue;
        }
        let Some(awardee) = contract.awardee.as_deref() else {
            continue;
        };
        let slot = awarded
            .entry(contract.agency.as_str())
            .or_default()
            .entry(awardee)
            .or_insert((0.0, 0));
        slot.0 += contract.amount;
        slot.1 += 1;
    }

    let mut reports: Vec<ConcentrationReport> = graph
        .entities
        .by_kind(EntityKind::Agency)
        .map(|agency| {
            let by_contractor = awarded.remove(agency.id.as_str()).unwrap_or_default();
            build_report(graph, &agency.id, by_contractor)
        })
        .collect();

    reports.sort_by(|a, b| {
        let (ha, hb) = (a.hhi.unwrap_or(-1.0), b.hhi.unwrap_or(-1.0));
        hb.total_cmp(&ha).then_with(|| a.agency.cmp(&b.agency))
    });

    debug!(agencies = reports.len(), "agency concentration computed");
    reports
}

fn build_report(
    graph: &ResolvedGraph,
    agency: &str,
    by_contractor: BTreeMap<&str, (f64, usize)>,
) -> ConcentrationReport {
    let total_value: f64 = by_contractor.values().map(|(amount, _)| amount).sum();
    let contract_count = by_contractor.values().map(|(_, n)| n).sum();
    let amounts: Vec<f64> = by_contractor.values().map(|(amount, _)| *amount).collect();

    let mut shares: Vec<ContractorShare> = by_contractor
        .into_iter()
        .map(|(contractor, (amount, contracts))| ContractorShare {
            contractor: contractor.to_string(),
            contractor_name: graph.name_of(contractor).to_string(),
            amount,
            contracts,
            share: if total_value > 0.0 { amount / total_value } else { 0.0 },
        })
        .collect();
    shares.sort_by(|a, b| b.share.total_cmp(&a.share).then_with(|| a.contractor.cmp(&b.contractor)));

    ConcentrationReport {
        agency: agency.to_string(),
        agency_name: graph.name_of(agency).to_string(),
        total_value,
        contract_count,
        hhi: hhi(&amounts),
        shares,
    }
}

/// Contractors winning from two or more agencies, widest reach first
pub fn contractor_reach(graph: &ResolvedGraph) -> Vec<ContractorReach> {
    let mut reach: BTreeMap<&str, (BTreeSet<&str>, f64)> = BTreeMap::new();
    for contract in &graph.contracts {
        if let Some(awardee) = contract.awardee.as_deref() {
            let entry = reach.entry(awardee).or_default();
            entry.0.insert(contract.agency.as_str());
            entry.1 += contract.amount;
        }
    }

    let mut out: Vec<ContractorReach> = reach
        .into_iter()
        .filter(|(_, (agencies, _))| agencies.len() >= 2)
        .map(|(contractor, (agencies, total_value))| ContractorReach {
            contractor: contractor.to_string(),
            contractor_name: graph.name_of(contractor).to_string(),
            agency_count: agencies.len(),
            total_value,
            agencies: agencies.into_iter().map(str::to_string).collect(),
        })
        .collect();

    out.sort_by(|a, b| {
        b.agency_count
            .cmp(&a.agency_count)
            .then_with(|| b.total_value.total_cmp(&a.total_value))
            .then_with(|| a.contractor.cmp(&b.contractor))
    });
    out
}
