// Dynasty score per political family.
//
// Three counts over the family's members, each saturated at a configured
// level and weighted:
//   positions         distinct (office, municipality) seats held
//   municipalities    distinct municipalities governed
//   ownership links   contractors tied to a member by FAMILY_OF
// score = Σ weight · min(count / saturation, 1) / Σ weight, in [0, 1].

use crate::canonicalize::canonicalize;
use crate::config::DynastyWeights;
use crate::graph::ResolvedGraph;
use crate::relationships::EdgeType;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynastyReport {
    /// Canonical family name
    pub family: String,
    pub members: Vec<String>,
    pub positions_held: usize,
    pub municipalities_governed: usize,
    pub contractor_links: usize,
    pub linked_contractors: Vec<String>,
    pub score: f64,
}

#[derive(Default)]
struct FamilyCounts<'a> {
    members: BTreeSet<&'a str>,
    seats: BTreeSet<(String, Option<&'a str>)>,
    municipalities: BTreeSet<&'a str>,
}

fn saturate(count: usize, saturation: usize) -> f64 {
    if saturation == 0 {
        return if count > 0 { 1.0 } else { 0.0 };
    }
    (count as f64 / saturation as f64).min(1.0)
}

pub fn score(positions: usize, municipalities: usize, links: usize, weights: &DynastyWeights) -> f64 {
    let total = weights.positions + weights.municipalities + weights.contractor_ownership;
    if total <= 0.0 {
        return 0.0;
    }
    let weighted = weights.positions * saturate(positions, weights.positions_saturation)
        + weights.municipalities * saturate(municipalities, weights.municipalities_saturation)
        + weights.contractor_ownership * saturate(links, weights.ownership_saturation);
    (weighted / total).clamp(0.0, 1.0)
}

/// One report per family named on any position, highest score first
pub fn dynasty_scores(graph: &ResolvedGraph, weights: &DynastyWeights) -> Vec<DynastyReport> {
    let mut families: BTreeMap<String, FamilyCounts> = BTreeMap::new();
    for position in &graph.positions {
        let Some(family) = position.family.as_deref().map(canonicalize).filter(|f| !f.is_empty()) else {
            continue;
        };
        let counts = families.entry(family).or_default();
        counts.members.insert(position.politician.as_str());
        counts
            .seats
            .insert((canonicalize(&position.position), position.municipality.as_deref()));
        if let Some(m) = position.municipality.as_deref() {
            counts.municipalities.insert(m);
        }
    }

    let mut reports: Vec<DynastyReport> = families
        .into_iter()
        .map(|(family, counts)| {
            let linked: BTreeSet<&str> = graph
                .edges_of(EdgeType::FamilyOf)
                .filter(|e| counts.members.contains(e.target.as_str()))
                .map(|e| e.source.as_str())
                .collect();

            let positions_held = counts.seats.len();
            let municipalities_governed = counts.municipalities.len();
            DynastyReport {
                score: score(positions_held, municipalities_governed, linked.len(), weights),
                family,
                members: counts.members.iter().map(|m| m.to_string()).collect(),
                positions_held,
                municipalities_governed,
                contractor_links: linked.len(),
                linked_contractors: linked.into_iter().map(str::to_string).collect(),
            }
        })
        .collect();

    reports.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.family.cmp(&b.family)));
    reports
}
