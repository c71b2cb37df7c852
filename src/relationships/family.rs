// Political links.
//
// FAMILY_OF / ASSOCIATED_WITH: a contractor's owner or director shares (or
// nearly shares) a surname with a politician in the same jurisdiction. This is
// a heuristic and the evidence says so.
//
// ALLIED_WITH: politicians listed under the same political family.

use super::{DerivedEdge, EdgeEvidence, EdgeType};
use crate::canonicalize::{canonicalize, surname_of};
use crate::config::DerivationConfig;
use crate::graph::ResolvedGraph;
use crate::records::EntityKind;
use crate::similarity::similarity;
use std::collections::{BTreeMap, BTreeSet};

struct SurnameHit {
    owners: BTreeSet<String>,
    owner_surname: String,
    politician_surname: String,
    score: f64,
    jurisdictions: BTreeSet<String>,
}

pub fn derive_surname_links(graph: &ResolvedGraph, config: &DerivationConfig) -> Vec<DerivedEdge> {
    let politicians: Vec<(&str, String, BTreeSet<String>)> = graph
        .entities
        .by_kind(EntityKind::Politician)
        .map(|p| (p.id.as_str(), surname_of(&p.display_name), graph.jurisdictions_of(&p.id)))
        .filter(|(_, surname, jurisdictions)| !surname.is_empty() && !jurisdictions.is_empty())
        .collect();
    if politicians.is_empty() {
        return Vec::new();
    }

    let mut contractor_jurisdictions: BTreeMap<&str, BTreeSet<String>> = BTreeMap::new();
    let mut hits: BTreeMap<(&str, &str), SurnameHit> = BTreeMap::new();

    for ownership in &graph.ownerships {
        let owner_surname = surname_of(&ownership.person_name);
        if owner_surname.is_empty() {
            continue;
        }
        let jurisdictions = contractor_jurisdictions
            .entry(ownership.contractor.as_str())
            .or_insert_with(|| graph.jurisdictions_of(&ownership.contractor));

        for (politician, politician_surname, politician_jurisdictions) in &politicians {
            let common: BTreeSet<String> = jurisdictions
                .intersection(politician_jurisdictions)
                .cloned()
                .collect();
            if common.is_empty() {
                continue;
            }

            let score = similarity(&owner_surname, politician_surname);
            if score < config.association_threshold {
                continue;
            }

            let hit = hits
                .entry((ownership.contractor.as_str(), *politician))
                .or_insert_with(|| SurnameHit {
                    owners: BTreeSet::new(),
                    owner_surname: owner_surname.clone(),
                    politician_surname: politician_surname.clone(),
                    score,
                    jurisdictions: BTreeSet::new(),
                });
            hit.owners.insert(ownership.person_key.clone());
            hit.jurisdictions.extend(common);
            if score > hit.score {
                hit.score = score;
                hit.owner_surname = owner_surname.clone();
            }
        }
    }

    hits.into_iter()
        .map(|((contractor, politician), hit)| {
            let edge_type = if hit.score >= config.family_threshold {
                EdgeType::FamilyOf
            } else {
                EdgeType::AssociatedWith
            };
            DerivedEdge::new(
                edge_type,
                contractor,
                politician,
                EdgeEvidence::SurnameMatch {
                    owners: hit.owners.into_iter().collect(),
                    owner_surname: hit.owner_surname,
                    politician_surname: hit.politician_surname,
                    similarity: hit.score,
                    jurisdictions: hit.jurisdictions.into_iter().collect(),
                    heuristic: true,
                },
            )
        })
        .collect()
}

pub fn derive_alliances(graph: &ResolvedGraph) -> Vec<DerivedEdge> {
    let mut families: BTreeMap<String, BTreeSet<&str>> = BTreeMap::new();
    for position in &graph.positions {
        if let Some(family) = position.family.as_deref().map(canonicalize).filter(|f| !f.is_empty()) {
            families
                .entry(family)
                .or_default()
                .insert(position.politician.as_str());
        }
    }

    let mut edges = Vec::new();
    for (family, members) in families {
        let members: Vec<&str> = members.into_iter().collect();
        for (i, &a) in members.iter().enumerate() {
            for &b in &members[i + 1..] {
                edges.push(DerivedEdge::new(
                    EdgeType::AlliedWith,
                    a,
                    b,
                    EdgeEvidence::PoliticalFamily {
                        family: family.clone(),
                    },
                ));
            }
        }
    }
    edges
}
