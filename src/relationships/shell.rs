// Shell / phoenix links between contractors:
//   SAME_ADDRESS_AS       shared canonical address
//   SHARES_DIRECTOR_WITH  shared owner or director
//   RE_REGISTERED_AS      newer contractor → blacklisted contractor, sharing both

use super::{DerivedEdge, EdgeEvidence, EdgeType};
use crate::graph::ResolvedGraph;
use crate::records::EntityKind;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

type Pair<'a> = (&'a str, &'a str);

pub fn derive_shell_links(graph: &ResolvedGraph) -> Vec<DerivedEdge> {
    let shared_addresses = shared_addresses(graph);
    let shared_directors = shared_directors(graph);

    let mut edges = Vec::new();
    for (&(a, b), address) in &shared_addresses {
        edges.push(DerivedEdge::new(
            EdgeType::SameAddressAs,
            a,
            b,
            EdgeEvidence::SharedAddress {
                address: address.clone(),
            },
        ));
    }
    for (&(a, b), directors) in &shared_directors {
        edges.push(DerivedEdge::new(
            EdgeType::SharesDirectorWith,
            a,
            b,
            EdgeEvidence::SharedDirectors {
                directors: directors.iter().cloned().collect(),
            },
        ));
    }

    for (&(a, b), address) in &shared_addresses {
        let Some(directors) = shared_directors.get(&(a, b)) else {
            continue;
        };
        for (source, target) in [(a, b), (b, a)] {
            let Some(blacklisting) = graph.blacklist.get(target) else {
                continue;
            };
            let source_date = registered_on(graph, source);
            let target_date = registered_on(graph, target);
            if !is_newer(source_date, target_date, graph.is_blacklisted(source)) {
                continue;
            }
            edges.push(DerivedEdge::new(
                EdgeType::ReRegisteredAs,
                source,
                target,
                EdgeEvidence::ReRegistration {
                    shared_directors: directors.iter().cloned().collect(),
                    address: address.clone(),
                    blacklist_offense: blacklisting.offense.clone(),
                    source_registered_on: source_date,
                    target_registered_on: target_date,
                },
            ));
        }
    }

    edges
}

/// Source must postdate the target. Unknown dates are allowed, unless both
/// sides are blacklisted and the direction would be a guess.
fn is_newer(source: Option<NaiveDate>, target: Option<NaiveDate>, source_blacklisted: bool) -> bool {
    match (source, target) {
        (Some(s), Some(t)) => s > t,
        _ => !source_blacklisted,
    }
}

fn registered_on(graph: &ResolvedGraph, id: &str) -> Option<NaiveDate> {
    graph.registrations.get(id).and_then(|r| r.registered_on)
}

fn shared_addresses(graph: &ResolvedGraph) -> BTreeMap<Pair<'_>, String> {
    let mut by_address: BTreeMap<String, BTreeSet<&str>> = BTreeMap::new();
    for entity in graph.entities.by_kind(EntityKind::Contractor) {
        if let Some(address) = entity.canonical_address() {
            by_address.entry(address).or_default().insert(entity.id.as_str());
        }
    }

    let mut pairs = BTreeMap::new();
    for (address, members) in by_address {
        for (a, b) in pairs_of(&members) {
            pairs.insert((a, b), address.clone());
        }
    }
    pairs
}

fn shared_directors(graph: &ResolvedGraph) -> BTreeMap<Pair<'_>, BTreeSet<String>> {
    let mut by_person: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for ownership in &graph.ownerships {
        by_person
            .entry(ownership.person_key.as_str())
            .or_default()
            .insert(ownership.contractor.as_str());
    }

    let mut pairs: BTreeMap<Pair<'_>, BTreeSet<String>> = BTreeMap::new();
    for (person, members) in by_person {
        for pair in pairs_of(&members) {
            pairs.entry(pair).or_default().insert(person.to_string());
        }
    }
    pairs
}

fn pairs_of<'a>(members: &BTreeSet<&'a str>) -> Vec<Pair<'a>> {
    let members: Vec<&str> = members.iter().copied().collect();
    let mut out = Vec::new();
    for (i, &a) in members.iter().enumerate() {
        for &b in &members[i + 1..] {
            out.push((a, b));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::records::{
        BlacklistFact, EntityRef, InputBatch, OwnershipFact, OwnershipRole, RawRecord,
        RegistrationFact,
    };

    fn director(contractor: &str, person: &str) -> OwnershipFact {
        OwnershipFact {
            contractor: EntityRef::record(contractor),
            person_name: person.to_string(),
            role: OwnershipRole::Director,
        }
    }

    fn registration(contractor: &str, on: NaiveDate) -> RegistrationFact {
        RegistrationFact {
            contractor: EntityRef::record(contractor),
            registered_capital: None,
            registered_on: Some(on),
        }
    }

    fn phoenix_records() -> Vec<RawRecord> {
        vec![
            record("a", EntityKind::Contractor, "Golden Arc Builders").with_address("12 Rizal St., Cebu City"),
            record("b", EntityKind::Contractor, "Silver Line Infra").with_address("12 RIZAL ST CEBU CITY"),
        ]
    }

    fn phoenix_batch() -> InputBatch {
        InputBatch {
            ownerships: vec![director("a", "Santos, Roberto"), director("b", "Roberto Santos")],
            blacklist: vec![BlacklistFact {
                contractor: EntityRef::record("a"),
                offense: "Abandonment of project".to_string(),
                sanction_date: Some(date(2022, 6, 1)),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_phoenix_edges() {
        let graph = graph_from(phoenix_records(), phoenix_batch());
        let (a, b) = (id_of(&graph, "a"), id_of(&graph, "b"));

        let edges = derive_shell_links(&graph);
        let types: BTreeSet<EdgeType> = edges.iter().map(|e| e.edge_type).collect();

        assert!(types.contains(&EdgeType::SameAddressAs));
        assert!(types.contains(&EdgeType::SharesDirectorWith));
        let rereg: Vec<&DerivedEdge> = edges
            .iter()
            .filter(|e| e.edge_type == EdgeType::ReRegisteredAs)
            .collect();
        assert_eq!(rereg.len(), 1);
        assert_eq!(rereg[0].source, b);
        assert_eq!(rereg[0].target, a);
    }

    #[test]
    fn test_older_company_is_not_a_re_registration() {
        let mut batch = phoenix_batch();
        batch.registrations = vec![
            registration("a", date(2020, 1, 1)),
            registration("b", date(2015, 1, 1)),
        ];
        let graph = graph_from(phoenix_records(), batch);

        let edges = derive_shell_links(&graph);

        assert!(edges.iter().all(|e| e.edge_type != EdgeType::ReRegisteredAs));
    }

    #[test]
    fn test_address_alone_is_not_a_re_registration() {
        let mut batch = phoenix_batch();
        batch.ownerships.pop();
        let graph = graph_from(phoenix_records(), batch);

        let edges = derive_shell_links(&graph);

        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].edge_type, EdgeType::SameAddressAs);
    }
}
