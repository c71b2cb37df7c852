// 🕸️ Resolved Graph - Read-only snapshot for derivation and detection
//
// Facts from the batch are re-keyed from record references to canonical
// entity ids. Derivation then attaches its edges and split clusters; after
// that the snapshot is shared (immutably) by every detector.

use crate::canonicalize::{canonicalize, canonicalize_person};
use crate::entities::{CanonicalEntity, EntityRegistry};
use crate::records::{EntityKind, EntityRef, InputBatch, OwnershipRole};
use crate::relationships::{DerivedEdge, Derivation, EdgeType, SplitCluster};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::warn;

// ============================================================================
// RESOLVED FACTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub reference: String,
    pub agency: String,
    pub awardee: Option<String>,
    pub title: String,
    pub amount: f64,
    pub award_date: NaiveDate,
    pub reported_bid_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    pub contract_ref: String,
    pub bidder: String,
    pub amount: f64,
    pub won: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subcontract {
    pub contract_ref: Option<String>,
    pub contractor: String,
    pub subcontractor: String,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Donation {
    pub donor: String,
    pub recipient: String,
    pub amount: f64,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditFinding {
    pub agency: String,
    pub finding_type: String,
    pub year: i32,
    pub description: String,
    pub amount: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ownership {
    pub contractor: String,
    pub person_name: String,
    /// canonicalize_person(person_name)
    pub person_key: String,
    pub role: OwnershipRole,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blacklisting {
    pub contractor: String,
    pub offense: String,
    pub sanction_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub politician: String,
    pub family: Option<String>,
    pub position: String,
    pub municipality: Option<String>,
    pub term_start: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    pub contractor: String,
    pub registered_capital: Option<f64>,
    pub registered_on: Option<NaiveDate>,
}

// ============================================================================
// SNAPSHOT
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct ResolvedGraph {
    pub entities: EntityRegistry,
    /// Sorted by (award_date, reference)
    pub contracts: Vec<Contract>,
    pub bids: Vec<Bid>,
    pub subcontracts: Vec<Subcontract>,
    pub donations: Vec<Donation>,
    pub audits: Vec<AuditFinding>,
    pub ownerships: Vec<Ownership>,
    /// By contractor id
    pub blacklist: BTreeMap<String, Blacklisting>,
    pub positions: Vec<Position>,
    /// By contractor id (last registration fact wins)
    pub registrations: BTreeMap<String, Registration>,

    /// Filled by `attach`
    pub edges: Vec<DerivedEdge>,
    pub split_clusters: Vec<SplitCluster>,

    contract_index: HashMap<String, usize>,
    bids_by_contract: HashMap<String, Vec<usize>>,
}

impl ResolvedGraph {
    /// Re-key every fact onto canonical ids. Facts whose references did not
    /// resolve are dropped with a warning.
    pub fn materialize(entities: EntityRegistry, batch: &InputBatch) -> Self {
        let mut dangling = 0usize;
        let mut resolve = |r: &EntityRef| -> Option<String> {
            let id = entities.resolve(r).map(str::to_string);
            if id.is_none() {
                dangling += 1;
            }
            id
        };

        let mut contracts: Vec<Contract> = batch
            .contracts
            .iter()
            .filter_map(|c| {
                let agency = resolve(&c.agency)?;
                let awardee = match &c.awardee {
                    Some(a) => Some(resolve(a)?),
                    None => None,
                };
                Some(Contract {
                    reference: c.reference.clone(),
                    agency,
                    awardee,
                    title: c.title.clone(),
                    amount: c.amount,
                    award_date: c.award_date,
                    reported_bid_count: c.bid_count,
                })
            })
            .collect();
        contracts.sort_by(|a, b| {
            a.award_date
                .cmp(&b.award_date)
                .then_with(|| a.reference.cmp(&b.reference))
        });

        let mut bids: Vec<Bid> = batch
            .bids
            .iter()
            .filter_map(|b| {
                Some(Bid {
                    contract_ref: b.contract_ref.clone(),
                    bidder: resolve(&b.bidder)?,
                    amount: b.amount,
                    won: b.won,
                })
            })
            .collect();
        bids.sort_by(|a, b| {
            a.contract_ref
                .cmp(&b.contract_ref)
                .then_with(|| a.bidder.cmp(&b.bidder))
                .then_with(|| a.amount.total_cmp(&b.amount))
        });

        let subcontracts = batch
            .subcontracts
            .iter()
            .filter_map(|s| {
                Some(Subcontract {
                    contract_ref: s.contract_ref.clone(),
                    contractor: resolve(&s.contractor)?,
                    subcontractor: resolve(&s.subcontractor)?,
                    amount: s.amount,
                })
            })
            .collect();

        let donations = batch
            .donations
            .iter()
            .filter_map(|d| {
                Some(Donation {
                    donor: resolve(&d.donor)?,
                    recipient: resolve(&d.recipient)?,
                    amount: d.amount,
                    date: d.date,
                })
            })
            .collect();

        let audits = batch
            .audits
            .iter()
            .filter_map(|a| {
                Some(AuditFinding {
                    agency: resolve(&a.agency)?,
                    finding_type: a.finding_type.clone(),
                    year: a.year,
                    description: a.description.clone(),
                    amount: a.amount,
                })
            })
            .collect();

        let ownerships = batch
            .ownerships
            .iter()
            .filter_map(|o| {
                Some(Ownership {
                    contractor: resolve(&o.contractor)?,
                    person_name: o.person_name.clone(),
                    person_key: canonicalize_person(&o.person_name),
                    role: o.role,
                })
            })
            .collect();

        let mut blacklist = BTreeMap::new();
        for b in &batch.blacklist {
            if let Some(contractor) = resolve(&b.contractor) {
                blacklist.insert(
                    contractor.clone(),
                    Blacklisting {
                        contractor,
                        offense: b.offense.clone(),
                        sanction_date: b.sanction_date,
                    },
                );
            }
        }

        let positions = batch
            .positions
            .iter()
            .filter_map(|p| {
                let municipality = match &p.municipality {
                    Some(m) => Some(resolve(m)?),
                    None => None,
                };
                Some(Position {
                    politician: resolve(&p.politician)?,
                    family: p.family.clone(),
                    position: p.position.clone(),
                    municipality,
                    term_start: p.term_start,
                })
            })
            .collect();

        let mut registrations = BTreeMap::new();
        for r in &batch.registrations {
            if let Some(contractor) = resolve(&r.contractor) {
                registrations.insert(
                    contractor.clone(),
                    Registration {
                        contractor,
                        registered_capital: r.registered_capital,
                        registered_on: r.registered_on,
                    },
                );
            }
        }

        if dangling > 0 {
            warn!(dangling, "dropped facts whose references did not resolve");
        }

        let contract_index = contracts
            .iter()
            .enumerate()
            .map(|(i, c)| (c.reference.clone(), i))
            .collect();
        let mut bids_by_contract: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, b) in bids.iter().enumerate() {
            bids_by_contract.entry(b.contract_ref.clone()).or_default().push(i);
        }

        ResolvedGraph {
            entities,
            contracts,
            bids,
            subcontracts,
            donations,
            audits,
            ownerships,
            blacklist,
            positions,
            registrations,
            edges: Vec::new(),
            split_clusters: Vec::new(),
            contract_index,
            bids_by_contract,
        }
    }

    /// Attach the output of relationship derivation
    pub fn attach(&mut self, derivation: Derivation) {
        self.edges = derivation.edges;
        self.split_clusters = derivation.split_clusters;
    }

    // ========================================================================
    // LOOKUPS
    // ========================================================================

    pub fn entity(&self, id: &str) -> Option<&CanonicalEntity> {
        self.entities.find_by_id(id)
    }

    /// Display name, or the id itself for unknown entities
    pub fn name_of<'a>(&'a self, id: &'a str) -> &'a str {
        self.entity(id).map(|e| e.display_name.as_str()).unwrap_or(id)
    }

    pub fn kind_of(&self, id: &str) -> Option<EntityKind> {
        self.entity(id).map(|e| e.kind)
    }

    pub fn contract(&self, reference: &str) -> Option<&Contract> {
        self.contract_index.get(reference).map(|&i| &self.contracts[i])
    }

    pub fn bids_on<'a>(&'a self, reference: &str) -> impl Iterator<Item = &'a Bid> + 'a {
        self.bids_by_contract
            .get(reference)
            .into_iter()
            .flatten()
            .map(move |&i| &self.bids[i])
    }

    /// Reported bidder count, else distinct bidders seen. None when unknown.
    pub fn bidder_count(&self, contract: &Contract) -> Option<usize> {
        if let Some(n) = contract.reported_bid_count {
            return Some(n as usize);
        }
        let bidders: BTreeSet<&str> = self
            .bids_on(&contract.reference)
            .map(|b| b.bidder.as_str())
            .collect();
        if bidders.is_empty() {
            None
        } else {
            Some(bidders.len())
        }
    }

    /// Winner of a contract: the awardee, else the bid marked as won
    pub fn winner_of<'a>(&'a self, contract: &'a Contract) -> Option<&'a str> {
        contract.awardee.as_deref().or_else(|| {
            self.bids_on(&contract.reference)
                .find(|b| b.won)
                .map(|b| b.bidder.as_str())
        })
    }

    pub fn is_blacklisted(&self, id: &str) -> bool {
        self.blacklist.contains_key(id)
    }

    pub fn edges_of(&self, edge_type: EdgeType) -> impl Iterator<Item = &DerivedEdge> {
        self.edges.iter().filter(move |e| e.edge_type == edge_type)
    }

    /// Canonical jurisdictions an entity belongs to. Politicians also belong
    /// to the jurisdictions of the municipalities they hold office in.
    pub fn jurisdictions_of(&self, id: &str) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        if let Some(j) = self.entity(id).and_then(|e| e.jurisdiction.as_deref()) {
            insert_canonical(&mut out, j);
        }

        for position in self.positions.iter().filter(|p| p.politician == id) {
            if let Some(muni) = position.municipality.as_deref().and_then(|m| self.entity(m)) {
                insert_canonical(&mut out, &muni.display_name);
                if let Some(j) = muni.jurisdiction.as_deref() {
                    insert_canonical(&mut out, j);
                }
            }
        }

        out
    }
}

fn insert_canonical(set: &mut BTreeSet<String>, raw: &str) {
    let c = canonicalize(raw);
    if !c.is_empty() {
        set.insert(c);
    }
}

// ============================================================================
// TESTS
// ============================================================================
