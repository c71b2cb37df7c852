// 📥 Input Records - What the collectors hand us
//
// RawRecord = one as-collected mention of an entity (immutable).
// Facts     = transactional records (contracts, bids, subcontracts, donations,
//             audits, ownership, blacklist, positions, registrations) that
//             reference entities either by raw record id (not yet resolved) or
//             by an already-known canonical entity id.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

// ============================================================================
// ENTITY KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    Contractor,
    Agency,
    Politician,
    Municipality,
    Person,
}

impl EntityKind {
    /// Node label in the graph store vocabulary
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Contractor => "Contractor",
            EntityKind::Agency => "Agency",
            EntityKind::Politician => "Politician",
            EntityKind::Municipality => "Municipality",
            EntityKind::Person => "Person",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Contractor" => Some(EntityKind::Contractor),
            "Agency" => Some(EntityKind::Agency),
            "Politician" => Some(EntityKind::Politician),
            "Municipality" => Some(EntityKind::Municipality),
            "Person" => Some(EntityKind::Person),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// RAW RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Collector-assigned id, unique within the batch
    pub record_id: String,

    pub kind: EntityKind,

    /// As written in the source (empty = missing)
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub address: Option<String>,

    #[serde(default)]
    pub registration_number: Option<String>,

    /// Province / city the entity belongs to (used for surname matching and donations)
    #[serde(default)]
    pub jurisdiction: Option<String>,

    /// PhilGEPS, COA, Open Congress, PSA, ...
    #[serde(default)]
    pub source_system: String,

    pub retrieved_at: DateTime<Utc>,
}

impl RawRecord {
    pub fn new(record_id: &str, kind: EntityKind, name: &str, source_system: &str) -> Self {
        RawRecord {
            record_id: record_id.to_string(),
            kind,
            name: name.to_string(),
            address: None,
            registration_number: None,
            jurisdiction: None,
            source_system: source_system.to_string(),
            retrieved_at: Utc::now(),
        }
    }

    pub fn with_address(mut self, address: &str) -> Self {
        self.address = Some(address.to_string());
        self
    }

    pub fn with_registration(mut self, registration_number: &str) -> Self {
        self.registration_number = Some(registration_number.to_string());
        self
    }

    pub fn with_jurisdiction(mut self, jurisdiction: &str) -> Self {
        self.jurisdiction = Some(jurisdiction.to_string());
        self
    }
}

// ============================================================================
// ENTITY REFERENCES
// ============================================================================

/// How a fact points at an entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "ref", content = "id", rename_all = "snake_case")]
pub enum EntityRef {
    /// A RawRecord id from this (or an earlier) batch
    Record(String),
    /// A canonical entity id from a previous run
    Entity(String),
}

impl EntityRef {
    pub fn record(id: &str) -> Self {
        EntityRef::Record(id.to_string())
    }

    pub fn entity(id: &str) -> Self {
        EntityRef::Entity(id.to_string())
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::Record(id) => write!(f, "record:{}", id),
            EntityRef::Entity(id) => write!(f, "entity:{}", id),
        }
    }
}

// ============================================================================
// TRANSACTIONAL FACTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractFact {
    /// PhilGEPS reference number
    pub reference: String,
    pub agency: EntityRef,
    #[serde(default)]
    pub awardee: Option<EntityRef>,
    #[serde(default)]
    pub title: String,
    pub amount: f64,
    pub award_date: NaiveDate,
    /// Reported bidder count; falls back to counting BidFacts when absent
    #[serde(default)]
    pub bid_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BidFact {
    pub contract_ref: String,
    pub bidder: EntityRef,
    pub amount: f64,
    #[serde(default)]
    pub won: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubcontractFact {
    #[serde(default)]
    pub contract_ref: Option<String>,
    pub contractor: EntityRef,
    pub subcontractor: EntityRef,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DonationFact {
    pub donor: EntityRef,
    pub recipient: EntityRef,
    pub amount: f64,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditFact {
    pub agency: EntityRef,
    pub finding_type: String,
    pub year: i32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub amount: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnershipRole {
    Owner,
    Director,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnershipFact {
    pub contractor: EntityRef,
    pub person_name: String,
    pub role: OwnershipRole,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlacklistFact {
    pub contractor: EntityRef,
    #[serde(default)]
    pub offense: String,
    #[serde(default)]
    pub sanction_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionFact {
    pub politician: EntityRef,
    /// Political family name as published by the dynasty dataset
    #[serde(default)]
    pub family: Option<String>,
    pub position: String,
    #[serde(default)]
    pub municipality: Option<EntityRef>,
    #[serde(default)]
    pub term_start: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationFact {
    pub contractor: EntityRef,
    #[serde(default)]
    pub registered_capital: Option<f64>,
    #[serde(default)]
    pub registered_on: Option<NaiveDate>,
}

// ============================================================================
// INPUT BATCH
// ============================================================================

/// Everything one pipeline run consumes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputBatch {
    pub records: Vec<RawRecord>,
    pub contracts: Vec<ContractFact>,
    pub bids: Vec<BidFact>,
    pub subcontracts: Vec<SubcontractFact>,
    pub donations: Vec<DonationFact>,
    pub audits: Vec<AuditFact>,
    pub ownerships: Vec<OwnershipFact>,
    pub blacklist: Vec<BlacklistFact>,
    pub positions: Vec<PositionFact>,
    pub registrations: Vec<RegistrationFact>,
}

impl InputBatch {
    pub fn fact_count(&self) -> usize {
        self.contracts.len()
            + self.bids.len()
            + self.subcontracts.len()
            + self.donations.len()
            + self.audits.len()
            + self.ownerships.len()
            + self.blacklist.len()
            + self.positions.len()
            + self.registrations.len()
    }
}

/// Load a full batch (records + facts) from a JSON file
pub fn load_batch(path: &Path) -> Result<InputBatch> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read batch file: {:?}", path))?;

    serde_json::from_str(&content).context("Failed to parse batch JSON")
}

/// Load RawRecords from a collector CSV export
///
/// Columns: record_id, kind, name, address, registration_number,
/// jurisdiction, source_system, retrieved_at (RFC 3339)
pub fn load_records_csv(csv_path: &Path) -> Result<Vec<RawRecord>> {
    let mut rdr = csv::Reader::from_path(csv_path).context("Failed to open CSV file")?;

    let mut records = Vec::new();
    for result in rdr.deserialize() {
        let record: RawRecord = result.context("Failed to deserialize raw record")?;
        records.push(record);
    }

    Ok(records)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_records_csv() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "record_id,kind,name,address,registration_number,jurisdiction,source_system,retrieved_at"
        )
        .unwrap();
        writeln!(
            file,
            "r1,Contractor,JC Reyes Construction Inc.,12 Rizal St,PCAB-1234,Cebu,philgeps,2025-01-05T10:30:00Z"
        )
        .unwrap();
        writeln!(file, "r2,Agency,DPWH Region VII,,,,philgeps,2025-01-05T10:30:00Z").unwrap();

        let records = load_records_csv(file.path()).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind, EntityKind::Contractor);
        assert_eq!(records[0].registration_number.as_deref(), Some("PCAB-1234"));
        assert_eq!(records[1].kind, EntityKind::Agency);
        assert_eq!(records[1].address, None);
    }

    #[test]
    fn test_batch_json_defaults_missing_sections() {
        let json = r#"{
            "records": [
                { "record_id": "r1", "kind": "Contractor", "name": "Mega Builders",
                  "source_system": "philgeps", "retrieved_at": "2025-01-05T10:30:00Z" }
            ],
            "contracts": [
                { "reference": "C-1", "agency": { "ref": "record", "id": "a1" },
                  "awardee": { "ref": "record", "id": "r1" },
                  "amount": 4950000.0, "award_date": "2025-03-03" }
            ]
        }"#;

        let batch: InputBatch = serde_json::from_str(json).unwrap();

        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.contracts[0].awardee, Some(EntityRef::record("r1")));
        assert!(batch.bids.is_empty());
        assert_eq!(batch.fact_count(), 1);
    }
}
