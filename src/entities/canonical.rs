// 🏗️ Canonical Entity - One real-world contractor/agency/politician
//
// "JC REYES CONSTRUCTION", "J.C. Reyes Construction Inc." and
// "JC Reyes Constructon" are three VALUES; the canonical entity is the IDENTITY.
//
// - id is a content hash of the sorted member record ids, so an unchanged
//   cluster keeps its id across runs
// - aliases are insertion-ordered and deduplicated
// - entities are never deleted, only absorbed into a surviving entity

use crate::canonicalize::canonicalize;
use crate::records::{EntityKind, RawRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};

/// Hex characters of the SHA-256 digest kept in the id
const ID_HEX_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEntity {
    // ========================================================================
    // IDENTITY
    // ========================================================================
    pub id: String,
    pub kind: EntityKind,

    // ========================================================================
    // VALUES
    // ========================================================================
    /// Most frequent raw spelling among the members
    pub display_name: String,

    /// Every raw name variant resolved into this entity (insertion-ordered, no duplicates)
    pub aliases: Vec<String>,

    /// RawRecord ids resolved into this entity
    pub sources: BTreeSet<String>,

    pub address: Option<String>,
    pub jurisdiction: Option<String>,
    pub registration_number: Option<String>,

    /// Ids of prior entities absorbed into this one
    #[serde(default)]
    pub merged_from: Vec<String>,

    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl CanonicalEntity {
    /// Build an entity from the records of one resolved cluster.
    ///
    /// Returns None for an empty cluster. Members are visited in
    /// (retrieved_at, record_id) order, so the result does not depend on the
    /// order records arrived in.
    pub fn from_cluster(members: &[&RawRecord]) -> Option<Self> {
        let mut ordered: Vec<&RawRecord> = members.to_vec();
        ordered.sort_by(|a, b| {
            a.retrieved_at
                .cmp(&b.retrieved_at)
                .then_with(|| a.record_id.cmp(&b.record_id))
        });

        let first = *ordered.first()?;
        let last = *ordered.last()?;

        let mut entity = CanonicalEntity {
            id: content_id(ordered.iter().map(|r| r.record_id.as_str())),
            kind: first.kind,
            display_name: pick_display_name(&ordered),
            aliases: Vec::new(),
            sources: BTreeSet::new(),
            address: None,
            jurisdiction: None,
            registration_number: None,
            merged_from: Vec::new(),
            first_seen: first.retrieved_at,
            last_seen: last.retrieved_at,
        };

        for record in &ordered {
            entity.add_record(record);
        }

        Some(entity)
    }

    /// Fold one more raw record into this entity
    pub fn add_record(&mut self, record: &RawRecord) {
        self.add_alias(&record.name);
        self.sources.insert(record.record_id.clone());
        fill(&mut self.address, &record.address);
        fill(&mut self.jurisdiction, &record.jurisdiction);
        fill(&mut self.registration_number, &record.registration_number);
        self.first_seen = self.first_seen.min(record.retrieved_at);
        self.last_seen = self.last_seen.max(record.retrieved_at);
    }

    /// Add an alias (no-op for blanks and exact repeats)
    pub fn add_alias(&mut self, alias: &str) {
        let alias = alias.trim();
        if !alias.is_empty() && !self.aliases.iter().any(|a| a == alias) {
            self.aliases.push(alias.to_string());
        }
    }

    /// Absorb another entity: aliases, sources and lineage move here, the
    /// other id is remembered in `merged_from`.
    pub fn absorb(&mut self, other: &CanonicalEntity) {
        for alias in &other.aliases {
            self.add_alias(alias);
        }
        self.sources.extend(other.sources.iter().cloned());

        for id in other.merged_from.iter().chain(std::iter::once(&other.id)) {
            if *id != self.id && !self.merged_from.contains(id) {
                self.merged_from.push(id.clone());
            }
        }

        fill(&mut self.address, &other.address);
        fill(&mut self.jurisdiction, &other.jurisdiction);
        fill(&mut self.registration_number, &other.registration_number);
        self.first_seen = self.first_seen.min(other.first_seen);
        self.last_seen = self.last_seen.max(other.last_seen);
    }

    /// Canonical form of the display name
    pub fn canonical_name(&self) -> String {
        canonicalize(&self.display_name)
    }

    /// Canonical form of the address, if any
    pub fn canonical_address(&self) -> Option<String> {
        self.address
            .as_deref()
            .map(canonicalize)
            .filter(|a| !a.is_empty())
    }

    /// Get all names (display name + aliases)
    pub fn all_names(&self) -> Vec<String> {
        let mut names = vec![self.display_name.clone()];
        names.extend(self.aliases.iter().filter(|a| **a != self.display_name).cloned());
        names
    }
}

/// "ent-" + first 16 hex chars of SHA-256 over the sorted, newline-joined ids
pub fn content_id<'a>(record_ids: impl IntoIterator<Item = &'a str>) -> String {
    let mut ids: Vec<&str> = record_ids.into_iter().collect();
    ids.sort_unstable();
    ids.dedup();

    let mut hasher = Sha256::new();
    hasher.update(ids.join("\n"));
    let digest = format!("{:x}", hasher.finalize());
    format!("ent-{}", &digest[..ID_HEX_LEN])
}

fn fill(slot: &mut Option<String>, value: &Option<String>) {
    if slot.is_none() {
        if let Some(v) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            *slot = Some(v.to_string());
        }
    }
}

/// Most frequent spelling; ties go to the lexicographically smallest
fn pick_display_name(records: &[&RawRecord]) -> String {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for record in records {
        let name = record.name.trim();
        if !name.is_empty() {
            *counts.entry(name).or_insert(0) += 1;
        }
    }

    counts
        .into_iter()
        .max_by(|(a, ca), (b, cb)| ca.cmp(cb).then_with(|| b.cmp(a)))
        .map(|(name, _)| name.to_string())
        .unwrap_or_default()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(id: &str, name: &str, day: u32) -> RawRecord {
        let mut r = RawRecord::new(id, EntityKind::Contractor, name, "philgeps");
        r.retrieved_at = Utc.with_ymd_and_hms(2025, 1, day, 0, 0, 0).unwrap();
        r
    }

    #[test]
    fn test_content_id_is_order_independent() {
        let a = content_id(["r2", "r1", "r3"]);
        let b = content_id(["r3", "r2", "r1"]);

        assert_eq!(a, b);
        assert!(a.starts_with("ent-"));
        assert_eq!(a.len(), 4 + ID_HEX_LEN);
        assert_ne!(a, content_id(["r1", "r2"]));
    }

    #[test]
    fn test_from_cluster_collects_aliases_and_sources() {
        let r1 = record("r1", "JC REYES CONSTRUCTION", 1);
        let r2 = record("r2", "J.C. Reyes Construction Inc.", 2).with_address("12 Rizal St");
        let r3 = record("r3", "JC REYES CONSTRUCTION", 3);

        let entity = CanonicalEntity::from_cluster(&[&r3, &r1, &r2]).unwrap();

        assert_eq!(entity.display_name, "JC REYES CONSTRUCTION");
        assert_eq!(
            entity.aliases,
            vec!["JC REYES CONSTRUCTION", "J.C. Reyes Construction Inc."]
        );
        assert_eq!(entity.sources.len(), 3);
        assert_eq!(entity.address.as_deref(), Some("12 Rizal St"));
        assert_eq!(entity.first_seen, r1.retrieved_at);
        assert_eq!(entity.last_seen, r3.retrieved_at);
    }

    #[test]
    fn test_empty_cluster() {
        assert!(CanonicalEntity::from_cluster(&[]).is_none());
    }

    #[test]
    fn test_absorb_unions_and_tracks_lineage() {
        let r1 = record("r1", "Mega Builders", 1);
        let r2 = record("r2", "MEGA BUILDERS CORP", 2);
        let mut survivor = CanonicalEntity::from_cluster(&[&r1]).unwrap();
        let absorbed = CanonicalEntity::from_cluster(&[&r2]).unwrap();

        survivor.absorb(&absorbed);

        assert_eq!(survivor.aliases, vec!["Mega Builders", "MEGA BUILDERS CORP"]);
        assert!(survivor.sources.contains("r2"));
        assert_eq!(survivor.merged_from, vec![absorbed.id.clone()]);

        // absorbing twice changes nothing
        survivor.absorb(&absorbed);
        assert_eq!(survivor.aliases.len(), 2);
        assert_eq!(survivor.merged_from.len(), 1);
    }

    #[test]
    fn test_canonical_address() {
        let r = record("r1", "Mega Builders", 1).with_address("  ");
        let entity = CanonicalEntity::from_cluster(&[&r]).unwrap();
        assert_eq!(entity.canonical_address(), None);
    }
}
