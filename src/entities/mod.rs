// Entity Models
// "Identity persists, values change": a canonical entity keeps its id while
// aliases and sources accumulate.

pub mod canonical;

pub use canonical::{content_id, CanonicalEntity};

use crate::records::{EntityKind, EntityRef};
use std::collections::HashMap;

/// Lookup over the entities of one run: by id, and from any member record id
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    entities: Vec<CanonicalEntity>,
    by_id: HashMap<String, usize>,
    by_record: HashMap<String, usize>,
    /// Retired ids (absorbed into a survivor) → survivor index
    by_merged: HashMap<String, usize>,
}

impl EntityRegistry {
    pub fn new(entities: Vec<CanonicalEntity>) -> Self {
        let mut registry = EntityRegistry::default();
        for entity in entities {
            registry.register(entity);
        }
        registry
    }

    pub fn register(&mut self, entity: CanonicalEntity) {
        let idx = self.entities.len();
        self.by_id.insert(entity.id.clone(), idx);
        for source in &entity.sources {
            self.by_record.insert(source.clone(), idx);
        }
        for retired in &entity.merged_from {
            self.by_merged.insert(retired.clone(), idx);
        }
        self.entities.push(entity);
    }

    /// Find entity by id (a retired id finds its survivor)
    pub fn find_by_id(&self, id: &str) -> Option<&CanonicalEntity> {
        self.by_id
            .get(id)
            .or_else(|| self.by_merged.get(id))
            .map(|&idx| &self.entities[idx])
    }

    /// Canonical id a fact reference points at, if it resolved
    pub fn resolve(&self, entity_ref: &EntityRef) -> Option<&str> {
        let idx = match entity_ref {
            EntityRef::Record(record_id) => self.by_record.get(record_id),
            EntityRef::Entity(id) => self.by_id.get(id).or_else(|| self.by_merged.get(id)),
        }?;
        Some(self.entities[*idx].id.as_str())
    }

    pub fn all(&self) -> &[CanonicalEntity] {
        &self.entities
    }

    pub fn by_kind(&self, kind: EntityKind) -> impl Iterator<Item = &CanonicalEntity> {
        self.entities.iter().filter(move |e| e.kind == kind)
    }

    pub fn count(&self) -> usize {
        self.entities.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::RawRecord;

    #[test]
    fn test_resolve_record_and_retired_ids() {
        let r1 = RawRecord::new("r1", EntityKind::Contractor, "Mega Builders", "philgeps");
        let mut entity = CanonicalEntity::from_cluster(&[&r1]).unwrap();
        entity.merged_from.push("ent-old".to_string());
        let id = entity.id.clone();

        let registry = EntityRegistry::new(vec![entity]);

        assert_eq!(registry.resolve(&EntityRef::record("r1")), Some(id.as_str()));
        assert_eq!(registry.resolve(&EntityRef::entity("ent-old")), Some(id.as_str()));
        assert_eq!(registry.resolve(&EntityRef::record("missing")), None);
        assert_eq!(registry.by_kind(EntityKind::Contractor).count(), 1);
        assert_eq!(registry.find_by_id("ent-old").map(|e| e.id.as_str()), Some(id.as_str()));
    }
}
