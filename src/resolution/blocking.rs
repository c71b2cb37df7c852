// Blocking: only records that share a cheap key are ever compared.
//
// Keys are scoped by entity kind:
//   (kind, first canonical token)
//   (kind, registration-number prefix)

use crate::canonicalize::blocking_token;
use crate::records::EntityKind;
use std::collections::{BTreeMap, BTreeSet};

/// A resolvable node: a raw record from this batch, or a prior entity
#[derive(Debug, Clone)]
pub struct ResolutionNode {
    /// Record id, or entity id for priors
    pub id: String,
    pub kind: EntityKind,
    /// Canonical names (deduplicated, non-empty)
    pub names: Vec<String>,
    /// Canonical registration number
    pub registration: Option<String>,
    pub prior: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BlockKey {
    Token(EntityKind, String),
    Registration(EntityKind, String),
}

pub fn build_blocks(
    nodes: &[ResolutionNode],
    registration_prefix_len: usize,
) -> BTreeMap<BlockKey, Vec<usize>> {
    let mut blocks: BTreeMap<BlockKey, Vec<usize>> = BTreeMap::new();

    for (idx, node) in nodes.iter().enumerate() {
        let tokens: BTreeSet<&str> = node
            .names
            .iter()
            .filter_map(|n| blocking_token(n))
            .collect();
        for token in tokens {
            blocks
                .entry(BlockKey::Token(node.kind, token.to_string()))
                .or_default()
                .push(idx);
        }

        if let Some(reg) = node.registration.as_deref().filter(|r| !r.is_empty()) {
            let prefix: String = reg.chars().take(registration_prefix_len).collect();
            blocks
                .entry(BlockKey::Registration(node.kind, prefix))
                .or_default()
                .push(idx);
        }
    }

    blocks
}

/// Distinct within-block pairs (i < j). Prior-prior pairs are skipped: those
/// were already resolved as distinct by an earlier run.
pub fn candidate_pairs(
    blocks: &BTreeMap<BlockKey, Vec<usize>>,
    nodes: &[ResolutionNode],
) -> Vec<(usize, usize)> {
    let mut pairs: BTreeSet<(usize, usize)> = BTreeSet::new();

    for members in blocks.values() {
        for (pos, &i) in members.iter().enumerate() {
            for &j in &members[pos + 1..] {
                if nodes[i].prior && nodes[j].prior {
                    continue;
                }
                pairs.insert((i.min(j), i.max(j)));
            }
        }
    }

    pairs.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, kind: EntityKind, name: &str, reg: Option<&str>) -> ResolutionNode {
        ResolutionNode {
            id: id.to_string(),
            kind,
            names: vec![name.to_string()],
            registration: reg.map(str::to_string),
            prior: false,
        }
    }

    #[test]
    fn test_blocks_are_scoped_by_kind() {
        let nodes = vec![
            node("r1", EntityKind::Contractor, "reyes builders", None),
            node("r2", EntityKind::Contractor, "reyes construction", None),
            node("r3", EntityKind::Municipality, "reyes", None),
        ];

        let blocks = build_blocks(&nodes, 6);
        let pairs = candidate_pairs(&blocks, &nodes);

        assert_eq!(pairs, vec![(0, 1)]);
    }

    #[test]
    fn test_pairs_in_several_blocks_listed_once() {
        let nodes = vec![
            node("r1", EntityKind::Contractor, "mega builders", Some("pcab123456")),
            node("r2", EntityKind::Contractor, "mega buildrs", Some("pcab123999")),
            node("r3", EntityKind::Contractor, "other name", Some("pcab123000")),
        ];

        let blocks = build_blocks(&nodes, 6);
        let pairs = candidate_pairs(&blocks, &nodes);

        // r1/r2 share both the token and the registration prefix
        assert_eq!(pairs, vec![(0, 1), (0, 2), (1, 2)]);
    }

    #[test]
    fn test_prior_pairs_skipped() {
        let mut a = node("ent-a", EntityKind::Agency, "dpwh region vii", None);
        let mut b = node("ent-b", EntityKind::Agency, "dpwh region vi", None);
        a.prior = true;
        b.prior = true;
        let nodes = vec![a, b, node("r1", EntityKind::Agency, "dpwh region 7", None)];

        let blocks = build_blocks(&nodes, 6);
        let pairs = candidate_pairs(&blocks, &nodes);

        assert_eq!(pairs, vec![(0, 2), (1, 2)]);
    }
}
