// Per-entity risk roll-up.
//
// Severities are not ranked against each other; every flag adds its
// configured weight and the sum is capped at 1.0. Pair flags count for both
// entities.

use super::{RedFlag, Severity};
use crate::config::RiskWeights;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRiskReport {
    pub entity_id: String,
    pub flags: Vec<RedFlag>,
    pub risk_score: f64,
    pub max_severity: Severity,
}

impl EntityRiskReport {
    pub fn count(&self, severity: Severity) -> usize {
        self.flags.iter().filter(|f| f.severity == severity).count()
    }
}

pub fn weight_of(severity: Severity, weights: &RiskWeights) -> f64 {
    match severity {
        Severity::Critical => weights.critical,
        Severity::High => weights.high,
        Severity::Medium => weights.medium,
        Severity::Low => weights.low,
    }
}

/// Highest risk first
pub fn roll_up(flags: &[RedFlag], weights: &RiskWeights) -> Vec<EntityRiskReport> {
    let mut by_entity: BTreeMap<&str, Vec<&RedFlag>> = BTreeMap::new();
    for flag in flags {
        for id in flag.subject.entity_ids() {
            by_entity.entry(id).or_default().push(flag);
        }
    }

    let mut reports: Vec<EntityRiskReport> = by_entity
        .into_iter()
        .filter_map(|(id, flags)| {
            let max_severity = flags.iter().map(|f| f.severity).max()?;
            let score: f64 = flags.iter().map(|f| weight_of(f.severity, weights)).sum();
            Some(EntityRiskReport {
                entity_id: id.to_string(),
                flags: flags.into_iter().cloned().collect(),
                risk_score: score.min(1.0),
                max_severity,
            })
        })
        .collect();

    reports.sort_by(|a, b| {
        b.risk_score
            .total_cmp(&a.risk_score)
            .then_with(|| b.max_severity.cmp(&a.max_severity))
            .then_with(|| a.entity_id.cmp(&b.entity_id))
    });
    reports
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::red_flags::{Evidence, FlagSubject, FlagType};
    use chrono::Utc;

    fn flag(subject: FlagSubject, severity: Severity) -> RedFlag {
        RedFlag {
            flag_type: FlagType::IdenticalBidAmounts,
            severity,
            subject,
            description: String::new(),
            evidence: Evidence::ShellCompany {
                registered_capital: 1.0,
                total_awarded: 1.0,
                ratio: 1.0,
            },
            evidence_json: String::new(),
            detected_at: Utc::now(),
        }
    }

    #[test]
    fn test_pair_flags_count_for_both() {
        let flags = vec![
            flag(FlagSubject::pair("ent-a", "ent-b"), Severity::Critical),
            flag(FlagSubject::entity("ent-a"), Severity::Medium),
        ];

        let reports = roll_up(&flags, &RiskWeights::default());

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].entity_id, "ent-a");
        assert!((reports[0].risk_score - 0.5).abs() < 1e-12);
        assert_eq!(reports[0].max_severity, Severity::Critical);
        assert_eq!(reports[1].entity_id, "ent-b");
        assert!((reports[1].risk_score - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_score_is_capped() {
        let flags: Vec<RedFlag> = (0..5)
            .map(|_| flag(FlagSubject::entity("ent-a"), Severity::Critical))
            .collect();

        let reports = roll_up(&flags, &RiskWeights::default());

        assert_eq!(reports[0].risk_score, 1.0);
        assert_eq!(reports[0].count(Severity::Critical), 5);
    }
}
