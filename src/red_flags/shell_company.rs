// Contractors winning far more than their registered capital.

use super::{peso, DetectionContext, Detector, Evidence, FlagSubject, FlagType, RedFlag, Severity};
use crate::error::DetectorError;
use std::collections::BTreeMap;

pub struct ShellCompanyDetector;

impl Detector for ShellCompanyDetector {
    fn name(&self) -> &'static str {
        "shell_company"
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Result<Vec<RedFlag>, DetectorError> {
        let graph = ctx.graph;

        let mut awarded: BTreeMap<&str, f64> = BTreeMap::new();
        for contract in &graph.contracts {
            if let Some(awardee) = contract.awardee.as_deref() {
                *awarded.entry(awardee).or_default() += contract.amount;
            }
        }

        let mut flags = Vec::new();
        for (contractor, registration) in &graph.registrations {
            let Some(capital) = registration.registered_capital.filter(|c| *c > 0.0) else {
                continue;
            };
            let Some(&total) = awarded.get(contractor.as_str()) else {
                continue;
            };
            let ratio = total / capital;
            if ratio <= ctx.config.shell_capital_ratio {
                continue;
            }

            flags.push(ctx.flag(
                self.name(),
                FlagType::ShellCompany,
                Severity::High,
                FlagSubject::entity(contractor),
                format!(
                    "{} has registered capital of {} but won contracts worth {} ({:.1}x capital)",
                    graph.name_of(contractor),
                    peso(capital),
                    peso(total),
                    ratio
                ),
                Evidence::ShellCompany {
                    registered_capital: capital,
                    total_awarded: total,
                    ratio,
                },
            )?);
        }
        Ok(flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectorConfig;
    use crate::records::{EntityKind, EntityRef, InputBatch, RegistrationFact};
    use crate::relationships::test_support::*;
    use chrono::Utc;

    #[test]
    fn test_thin_capital_flagged() {
        let records = vec![
            record("a1", EntityKind::Agency, "DPWH Region VII"),
            record("c1", EntityKind::Contractor, "Paper Builders"),
            record("c2", EntityKind::Contractor, "Solid Builders"),
        ];
        let batch = InputBatch {
            contracts: vec![
                contract("C-1", "a1", Some("c1"), 25_000_000.0, date(2024, 1, 1)),
                contract("C-2", "a1", Some("c2"), 25_000_000.0, date(2024, 1, 2)),
            ],
            registrations: vec![
                RegistrationFact {
                    contractor: EntityRef::record("c1"),
                    registered_capital: Some(50_000.0),
                    registered_on: None,
                },
                RegistrationFact {
                    contractor: EntityRef::record("c2"),
                    registered_capital: Some(10_000_000.0),
                    registered_on: None,
                },
            ],
            ..Default::default()
        };
        let graph = graph_from(records, batch);
        let config = DetectorConfig::default();
        let ctx = DetectionContext::new(&graph, &config, Utc::now());

        let flags = ShellCompanyDetector.detect(&ctx).unwrap();

        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].subject, FlagSubject::entity(&id_of(&graph, "c1")));
        assert!(flags[0].evidence_json.contains("\"ratio\":500.0"));
    }
}
