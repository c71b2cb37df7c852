// A contractor donated to a politician, then won contracts from agencies in
// that politician's jurisdiction.

use super::{peso, DetectionContext, Detector, Evidence, FlagSubject, FlagType, RedFlag, Severity};
use crate::error::DetectorError;
use crate::records::EntityKind;
use std::collections::{BTreeMap, BTreeSet};

pub struct CampaignConnectionDetector;

impl Detector for CampaignConnectionDetector {
    fn name(&self) -> &'static str {
        "campaign_connection"
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Result<Vec<RedFlag>, DetectorError> {
        let graph = ctx.graph;
        let mut agency_jurisdictions: BTreeMap<&str, BTreeSet<String>> = BTreeMap::new();
        let mut flags = Vec::new();

        for donation in &graph.donations {
            if graph.kind_of(&donation.donor) != Some(EntityKind::Contractor)
                || graph.kind_of(&donation.recipient) != Some(EntityKind::Politician)
            {
                continue;
            }
            let territory = graph.jurisdictions_of(&donation.recipient);
            if territory.is_empty() {
                continue;
            }

            let mut agencies = BTreeSet::new();
            let mut refs = Vec::new();
            let mut won = 0.0;
            for contract in &graph.contracts {
                if contract.awardee.as_deref() != Some(donation.donor.as_str())
                    || contract.award_date <= donation.date
                {
                    continue;
                }
                let jurisdictions = agency_jurisdictions
                    .entry(contract.agency.as_str())
                    .or_insert_with(|| graph.jurisdictions_of(&contract.agency));
                if jurisdictions.is_disjoint(&territory) {
                    continue;
                }
                agencies.insert(contract.agency.clone());
                refs.push(contract.reference.clone());
                won += contract.amount;
            }
            if refs.is_empty() {
                continue;
            }

            flags.push(ctx.flag(
                self.name(),
                FlagType::CampaignConnection,
                Severity::High,
                FlagSubject::pair(&donation.donor, &donation.recipient),
                format!(
                    "{} donated {} to {}, then won contracts worth {} from their jurisdiction",
                    graph.name_of(&donation.donor),
                    peso(donation.amount),
                    graph.name_of(&donation.recipient),
                    peso(won)
                ),
                Evidence::CampaignConnection {
                    politician: donation.recipient.clone(),
                    donation_amount: donation.amount,
                    donation_date: donation.date,
                    agencies: agencies.into_iter().collect(),
                    contract_refs: refs,
                    contracts_won: won,
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
    use crate::records::{DonationFact, EntityRef, InputBatch};
    use crate::relationships::test_support::*;
    use chrono::Utc;

    #[test]
    fn test_donation_then_local_award() {
        let records = vec![
            record("a1", EntityKind::Agency, "Talisay City Engineering Office").with_jurisdiction("Cebu"),
            record("a2", EntityKind::Agency, "Davao City Engineering Office").with_jurisdiction("Davao"),
            record("c1", EntityKind::Contractor, "Golden Arc Builders"),
            record("p1", EntityKind::Politician, "Ramon Garcia").with_jurisdiction("Cebu"),
        ];
        let batch = InputBatch {
            donations: vec![DonationFact {
                donor: EntityRef::record("c1"),
                recipient: EntityRef::record("p1"),
                amount: 500_000.0,
                date: date(2022, 3, 1),
            }],
            contracts: vec![
                contract("C-0", "a1", Some("c1"), 9_000_000.0, date(2021, 3, 1)),
                contract("C-1", "a1", Some("c1"), 9_000_000.0, date(2022, 9, 1)),
                contract("C-2", "a2", Some("c1"), 9_000_000.0, date(2022, 9, 1)),
            ],
            ..Default::default()
        };
        let graph = graph_from(records, batch);
        let config = DetectorConfig::default();
        let ctx = DetectionContext::new(&graph, &config, Utc::now());

        let flags = CampaignConnectionDetector.detect(&ctx).unwrap();

        assert_eq!(flags.len(), 1);
        match &flags[0].evidence {
            Evidence::CampaignConnection { contract_refs, contracts_won, .. } => {
                assert_eq!(contract_refs, &vec!["C-1".to_string()]);
                assert_eq!(*contracts_won, 9_000_000.0);
            }
            other => panic!("unexpected evidence {:?}", other),
        }
    }
}
