// One high flag per split cluster found during derivation.

use super::{peso, DetectionContext, Detector, Evidence, FlagSubject, FlagType, RedFlag, Severity};
use crate::error::DetectorError;

pub struct SplitContractsDetector;

impl Detector for SplitContractsDetector {
    fn name(&self) -> &'static str {
        "split_contracts"
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Result<Vec<RedFlag>, DetectorError> {
        let graph = ctx.graph;
        graph
            .split_clusters
            .iter()
            .map(|cluster| {
                ctx.flag(
                    self.name(),
                    FlagType::SplitContracts,
                    Severity::High,
                    FlagSubject::entity(&cluster.contractor),
                    format!(
                        "{} contracts from {} to {} total {}, each under the {} bidding threshold ({})",
                        cluster.contract_refs.len(),
                        graph.name_of(&cluster.agency),
                        graph.name_of(&cluster.contractor),
                        peso(cluster.total),
                        peso(cluster.threshold),
                        cluster.contract_refs.join(", ")
                    ),
                    Evidence::SplitContracts {
                        agency: cluster.agency.clone(),
                        contract_refs: cluster.contract_refs.clone(),
                        amounts: cluster.amounts.clone(),
                        total: cluster.total,
                        threshold: cluster.threshold,
                        first_award: cluster.first_award,
                        last_award: cluster.last_award,
                    },
                )
            })
            .collect()
    }
}
