// Agencies whose awards are concentrated in few contractors.

use super::{DetectionContext, Detector, Evidence, FlagSubject, FlagType, RedFlag, Severity};
use crate::analytics::agency_concentration;
use crate::error::DetectorError;

pub struct ConcentrationDetector;

/// ≥0.75 critical, ≥0.5 high, anything else over the threshold medium
pub fn severity_for(hhi: f64) -> Severity {
    if hhi >= 0.75 {
        Severity::Critical
    } else if hhi >= 0.5 {
        Severity::High
    } else {
        Severity::Medium
    }
}

impl Detector for ConcentrationDetector {
    fn name(&self) -> &'static str {
        "concentration"
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Result<Vec<RedFlag>, DetectorError> {
        let mut flags = Vec::new();
        for report in agency_concentration(ctx.graph, ctx.config) {
            let Some(hhi) = report.hhi.filter(|h| *h >= ctx.config.hhi_threshold) else {
                continue;
            };
            let top = report.top_contractor();
            let description = match top {
                Some(t) => format!(
                    "{} awards are concentrated (HHI {:.2}); {} holds {:.1}% of the value",
                    report.agency_name,
                    hhi,
                    t.contractor_name,
                    t.share * 100.0
                ),
                None => format!("{} awards are concentrated (HHI {:.2})", report.agency_name, hhi),
            };
            flags.push(ctx.flag(
                self.name(),
                FlagType::Concentration,
                severity_for(hhi),
                FlagSubject::entity(&report.agency),
                description,
                Evidence::Concentration {
                    hhi,
                    total_value: report.total_value,
                    contract_count: report.contract_count,
                    top_contractor: top.map(|t| t.contractor.clone()),
                    top_share: top.map(|t| t.share),
                },
            )?);
        }
        Ok(flags)
    }
}
