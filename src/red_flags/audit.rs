// Same audit finding for the same agency in consecutive years.

use super::{DetectionContext, Detector, Evidence, FlagSubject, FlagType, RedFlag, Severity};
use crate::canonicalize::canonicalize;
use crate::error::DetectorError;
use std::collections::BTreeMap;

pub struct AuditRepeatDetector;

impl Detector for AuditRepeatDetector {
    fn name(&self) -> &'static str {
        "audit_repeat"
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Result<Vec<RedFlag>, DetectorError> {
        let graph = ctx.graph;

        // (agency, finding type) → year → descriptions
        let mut findings: BTreeMap<(&str, String), BTreeMap<i32, Vec<&str>>> = BTreeMap::new();
        for audit in &graph.audits {
            let finding_type = canonicalize(&audit.finding_type);
            if finding_type.is_empty() {
                continue;
            }
            findings
                .entry((audit.agency.as_str(), finding_type))
                .or_default()
                .entry(audit.year)
                .or_default()
                .push(audit.description.as_str());
        }

        let mut flags = Vec::new();
        for ((agency, finding_type), by_year) in findings {
            for run in consecutive_runs(by_year.keys().copied()) {
                let descriptions: Vec<String> = run
                    .iter()
                    .filter_map(|y| by_year.get(y))
                    .flatten()
                    .map(|d| d.to_string())
                    .collect();
                let (first, last) = (run[0], run[run.len() - 1]);
                flags.push(ctx.flag(
                    self.name(),
                    FlagType::AuditRepeat,
                    Severity::High,
                    FlagSubject::entity(agency),
                    format!(
                        "{} was cited for \"{}\" every year from {} to {}",
                        graph.name_of(agency),
                        finding_type,
                        first,
                        last
                    ),
                    Evidence::AuditRepeat {
                        finding_type: finding_type.clone(),
                        years: run,
                        descriptions,
                    },
                )?);
            }
        }
        Ok(flags)
    }
}

/// Maximal runs of consecutive years, two or more long
fn consecutive_runs(years: impl Iterator<Item = i32>) -> Vec<Vec<i32>> {
    let mut runs: Vec<Vec<i32>> = Vec::new();
    let mut current: Vec<i32> = Vec::new();
    for year in years {
        if current.last().map_or(false, |&prev| year == prev + 1) {
            current.push(year);
        } else {
            if current.len() >= 2 {
                runs.push(std::mem::take(&mut current));
            }
            current = vec![year];
        }
    }
    if current.len() >= 2 {
        runs.push(current);
    }
    runs
}
