// Fan-out / fan-in over the detector battery.
//
// Detectors run in parallel over one read-only snapshot. A detector that
// returns an error or panics is reported as a failure; every other
// detector's flags are kept.

use super::audit::AuditRepeatDetector;
use super::bidding::{IdenticalBidsDetector, SingleBidderDetector};
use super::campaign::CampaignConnectionDetector;
use super::circular::CircularSubcontractingDetector;
use super::collusion::CollusionRingDetector;
use super::concentration::ConcentrationDetector;
use super::phoenix::PhoenixDetector;
use super::shell_company::ShellCompanyDetector;
use super::splitting::SplitContractsDetector;
use super::{DetectionContext, Detector, RedFlag};
use crate::config::DetectorConfig;
use crate::error::DetectorError;
use crate::graph::ResolvedGraph;
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{info, warn};

#[derive(Debug, Clone, Default)]
pub struct DetectionOutcome {
    /// Sorted by (type, subject, description)
    pub flags: Vec<RedFlag>,
    pub failures: Vec<DetectorError>,
}

pub struct RedFlagEngine {
    config: DetectorConfig,
    detectors: Vec<Box<dyn Detector>>,
}

impl RedFlagEngine {
    /// The full battery
    pub fn new(config: DetectorConfig) -> Self {
        let detectors: Vec<Box<dyn Detector>> = vec![
            Box::new(SingleBidderDetector),
            Box::new(IdenticalBidsDetector),
            Box::new(SplitContractsDetector),
            Box::new(ConcentrationDetector),
            Box::new(CollusionRingDetector),
            Box::new(PhoenixDetector),
            Box::new(CircularSubcontractingDetector),
            Box::new(AuditRepeatDetector),
            Box::new(ShellCompanyDetector),
            Box::new(CampaignConnectionDetector),
        ];
        Self::with_detectors(config, detectors)
    }

    pub fn with_detectors(config: DetectorConfig, detectors: Vec<Box<dyn Detector>>) -> Self {
        RedFlagEngine { config, detectors }
    }

    pub fn detector_names(&self) -> Vec<&'static str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    pub fn run(&self, graph: &ResolvedGraph, detected_at: DateTime<Utc>) -> DetectionOutcome {
        let ctx = DetectionContext::new(graph, &self.config, detected_at);

        let results: Vec<(&'static str, Result<Vec<RedFlag>, DetectorError>)> = self
            .detectors
            .par_iter()
            .map(|detector| {
                let result = catch_unwind(AssertUnwindSafe(|| detector.detect(&ctx)))
                    .unwrap_or_else(|panic| Err(DetectorError::new(detector.name(), panic_message(panic))));
                (detector.name(), result)
            })
            .collect();

        let mut outcome = DetectionOutcome::default();
        for (name, result) in results {
            match result {
                Ok(flags) => {
                    info!(detector = name, flags = flags.len(), "detector finished");
                    outcome.flags.extend(flags);
                }
                Err(e) => {
                    warn!(detector = name, error = %e, "detector failed");
                    outcome.failures.push(e);
                }
            }
        }

        outcome.flags.sort_by(|a, b| {
            a.flag_type
                .cmp(&b.flag_type)
                .then_with(|| a.subject.cmp(&b.subject))
                .then_with(|| a.description.cmp(&b.description))
        });
        outcome
    }
}

impl Default for RedFlagEngine {
    fn default() -> Self {
        Self::new(DetectorConfig::default())
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{EntityKind, InputBatch};
    use crate::red_flags::{FlagType, Severity};
    use crate::relationships::test_support::*;

    struct Exploding;

    impl Detector for Exploding {
        fn name(&self) -> &'static str {
            "exploding"
        }

        fn detect(&self, _ctx: &DetectionContext<'_>) -> Result<Vec<RedFlag>, DetectorError> {
            panic!("boom")
        }
    }

    struct Failing;

    impl Detector for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn detect(&self, _ctx: &DetectionContext<'_>) -> Result<Vec<RedFlag>, DetectorError> {
            Err(DetectorError::new(self.name(), "no data"))
        }
    }

    fn monopoly() -> ResolvedGraph {
        let records = vec![
            record("a1", EntityKind::Agency, "DPWH Region VII"),
            record("c1", EntityKind::Contractor, "Alpha Builders"),
        ];
        let mut batch = InputBatch::default();
        for i in 0..4 {
            let reference = format!("C-{}", i);
            batch.contracts.push(contract(&reference, "a1", Some("c1"), 2_000_000.0, date(2024, 1 + i, 1)));
            batch.bids.push(bid(&reference, "c1", 2_000_000.0, true));
        }
        graph_from(records, batch)
    }

    #[test]
    fn test_failures_are_isolated() {
        let engine = RedFlagEngine::with_detectors(
            DetectorConfig::default(),
            vec![Box::new(Exploding), Box::new(SingleBidderDetector), Box::new(Failing)],
        );

        let outcome = engine.run(&monopoly(), Utc::now());

        assert_eq!(outcome.failures.len(), 2);
        let failed: Vec<&str> = outcome.failures.iter().map(|f| f.detector.as_str()).collect();
        assert!(failed.contains(&"exploding"));
        assert!(failed.contains(&"failing"));
        assert_eq!(outcome.flags.len(), 5);
    }

    #[test]
    fn test_full_battery_on_monopoly() {
        let outcome = RedFlagEngine::default().run(&monopoly(), Utc::now());

        assert!(outcome.failures.is_empty());
        assert_eq!(RedFlagEngine::default().detector_names().len(), 10);
        let concentration: Vec<&RedFlag> = outcome
            .flags
            .iter()
            .filter(|f| f.flag_type == FlagType::Concentration)
            .collect();
        assert_eq!(concentration.len(), 1);
        assert_eq!(concentration[0].severity, Severity::Critical);
    }
}
