// 📊 Concentration & Dynasty Analytics
// Scalar aggregates computed fresh every run from the resolved graph.

pub mod concentration;
pub mod dynasty;

pub use concentration::{
    agency_concentration, contractor_reach, hhi, ConcentrationReport, ContractorReach,
    ContractorShare,
};
pub use dynasty::{dynasty_scores, DynastyReport};
