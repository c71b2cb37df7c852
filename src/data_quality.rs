// ✅ Data Quality Engine - Screens records and facts before resolution
//
// Data-quality problems are never fatal: a RawRecord with a critical issue is
// excluded from resolution, a fact with an unusable field or a dangling
// reference is skipped, and every one of them is reported. The batch goes on.

use crate::canonicalize::{canonicalize, canonicalize_person, canonicalize_registration};
use crate::entities::CanonicalEntity;
use crate::records::{EntityRef, InputBatch, RawRecord};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

// ============================================================================
// VALIDATION RESULT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub passed: bool,
    pub rule_name: String,
    pub field: String,
    pub message: String,
    pub confidence: f64,
    pub severity: IssueSeverity,
}

impl ValidationResult {
    pub fn pass(rule_name: &str, field: &str, message: &str) -> Self {
        ValidationResult {
            passed: true,
            rule_name: rule_name.to_string(),
            field: field.to_string(),
            message: message.to_string(),
            confidence: 1.0,
            severity: IssueSeverity::Info,
        }
    }

    pub fn fail(rule_name: &str, field: &str, message: &str, severity: IssueSeverity) -> Self {
        ValidationResult {
            passed: false,
            rule_name: rule_name.to_string(),
            field: field.to_string(),
            message: message.to_string(),
            confidence: if severity == IssueSeverity::Critical {
                0.0
            } else {
                0.5
            },
            severity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IssueSeverity {
    Critical, // Record cannot take part in resolution
    Warning,  // Usable, but questionable
    Info,     // Usable, could be better
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityIssue {
    /// "record:r1", "contract:C-1", "bid:C-1#0", ...
    pub subject: String,
    pub severity: IssueSeverity,
    pub field: String,
    pub issue: String,
    pub recommendation: String,
}

// ============================================================================
// QUALITY REPORT (per record)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub record_id: String,
    pub overall_quality: f64,
    pub overall_confidence: f64,
    pub validations: Vec<ValidationResult>,
    pub issues: Vec<QualityIssue>,
    pub passed_count: usize,
    pub failed_count: usize,
    pub needs_review: bool,
}

impl QualityReport {
    pub fn summary(&self) -> String {
        format!(
            "{}: quality {:.1}%, confidence {:.1}%, issues: {} ({} critical)",
            self.record_id,
            self.overall_quality * 100.0,
            self.overall_confidence * 100.0,
            self.issues.len(),
            self.issues
                .iter()
                .filter(|i| i.severity == IssueSeverity::Critical)
                .count()
        )
    }

    pub fn has_critical_issues(&self) -> bool {
        self.issues
            .iter()
            .any(|i| i.severity == IssueSeverity::Critical)
    }

    /// Well-formed records take part in resolution
    pub fn is_well_formed(&self) -> bool {
        !self.has_critical_issues()
    }
}

// ============================================================================
// SCREENED BATCH
// ============================================================================

/// A batch after screening: only well-formed records and usable facts remain
#[derive(Debug, Clone)]
pub struct ScreenedBatch {
    pub batch: InputBatch,
    pub record_reports: Vec<QualityReport>,
    pub fact_issues: Vec<QualityIssue>,
    pub excluded_records: Vec<String>,
    pub skipped_facts: usize,
}

impl ScreenedBatch {
    /// Every issue worth surfacing in the run report (critical + warning)
    pub fn warnings(&self) -> Vec<QualityIssue> {
        self.record_reports
            .iter()
            .flat_map(|r| r.issues.iter())
            .chain(self.fact_issues.iter())
            .filter(|i| i.severity != IssueSeverity::Info)
            .cloned()
            .collect()
    }
}

// ============================================================================
// DATA QUALITY ENGINE
// ============================================================================

pub struct DataQualityEngine {
    /// Canonical names shorter than this are suspicious
    min_name_len: usize,

    /// Retrieval timestamps later than now + this are rejected as clock skew
    future_tolerance: Duration,

    /// Minimum confidence threshold for "needs_review"
    review_threshold: f64,

    now: DateTime<Utc>,
}

impl DataQualityEngine {
    pub fn new() -> Self {
        DataQualityEngine {
            min_name_len: 2,
            future_tolerance: Duration::days(1),
            review_threshold: 0.7,
            now: Utc::now(),
        }
    }

    /// Pin "now" (used by the future-timestamp rule)
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Validate a single raw record
    pub fn validate_record(&self, record: &RawRecord) -> QualityReport {
        let subject = format!("record:{}", record.record_id);
        let mut validations = vec![
            self.validate_record_id(&record.record_id),
            self.validate_name(&record.name),
            self.validate_source(&record.source_system),
            self.validate_retrieved_at(record.retrieved_at),
        ];
        if let Some(reg) = &record.registration_number {
            validations.push(self.validate_registration(reg));
        }

        let issues: Vec<QualityIssue> = validations
            .iter()
            .filter(|v| !v.passed)
            .map(|v| QualityIssue {
                subject: subject.clone(),
                severity: v.severity,
                field: v.field.clone(),
                issue: v.message.clone(),
                recommendation: recommendation_for(&v.rule_name).to_string(),
            })
            .collect();

        let passed_count = validations.iter().filter(|v| v.passed).count();
        let failed_count = validations.len() - passed_count;
        let overall_quality = passed_count as f64 / validations.len() as f64;
        let overall_confidence: f64 =
            validations.iter().map(|v| v.confidence).sum::<f64>() / validations.len() as f64;

        QualityReport {
            record_id: record.record_id.clone(),
            overall_quality,
            overall_confidence,
            needs_review: overall_confidence < self.review_threshold,
            validations,
            issues,
            passed_count,
            failed_count,
        }
    }

    /// Screen a whole batch.
    ///
    /// `prior` holds what previous runs resolved; facts may point at those
    /// entities (or records) without repeating them in this batch.
    pub fn screen(&self, batch: &InputBatch, prior: &PriorIds) -> ScreenedBatch {
        let mut record_reports = Vec::with_capacity(batch.records.len());
        let mut excluded_records = Vec::new();
        let mut records = Vec::with_capacity(batch.records.len());
        let mut seen_ids: HashSet<&str> = HashSet::new();

        for record in &batch.records {
            let mut report = self.validate_record(record);

            if !seen_ids.insert(record.record_id.as_str()) {
                report.issues.push(QualityIssue {
                    subject: format!("record:{}", record.record_id),
                    severity: IssueSeverity::Critical,
                    field: "record_id".to_string(),
                    issue: "Duplicate record id in batch".to_string(),
                    recommendation: recommendation_for("record_id_duplicate").to_string(),
                });
            }

            if report.is_well_formed() {
                records.push(record.clone());
            } else {
                warn!(record_id = %record.record_id, "excluding malformed record");
                excluded_records.push(record.record_id.clone());
            }
            record_reports.push(report);
        }

        let known = KnownRefs {
            records: records.iter().map(|r| r.record_id.clone()).collect(),
            prior,
        };

        let mut screener = FactScreener {
            known: &known,
            issues: Vec::new(),
            skipped: 0,
        };
        let cleaned = screener.screen(batch, records);

        if screener.skipped > 0 {
            warn!(skipped = screener.skipped, "skipped unusable facts");
        }
        debug!(
            records = cleaned.records.len(),
            excluded = excluded_records.len(),
            facts = cleaned.fact_count(),
            "batch screened"
        );

        ScreenedBatch {
            batch: cleaned,
            record_reports,
            fact_issues: screener.issues,
            excluded_records,
            skipped_facts: screener.skipped,
        }
    }

    /// Generate summary statistics for a screened batch
    pub fn batch_summary(&self, screened: &ScreenedBatch) -> BatchSummary {
        let reports = &screened.record_reports;
        let total = reports.len();
        let needs_review = reports.iter().filter(|r| r.needs_review).count();
        let avg_quality = if total == 0 {
            1.0
        } else {
            reports.iter().map(|r| r.overall_quality).sum::<f64>() / total as f64
        };

        BatchSummary {
            total_records: total,
            well_formed_count: total - screened.excluded_records.len(),
            excluded_count: screened.excluded_records.len(),
            needs_review_count: needs_review,
            skipped_fact_count: screened.skipped_facts,
            average_quality: avg_quality,
        }
    }

    // ========================================================================
    // RECORD RULES
    // ========================================================================

    fn validate_record_id(&self, record_id: &str) -> ValidationResult {
        if record_id.trim().is_empty() {
            return ValidationResult::fail(
                "record_id_empty",
                "record_id",
                "Record id is empty",
                IssueSeverity::Critical,
            );
        }
        ValidationResult::pass("record_id_present", "record_id", "Record id present")
    }

    fn validate_name(&self, name: &str) -> ValidationResult {
        let canonical = canonicalize(name);
        if canonical.is_empty() {
            return ValidationResult::fail(
                "name_missing",
                "name",
                "Name is missing or has no alphanumeric content",
                IssueSeverity::Critical,
            );
        }

        if canonical.chars().count() < self.min_name_len {
            return ValidationResult::fail(
                "name_too_short",
                "name",
                &format!("Name too short to match reliably: {}", name),
                IssueSeverity::Warning,
            );
        }

        ValidationResult::pass("name_present", "name", &format!("Name present: {}", name))
    }

    fn validate_source(&self, source_system: &str) -> ValidationResult {
        if source_system.trim().is_empty() {
            return ValidationResult::fail(
                "source_missing",
                "source_system",
                "Source system is missing",
                IssueSeverity::Warning,
            );
        }
        ValidationResult::pass("source_present", "source_system", "Source system present")
    }

    fn validate_retrieved_at(&self, retrieved_at: DateTime<Utc>) -> ValidationResult {
        if retrieved_at > self.now + self.future_tolerance {
            return ValidationResult::fail(
                "retrieved_in_future",
                "retrieved_at",
                &format!("Retrieval timestamp is in the future: {}", retrieved_at),
                IssueSeverity::Warning,
            );
        }
        ValidationResult::pass("retrieved_at_valid", "retrieved_at", "Retrieval timestamp valid")
    }

    fn validate_registration(&self, registration: &str) -> ValidationResult {
        let canonical = canonicalize_registration(registration);
        if canonical.is_empty() {
            return ValidationResult::fail(
                "registration_empty",
                "registration_number",
                "Registration number has no alphanumeric content",
                IssueSeverity::Info,
            );
        }

        if !canonical.chars().any(|c| c.is_ascii_digit()) {
            return ValidationResult::fail(
                "registration_malformed",
                "registration_number",
                &format!("Registration number has no digits: {}", registration),
                IssueSeverity::Warning,
            );
        }

        ValidationResult::pass(
            "registration_valid",
            "registration_number",
            "Registration number valid",
        )
    }
}

impl Default for DataQualityEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn recommendation_for(rule_name: &str) -> &'static str {
    match rule_name {
        "record_id_empty" | "record_id_duplicate" => "Assign a unique record id at collection time",
        "name_missing" => "Re-collect the record; it cannot be resolved without a name",
        "name_too_short" => "Verify the name against the source document",
        "source_missing" => "Tag the record with its source system for provenance",
        "retrieved_in_future" => "Check the collector clock",
        "registration_empty" | "registration_malformed" => {
            "Verify the registration number against the registry"
        }
        _ => "Review the record",
    }
}

// ============================================================================
// FACT SCREENING
// ============================================================================

/// Ids committed by earlier runs
#[derive(Debug, Clone, Default)]
pub struct PriorIds {
    /// Live and retired canonical ids
    pub entities: HashSet<String>,
    /// Member record ids
    pub records: HashSet<String>,
}

impl PriorIds {
    pub fn from_entities(entities: &[CanonicalEntity]) -> Self {
        let mut ids = PriorIds::default();
        for entity in entities {
            ids.entities.insert(entity.id.clone());
            ids.entities.extend(entity.merged_from.iter().cloned());
            ids.records.extend(entity.sources.iter().cloned());
        }
        ids
    }
}

struct KnownRefs<'a> {
    records: HashSet<String>,
    prior: &'a PriorIds,
}

impl KnownRefs<'_> {
    fn contains(&self, entity_ref: &EntityRef) -> bool {
        match entity_ref {
            EntityRef::Record(id) => self.records.contains(id) || self.prior.records.contains(id),
            EntityRef::Entity(id) => self.prior.entities.contains(id),
        }
    }
}

struct FactScreener<'a> {
    known: &'a KnownRefs<'a>,
    issues: Vec<QualityIssue>,
    skipped: usize,
}

impl FactScreener<'_> {
    fn screen(&mut self, batch: &InputBatch, records: Vec<RawRecord>) -> InputBatch {
        let mut contract_refs: HashSet<&str> = HashSet::new();
        let mut contracts = Vec::with_capacity(batch.contracts.len());
        for c in &batch.contracts {
            let subject = format!("contract:{}", c.reference);
            let ok = self.non_empty(&subject, "reference", &c.reference)
                && self.amount(&subject, "amount", c.amount)
                && self.reference(&subject, "agency", &c.agency)
                && c.awardee
                    .as_ref()
                    .map_or(true, |a| self.reference(&subject, "awardee", a));
            if !ok {
                continue;
            }
            if !contract_refs.insert(c.reference.as_str()) {
                self.skip(&subject, "reference", "Duplicate contract reference");
                continue;
            }
            contracts.push(c.clone());
        }

        let bids = batch
            .bids
            .iter()
            .enumerate()
            .filter(|(i, b)| {
                let subject = format!("bid:{}#{}", b.contract_ref, i);
                let known_contract = contract_refs.contains(b.contract_ref.as_str());
                if !known_contract {
                    self.skip(&subject, "contract_ref", "Bid references an unknown contract");
                    return false;
                }
                self.amount(&subject, "amount", b.amount)
                    && self.reference(&subject, "bidder", &b.bidder)
            })
            .map(|(_, b)| b.clone())
            .collect();

        let subcontracts = batch
            .subcontracts
            .iter()
            .enumerate()
            .filter(|(i, s)| {
                let subject = format!("subcontract#{}", i);
                self.amount(&subject, "amount", s.amount)
                    && self.reference(&subject, "contractor", &s.contractor)
                    && self.reference(&subject, "subcontractor", &s.subcontractor)
            })
            .map(|(_, s)| s.clone())
            .collect();

        let donations = batch
            .donations
            .iter()
            .enumerate()
            .filter(|(i, d)| {
                let subject = format!("donation#{}", i);
                self.amount(&subject, "amount", d.amount)
                    && self.reference(&subject, "donor", &d.donor)
                    && self.reference(&subject, "recipient", &d.recipient)
            })
            .map(|(_, d)| d.clone())
            .collect();

        let audits = batch
            .audits
            .iter()
            .enumerate()
            .filter(|(i, a)| {
                let subject = format!("audit#{}", i);
                self.non_empty(&subject, "finding_type", &a.finding_type)
                    && self.reference(&subject, "agency", &a.agency)
            })
            .map(|(_, a)| a.clone())
            .collect();

        let ownerships = batch
            .ownerships
            .iter()
            .enumerate()
            .filter(|(i, o)| {
                let subject = format!("ownership#{}", i);
                if canonicalize_person(&o.person_name).is_empty() {
                    self.skip(&subject, "person_name", "Owner/director name is empty");
                    return false;
                }
                self.reference(&subject, "contractor", &o.contractor)
            })
            .map(|(_, o)| o.clone())
            .collect();

        let blacklist = batch
            .blacklist
            .iter()
            .enumerate()
            .filter(|(i, b)| {
                self.reference(&format!("blacklist#{}", i), "contractor", &b.contractor)
            })
            .map(|(_, b)| b.clone())
            .collect();

        let positions = batch
            .positions
            .iter()
            .enumerate()
            .filter(|(i, p)| {
                let subject = format!("position#{}", i);
                self.non_empty(&subject, "position", &p.position)
                    && self.reference(&subject, "politician", &p.politician)
                    && p.municipality
                        .as_ref()
                        .map_or(true, |m| self.reference(&subject, "municipality", m))
            })
            .map(|(_, p)| p.clone())
            .collect();

        let registrations = batch
            .registrations
            .iter()
            .enumerate()
            .filter(|(i, r)| {
                let subject = format!("registration#{}", i);
                r.registered_capital
                    .map_or(true, |c| self.amount(&subject, "registered_capital", c))
                    && self.reference(&subject, "contractor", &r.contractor)
            })
            .map(|(_, r)| r.clone())
            .collect();

        InputBatch {
            records,
            contracts,
            bids,
            subcontracts,
            donations,
            audits,
            ownerships,
            blacklist,
            positions,
            registrations,
        }
    }

    fn amount(&mut self, subject: &str, field: &str, amount: f64) -> bool {
        if amount.is_finite() && amount > 0.0 {
            return true;
        }
        self.skip(subject, field, &format!("Amount must be positive, got {}", amount));
        false
    }

    fn non_empty(&mut self, subject: &str, field: &str, value: &str) -> bool {
        if !value.trim().is_empty() {
            return true;
        }
        self.skip(subject, field, &format!("{} is empty", field));
        false
    }

    fn reference(&mut self, subject: &str, field: &str, entity_ref: &EntityRef) -> bool {
        if self.known.contains(entity_ref) {
            return true;
        }
        self.skip(subject, field, &format!("Unknown reference {}", entity_ref));
        false
    }

    fn skip(&mut self, subject: &str, field: &str, issue: &str) {
        debug!(subject, field, issue, "skipping fact");
        self.skipped += 1;
        self.issues.push(QualityIssue {
            subject: subject.to_string(),
            severity: IssueSeverity::Warning,
            field: field.to_string(),
            issue: issue.to_string(),
            recommendation: "Fix the fact at its source; it was skipped for this run".to_string(),
        });
    }
}

// ============================================================================
// BATCH SUMMARY
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total_records: usize,
    pub well_formed_count: usize,
    pub excluded_count: usize,
    pub needs_review_count: usize,
    pub skipped_fact_count: usize,
    pub average_quality: f64,
}

impl BatchSummary {
    pub fn summary(&self) -> String {
        format!(
            "{} records: {:.1}% quality | {} well-formed, {} excluded, {} need review | {} facts skipped",
            self.total_records,
            self.average_quality * 100.0,
            self.well_formed_count,
            self.excluded_count,
            self.needs_review_count,
            self.skipped_fact_count
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{BidFact, ContractFact, EntityKind};
    use chrono::NaiveDate;

    fn contractor(id: &str, name: &str) -> RawRecord {
        RawRecord::new(id, EntityKind::Contractor, name, "philgeps")
    }

    fn contract(reference: &str, agency: &str, awardee: &str, amount: f64) -> ContractFact {
        ContractFact {
            reference: reference.to_string(),
            agency: EntityRef::record(agency),
            awardee: Some(EntityRef::record(awardee)),
            title: "Road concreting".to_string(),
            amount,
            award_date: NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
            bid_count: None,
        }
    }

    #[test]
    fn test_validate_clean_record() {
        let engine = DataQualityEngine::new();
        let record = contractor("r1", "JC Reyes Construction").with_registration("PCAB-1234");

        let report = engine.validate_record(&record);

        assert!(report.is_well_formed());
        assert!(!report.needs_review);
        assert_eq!(report.issues.len(), 0);
        assert_eq!(report.overall_quality, 1.0);
    }

    #[test]
    fn test_missing_name_is_critical() {
        let engine = DataQualityEngine::new();
        let report = engine.validate_record(&contractor("r1", "  ... "));

        assert!(report.has_critical_issues());
        assert!(report.issues.iter().any(|i| i.field == "name"));
    }

    #[test]
    fn test_future_timestamp_warns() {
        let now = Utc::now();
        let engine = DataQualityEngine::new().at(now);
        let mut record = contractor("r1", "Mega Builders");
        record.retrieved_at = now + Duration::days(30);

        let report = engine.validate_record(&record);

        assert!(report.is_well_formed());
        assert!(report
            .issues
            .iter()
            .any(|i| i.field == "retrieved_at" && i.severity == IssueSeverity::Warning));
    }

    #[test]
    fn test_screen_excludes_malformed_and_duplicates() {
        let engine = DataQualityEngine::new();
        let batch = InputBatch {
            records: vec![
                contractor("r1", "Mega Builders"),
                contractor("r2", ""),
                contractor("r1", "Mega Builders Again"),
            ],
            ..Default::default()
        };

        let screened = engine.screen(&batch, &PriorIds::default());

        assert_eq!(screened.batch.records.len(), 1);
        assert_eq!(screened.excluded_records, vec!["r2", "r1"]);

        let summary = engine.batch_summary(&screened);
        assert_eq!(summary.total_records, 3);
        assert_eq!(summary.well_formed_count, 1);
        assert!(!summary.summary().is_empty());
    }

    #[test]
    fn test_screen_skips_dangling_and_non_positive_facts() {
        let engine = DataQualityEngine::new();
        let agency = RawRecord::new("a1", EntityKind::Agency, "DPWH Region VII", "philgeps");
        let batch = InputBatch {
            records: vec![agency, contractor("r1", "Mega Builders")],
            contracts: vec![
                contract("C-1", "a1", "r1", 1_000_000.0),
                contract("C-2", "a1", "ghost", 1_000_000.0),
                contract("C-3", "a1", "r1", 0.0),
            ],
            bids: vec![
                BidFact {
                    contract_ref: "C-1".to_string(),
                    bidder: EntityRef::record("r1"),
                    amount: 990_000.0,
                    won: true,
                },
                BidFact {
                    contract_ref: "C-2".to_string(),
                    bidder: EntityRef::record("r1"),
                    amount: 990_000.0,
                    won: true,
                },
            ],
            ..Default::default()
        };

        let screened = engine.screen(&batch, &PriorIds::default());

        assert_eq!(screened.batch.contracts.len(), 1);
        assert_eq!(screened.batch.contracts[0].reference, "C-1");
        assert_eq!(screened.batch.bids.len(), 1);
        assert_eq!(screened.skipped_facts, 3);
        assert_eq!(screened.warnings().len(), 3);
    }

    #[test]
    fn test_known_entity_refs_accepted() {
        let engine = DataQualityEngine::new();
        let known = PriorIds {
            entities: ["ent-0001".to_string(), "ent-0002".to_string()].into(),
            records: HashSet::new(),
        };
        let mut c = contract("C-1", "x", "y", 2_000_000.0);
        c.agency = EntityRef::entity("ent-0001");
        c.awardee = Some(EntityRef::entity("ent-0002"));
        let batch = InputBatch {
            contracts: vec![c],
            ..Default::default()
        };

        let screened = engine.screen(&batch, &known);

        assert_eq!(screened.batch.contracts.len(), 1);
        assert_eq!(screened.skipped_facts, 0);
    }
}
