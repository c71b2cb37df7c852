// 🗄️ Graph Store - SQLite adapter
//
// Everything a run produces is written in ONE transaction: canonical entities
// are upserted, previous edges/flags/metrics are replaced, new review pairs
// are queued and an audit event is appended. If any statement fails the
// transaction rolls back and the previously committed state is untouched.

use crate::analytics::{ConcentrationReport, DynastyReport};
use crate::entities::CanonicalEntity;
use crate::error::StoreError;
use crate::records::EntityKind;
use crate::red_flags::RedFlag;
use crate::relationships::DerivedEdge;
use crate::resolution::review::{pair_key, ReviewFeedback, ReviewStatus};
use crate::resolution::MergeDecision;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

// ============================================================================
// TYPES
// ============================================================================

/// Everything one run hands to the store
#[derive(Debug, Clone, Copy)]
pub struct RunCommit<'a> {
    pub run_id: &'a str,
    pub entities: &'a [CanonicalEntity],
    pub edges: &'a [DerivedEdge],
    pub flags: &'a [RedFlag],
    pub concentration: &'a [ConcentrationReport],
    pub dynasties: &'a [DynastyReport],
    pub review_queue: &'a [MergeDecision],
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSummary {
    pub entities: usize,
    pub edges: usize,
    pub flags: usize,
    pub concentration: usize,
    pub dynasties: usize,
    /// Pairs newly queued (already-known pairs are not re-queued)
    pub queued_reviews: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewItem {
    pub left: String,
    pub right: String,
    pub kind: EntityKind,
    pub left_name: String,
    pub right_name: String,
    pub score: f64,
    pub status: ReviewStatus,
    pub enqueued_at: DateTime<Utc>,
    pub reviewer: Option<String>,
}

/// Event for the audit trail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(event_type: &str, entity_type: &str, entity_id: &str, data: serde_json::Value, actor: &str) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

// ============================================================================
// STORE TRAIT
// ============================================================================

pub trait GraphStore {
    /// Atomically replace the derived state with this run's output
    fn commit_run(&mut self, run: &RunCommit<'_>) -> Result<CommitSummary, StoreError>;

    fn pending_reviews(&self) -> Result<Vec<ReviewItem>, StoreError>;

    /// Queue pairs not seen before; returns how many were new
    fn enqueue_reviews(&mut self, decisions: &[MergeDecision]) -> Result<usize, StoreError>;

    fn adjudicate(&mut self, a: &str, b: &str, status: ReviewStatus, reviewer: &str) -> Result<(), StoreError>;

    /// Confirmed and rejected pairs, for the next resolver run
    fn review_feedback(&self) -> Result<ReviewFeedback, StoreError>;

    /// Live (not merged away) entities from previous runs
    fn load_entities(&self) -> Result<Vec<CanonicalEntity>, StoreError>;
}

// ============================================================================
// SQLITE
// ============================================================================

pub struct SqliteGraphStore {
    conn: Connection,
}

impl SqliteGraphStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        setup_database(&conn)?;
        Ok(SqliteGraphStore { conn })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        setup_database(&conn)?;
        Ok(SqliteGraphStore { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn count(&self, table: &str) -> Result<i64, StoreError> {
        let sql = match table {
            "entities" | "derived_edges" | "red_flags" | "agency_concentration" | "dynasty_scores"
            | "review_queue" | "events" => format!("SELECT COUNT(*) FROM {}", table),
            _ => return Ok(0),
        };
        Ok(self.conn.query_row(&sql, [], |row| row.get(0))?)
    }

    pub fn events_for(&self, entity_type: &str, entity_id: &str) -> Result<Vec<Event>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
             FROM events
             WHERE entity_type = ?1 AND entity_id = ?2
             ORDER BY id DESC",
        )?;

        let events = stmt
            .query_map(params![entity_type, entity_id], |row| {
                let timestamp: String = row.get(1)?;
                let data: String = row.get(5)?;
                Ok(Event {
                    event_id: row.get(0)?,
                    timestamp: parse_time(1, &timestamp)?,
                    event_type: row.get(2)?,
                    entity_type: row.get(3)?,
                    entity_id: row.get(4)?,
                    data: parse_json(5, &data)?,
                    actor: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(events)
    }
}

pub fn setup_database(conn: &Connection) -> Result<(), StoreError> {
    // WAL for crash recovery; in-memory databases silently keep "memory"
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS entities (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            display_name TEXT NOT NULL,
            data TEXT NOT NULL,
            merged_into TEXT,
            run_id TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS derived_edges (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            edge_type TEXT NOT NULL,
            source TEXT NOT NULL,
            target TEXT NOT NULL,
            evidence TEXT NOT NULL,
            run_id TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS red_flags (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            flag_type TEXT NOT NULL,
            severity TEXT NOT NULL,
            subject TEXT NOT NULL,
            description TEXT NOT NULL,
            evidence TEXT NOT NULL,
            detected_at TEXT NOT NULL,
            run_id TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS agency_concentration (
            agency TEXT PRIMARY KEY,
            hhi REAL,
            total_value REAL NOT NULL,
            contract_count INTEGER NOT NULL,
            top_contractor TEXT,
            top_share REAL,
            data TEXT NOT NULL,
            run_id TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS dynasty_scores (
            family TEXT PRIMARY KEY,
            score REAL NOT NULL,
            positions_held INTEGER NOT NULL,
            municipalities_governed INTEGER NOT NULL,
            contractor_links INTEGER NOT NULL,
            data TEXT NOT NULL,
            run_id TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS review_queue (
            left_id TEXT NOT NULL,
            right_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            left_name TEXT NOT NULL,
            right_name TEXT NOT NULL,
            score REAL NOT NULL,
            status TEXT NOT NULL,
            reviewer TEXT,
            enqueued_at TEXT NOT NULL,
            decided_at TEXT,
            PRIMARY KEY (left_id, right_id)
        );

        CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_edges_source ON derived_edges(source);
        CREATE INDEX IF NOT EXISTS idx_edges_target ON derived_edges(target);
        CREATE INDEX IF NOT EXISTS idx_flags_type ON red_flags(flag_type);
        CREATE INDEX IF NOT EXISTS idx_review_status ON review_queue(status);
        CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id);",
    )?;

    Ok(())
}

fn insert_event(conn: &Connection, event: &Event) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO events (event_id, timestamp, event_type, entity_type, entity_id, data, actor)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            serde_json::to_string(&event.data)?,
            event.actor,
        ],
    )?;
    Ok(())
}

fn queue_reviews(conn: &Connection, decisions: &[MergeDecision], now: DateTime<Utc>) -> Result<usize, StoreError> {
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO review_queue (
            left_id, right_id, kind, left_name, right_name, score, status, enqueued_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?;

    let mut queued = 0;
    for d in decisions {
        let (left, right) = pair_key(&d.left, &d.right);
        let (left_name, right_name) = if left == d.left {
            (&d.left_name, &d.right_name)
        } else {
            (&d.right_name, &d.left_name)
        };
        queued += stmt.execute(params![
            left,
            right,
            d.kind.as_str(),
            left_name,
            right_name,
            d.score,
            ReviewStatus::Pending.as_str(),
            now.to_rfc3339(),
        ])?;
    }
    Ok(queued)
}

impl GraphStore for SqliteGraphStore {
    fn commit_run(&mut self, run: &RunCommit<'_>) -> Result<CommitSummary, StoreError> {
        let now = Utc::now();
        let stamp = now.to_rfc3339();
        let tx = self.conn.transaction()?;

        {
            let mut upsert = tx.prepare(
                "INSERT INTO entities (id, kind, display_name, data, merged_into, run_id, updated_at)
                 VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    kind = excluded.kind,
                    display_name = excluded.display_name,
                    data = excluded.data,
                    merged_into = NULL,
                    run_id = excluded.run_id,
                    updated_at = excluded.updated_at",
            )?;
            let mut retire = tx.prepare("UPDATE entities SET merged_into = ?1, updated_at = ?2 WHERE id = ?3")?;

            for entity in run.entities {
                upsert.execute(params![
                    entity.id,
                    entity.kind.as_str(),
                    entity.display_name,
                    serde_json::to_string(entity)?,
                    run.run_id,
                    stamp,
                ])?;
                for retired in &entity.merged_from {
                    retire.execute(params![entity.id, stamp, retired])?;
                }
            }
        }

        tx.execute("DELETE FROM derived_edges", [])?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO derived_edges (edge_type, source, target, evidence, run_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for edge in run.edges {
                insert.execute(params![
                    edge.edge_type.as_str(),
                    edge.source,
                    edge.target,
                    serde_json::to_string(&edge.evidence)?,
                    run.run_id,
                ])?;
            }
        }

        tx.execute("DELETE FROM red_flags", [])?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO red_flags (flag_type, severity, subject, description, evidence, detected_at, run_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for flag in run.flags {
                insert.execute(params![
                    flag.flag_type.as_str(),
                    flag.severity.as_str(),
                    serde_json::to_string(&flag.subject)?,
                    flag.description,
                    flag.evidence_json,
                    flag.detected_at.to_rfc3339(),
                    run.run_id,
                ])?;
            }
        }

        tx.execute("DELETE FROM agency_concentration", [])?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO agency_concentration (
                    agency, hhi, total_value, contract_count, top_contractor, top_share, data, run_id
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for report in run.concentration {
                let top = report.top_contractor();
                insert.execute(params![
                    report.agency,
                    report.hhi,
                    report.total_value,
                    report.contract_count as i64,
                    top.map(|t| t.contractor.as_str()),
                    top.map(|t| t.share),
                    serde_json::to_string(report)?,
                    run.run_id,
                ])?;
            }
        }

        tx.execute("DELETE FROM dynasty_scores", [])?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO dynasty_scores (
                    family, score, positions_held, municipalities_governed, contractor_links, data, run_id
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for report in run.dynasties {
                insert.execute(params![
                    report.family,
                    report.score,
                    report.positions_held as i64,
                    report.municipalities_governed as i64,
                    report.contractor_links as i64,
                    serde_json::to_string(report)?,
                    run.run_id,
                ])?;
            }
        }

        let queued_reviews = queue_reviews(&tx, run.review_queue, now)?;

        let summary = CommitSummary {
            entities: run.entities.len(),
            edges: run.edges.len(),
            flags: run.flags.len(),
            concentration: run.concentration.len(),
            dynasties: run.dynasties.len(),
            queued_reviews,
        };
        insert_event(
            &tx,
            &Event::new("run_committed", "run", run.run_id, serde_json::to_value(&summary)?, "pipeline"),
        )?;

        tx.commit()?;
        info!(run_id = run.run_id, entities = summary.entities, flags = summary.flags, "run committed");
        Ok(summary)
    }

    fn pending_reviews(&self) -> Result<Vec<ReviewItem>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT left_id, right_id, kind, left_name, right_name, score, status, enqueued_at, reviewer
             FROM review_queue
             WHERE status = ?1
             ORDER BY score DESC, left_id, right_id",
        )?;

        let items = stmt
            .query_map(params![ReviewStatus::Pending.as_str()], |row| {
                let kind: String = row.get(2)?;
                let status: String = row.get(6)?;
                let enqueued_at: String = row.get(7)?;
                Ok(ReviewItem {
                    left: row.get(0)?,
                    right: row.get(1)?,
                    kind: EntityKind::parse(&kind).ok_or_else(|| bad_value(2, &kind))?,
                    left_name: row.get(3)?,
                    right_name: row.get(4)?,
                    score: row.get(5)?,
                    status: ReviewStatus::parse(&status).ok_or_else(|| bad_value(6, &status))?,
                    enqueued_at: parse_time(7, &enqueued_at)?,
                    reviewer: row.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(items)
    }

    fn enqueue_reviews(&mut self, decisions: &[MergeDecision]) -> Result<usize, StoreError> {
        queue_reviews(&self.conn, decisions, Utc::now())
    }

    fn adjudicate(&mut self, a: &str, b: &str, status: ReviewStatus, reviewer: &str) -> Result<(), StoreError> {
        let (left, right) = pair_key(a, b);
        let tx = self.conn.transaction()?;

        let updated = tx.execute(
            "UPDATE review_queue SET status = ?1, reviewer = ?2, decided_at = ?3
             WHERE left_id = ?4 AND right_id = ?5",
            params![status.as_str(), reviewer, Utc::now().to_rfc3339(), left, right],
        )?;
        if updated == 0 {
            return Err(StoreError::ReviewNotFound { left, right });
        }

        insert_event(
            &tx,
            &Event::new(
                "review_adjudicated",
                "review_pair",
                &format!("{}|{}", left, right),
                serde_json::json!({ "status": status.as_str() }),
                reviewer,
            ),
        )?;
        tx.commit()?;
        Ok(())
    }

    fn review_feedback(&self) -> Result<ReviewFeedback, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT left_id, right_id, status FROM review_queue WHERE status != ?1")?;
        let rows = stmt
            .query_map(params![ReviewStatus::Pending.as_str()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut feedback = ReviewFeedback::new();
        for (left, right, status) in rows {
            if let Some(status) = ReviewStatus::parse(&status) {
                feedback.record(&left, &right, status);
            }
        }
        Ok(feedback)
    }

    fn load_entities(&self) -> Result<Vec<CanonicalEntity>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT data FROM entities WHERE merged_into IS NULL ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        rows.iter()
            .map(|data| serde_json::from_str(data).map_err(StoreError::from))
            .collect()
    }
}

/// Existing review status for a pair, if queued
pub fn review_status(store: &SqliteGraphStore, a: &str, b: &str) -> Result<Option<ReviewStatus>, StoreError> {
    let (left, right) = pair_key(a, b);
    let status: Option<String> = store
        .conn
        .query_row(
            "SELECT status FROM review_queue WHERE left_id = ?1 AND right_id = ?2",
            params![left, right],
            |row| row.get(0),
        )
        .optional()?;
    Ok(status.as_deref().and_then(ReviewStatus::parse))
}

fn bad_value(column: usize, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Text,
        format!("unexpected value {:?}", value).into(),
    )
}

fn parse_time(column: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e)))
}

fn parse_json(column: usize, raw: &str) -> rusqlite::Result<serde_json::Value> {
    serde_json::from_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e)))
}

// ============================================================================
// TESTS
// ============================================================================
