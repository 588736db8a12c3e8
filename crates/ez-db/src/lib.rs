//! Storage layer for exclusion zone runs.
//!
//! Persists each segmentation run, its final segments and the records it rejected
//! using `rusqlite`.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! A `Database` can be moved between threads but not shared without a `Mutex`.
//!
//! # Schema
//!
//! ## Timestamp Format
//!
//! Run creation times are stored as TEXT in RFC 3339 with millisecond precision
//! (e.g., `2024-01-15T10:30:00.000Z`). Segment bounds are calendar dates stored as
//! `YYYY-MM-DD`, so lexicographic order matches chronological order for both.
//!
//! ## Label Storage
//!
//! The `labels` column of `segments` holds the label set as a JSON array in
//! canonical (lexicographic) order, e.g. `["BUFFER_AFTER","CORE"]`.

use std::path::Path;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use ez_core::{CanonicalSegment, LabelSet, PipelineStats, RegionSettings, RejectedRecord, SubjectId};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Failed to encode or decode a JSON column.
    #[error("invalid JSON column: {0}")]
    Json(#[from] serde_json::Error),
    /// A stored segment could not be turned back into a [`CanonicalSegment`].
    #[error("invalid stored segment in run {run_id}: {message}")]
    InvalidSegment { run_id: String, message: String },
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

/// What a run consumed and produced, prior to storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRun {
    /// Where the episodes were read from, if a file.
    pub input: Option<String>,
    pub episodes_read: usize,
    pub duplicates: usize,
    pub settings: RegionSettings,
    pub stats: PipelineStats,
}

/// A stored run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub id: String,
    pub created_at: String,
    pub input: Option<String>,
    pub episodes_read: usize,
    pub rejected: usize,
    pub duplicates: usize,
    pub stays: usize,
    pub qualifying_stays: usize,
    pub segments: usize,
    pub subjects: usize,
    pub settings: RegionSettings,
}

/// A stored rejected record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredRejection {
    pub record: usize,
    pub subject: Option<String>,
    pub reason: String,
}

const RUN_COLUMNS: &str = "
    id, created_at, input, episodes_read, rejected, duplicates,
    stays, qualifying_stays, segment_count, subject_count, settings
";

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                input TEXT,
                episodes_read INTEGER NOT NULL,
                rejected INTEGER NOT NULL,
                duplicates INTEGER NOT NULL,
                stays INTEGER NOT NULL,
                qualifying_stays INTEGER NOT NULL,
                segment_count INTEGER NOT NULL,
                subject_count INTEGER NOT NULL,
                settings TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_runs_created ON runs(created_at);

            -- Final segments; start/end are YYYY-MM-DD, [start, end)
            CREATE TABLE IF NOT EXISTS segments (
                run_id TEXT NOT NULL,
                subject TEXT NOT NULL,
                start TEXT NOT NULL,
                end TEXT NOT NULL,
                labels TEXT NOT NULL,
                PRIMARY KEY (run_id, subject, start),
                FOREIGN KEY (run_id) REFERENCES runs(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS rejected_records (
                run_id TEXT NOT NULL,
                record INTEGER NOT NULL,
                subject TEXT,
                reason TEXT NOT NULL,
                FOREIGN KEY (run_id) REFERENCES runs(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_rejected_run ON rejected_records(run_id);
            ",
        )?;
        Ok(())
    }

    /// Stores a run with its segments and rejected records in one transaction.
    pub fn record_run(
        &mut self,
        run: &NewRun,
        segments: &[CanonicalSegment<NaiveDate>],
        rejected: &[RejectedRecord],
    ) -> Result<RunSummary, DbError> {
        self.record_run_at(run, segments, rejected, Utc::now())
    }

    fn record_run_at(
        &mut self,
        run: &NewRun,
        segments: &[CanonicalSegment<NaiveDate>],
        rejected: &[RejectedRecord],
        now: DateTime<Utc>,
    ) -> Result<RunSummary, DbError> {
        let summary = RunSummary {
            id: Uuid::new_v4().to_string(),
            created_at: format_timestamp(now),
            input: run.input.clone(),
            episodes_read: run.episodes_read,
            rejected: rejected.len(),
            duplicates: run.duplicates,
            stays: run.stats.stays,
            qualifying_stays: run.stats.qualifying_stays,
            segments: segments.len(),
            subjects: run.stats.subjects,
            settings: run.settings,
        };
        let settings = serde_json::to_string(&summary.settings)?;

        let tx = self.conn.transaction()?;
        tx.execute(
            &format!("INSERT INTO runs ({RUN_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"),
            params![
                summary.id,
                summary.created_at,
                summary.input,
                summary.episodes_read,
                summary.rejected,
                summary.duplicates,
                summary.stays,
                summary.qualifying_stays,
                summary.segments,
                summary.subjects,
                settings,
            ],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO segments (run_id, subject, start, end, labels) VALUES (?, ?, ?, ?, ?)",
            )?;
            for segment in segments {
                stmt.execute(params![
                    summary.id,
                    segment.subject.as_str(),
                    segment.start.format(DATE_FORMAT).to_string(),
                    segment.end.format(DATE_FORMAT).to_string(),
                    serde_json::to_string(&segment.labels)?,
                ])?;
            }

            let mut stmt = tx.prepare(
                "INSERT INTO rejected_records (run_id, record, subject, reason) VALUES (?, ?, ?, ?)",
            )?;
            for record in rejected {
                stmt.execute(params![
                    summary.id,
                    record.record,
                    record.subject,
                    record.reason.to_string(),
                ])?;
            }
        }
        tx.commit()?;

        tracing::info!(
            run_id = %summary.id,
            segments = summary.segments,
            rejected = summary.rejected,
            "recorded run"
        );
        Ok(summary)
    }

    /// Lists all runs, oldest first.
    pub fn list_runs(&self) -> Result<Vec<RunSummary>, DbError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {RUN_COLUMNS} FROM runs ORDER BY created_at ASC, rowid ASC"))?;
        let rows = stmt.query_map([], |row| Ok(run_from_row(row)))?;
        let mut runs = Vec::new();
        for row in rows {
            runs.push(row??);
        }
        Ok(runs)
    }

    /// Fetches a run by ID.
    pub fn get_run(&self, id: &str) -> Result<Option<RunSummary>, DbError> {
        let run = self
            .conn
            .query_row(
                &format!("SELECT {RUN_COLUMNS} FROM runs WHERE id = ?"),
                [id],
                |row| Ok(run_from_row(row)),
            )
            .optional()?;
        run.transpose()
    }

    /// Fetches the most recently recorded run.
    pub fn latest_run(&self) -> Result<Option<RunSummary>, DbError> {
        let run = self
            .conn
            .query_row(
                &format!("SELECT {RUN_COLUMNS} FROM runs ORDER BY created_at DESC, rowid DESC LIMIT 1"),
                [],
                |row| Ok(run_from_row(row)),
            )
            .optional()?;
        run.transpose()
    }

    /// Loads the final segments of a run, ordered by subject then start.
    pub fn segments_for_run(&self, run_id: &str) -> Result<Vec<CanonicalSegment<NaiveDate>>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT subject, start, end, labels
            FROM segments
            WHERE run_id = ?
            ORDER BY subject ASC, start ASC
            ",
        )?;
        let rows = stmt.query_map([run_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let invalid = |message: String| DbError::InvalidSegment {
            run_id: run_id.to_string(),
            message,
        };
        let mut segments = Vec::new();
        for row in rows {
            let (subject, start, end, labels) = row?;
            let subject = SubjectId::new(subject).map_err(|e| invalid(e.to_string()))?;
            let start = parse_date(&start).map_err(&invalid)?;
            let end = parse_date(&end).map_err(&invalid)?;
            let labels: LabelSet = serde_json::from_str(&labels)?;
            segments.push(CanonicalSegment {
                subject,
                start,
                end,
                labels,
            });
        }
        Ok(segments)
    }

    /// Loads the records a run rejected, in input order.
    pub fn rejected_for_run(&self, run_id: &str) -> Result<Vec<StoredRejection>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT record, subject, reason
            FROM rejected_records
            WHERE run_id = ?
            ORDER BY record ASC
            ",
        )?;
        let rows = stmt.query_map([run_id], |row| {
            Ok(StoredRejection {
                record: row.get(0)?,
                subject: row.get(1)?,
                reason: row.get(2)?,
            })
        })?;
        let mut rejected = Vec::new();
        for row in rows {
            rejected.push(row?);
        }
        Ok(rejected)
    }
}

fn run_from_row(row: &Row<'_>) -> Result<RunSummary, DbError> {
    let settings: String = row.get(10)?;
    Ok(RunSummary {
        id: row.get(0)?,
        created_at: row.get(1)?,
        input: row.get(2)?,
        episodes_read: row.get(3)?,
        rejected: row.get(4)?,
        duplicates: row.get(5)?,
        stays: row.get(6)?,
        qualifying_stays: row.get(7)?,
        segments: row.get(8)?,
        subjects: row.get(9)?,
        settings: serde_json::from_str(&settings)?,
    })
}

fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|e| format!("bad date {value}: {e}"))
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}
