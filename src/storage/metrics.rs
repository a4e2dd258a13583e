//! SQLite store for cycle performance records.
//!
//! Uses runtime queries (no compile-time checking) against a single-table
//! schema created on connect. Timestamps are stored as RFC 3339 text.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::debug;

use crate::engine::accountant::CycleRecord;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS scan_cycles (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        cycle_number  INTEGER NOT NULL,
        started_at    TEXT    NOT NULL,
        duration_ms   INTEGER NOT NULL,
        attempted     INTEGER NOT NULL,
        succeeded     INTEGER NOT NULL,
        failed        INTEGER NOT NULL,
        skipped       INTEGER NOT NULL,
        opportunities INTEGER NOT NULL,
        error         TEXT
    )
"#;

#[derive(Clone)]
pub struct MetricsStore {
    pool: SqlitePool,
}

impl MetricsStore {
    /// Connect to `database_url` (e.g. `sqlite://volscan.db?mode=rwc` or
    /// `sqlite::memory:`) and ensure the schema exists.
    pub async fn connect(database_url: &str) -> Result<Self> {
        // One connection: an in-memory database is private to its connection
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await
            .with_context(|| format!("Failed to open metrics database {database_url}"))?;

        sqlx::query(SCHEMA)
            .execute(&pool)
            .await
            .context("Failed to create scan_cycles table")?;

        Ok(Self { pool })
    }

    pub async fn record_cycle(&self, record: &CycleRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO scan_cycles (
                cycle_number, started_at, duration_ms, attempted, succeeded,
                failed, skipped, opportunities, error
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.cycle_number as i64)
        .bind(record.started_at.to_rfc3339())
        .bind(record.duration_ms as i64)
        .bind(record.attempted as i64)
        .bind(record.succeeded as i64)
        .bind(record.failed as i64)
        .bind(record.skipped as i64)
        .bind(record.opportunities as i64)
        .bind(record.error.as_deref())
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to insert cycle {}", record.cycle_number))?;

        debug!(cycle = record.cycle_number, "Cycle record persisted");
        Ok(())
    }

    /// Most recent `limit` records, newest first.
    pub async fn recent_cycles(&self, limit: usize) -> Result<Vec<CycleRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT cycle_number, started_at, duration_ms, attempted, succeeded,
                   failed, skipped, opportunities, error
            FROM scan_cycles
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query scan_cycles")?;

        rows.iter()
            .map(|row| {
                let started: String = row.try_get("started_at")?;
                let started_at = DateTime::parse_from_rfc3339(&started)
                    .with_context(|| format!("Bad started_at value {started:?}"))?
                    .with_timezone(&Utc);
                Ok(CycleRecord {
                    cycle_number: row.try_get::<i64, _>("cycle_number")? as u64,
                    started_at,
                    duration_ms: row.try_get::<i64, _>("duration_ms")? as u64,
                    attempted: row.try_get::<i64, _>("attempted")? as usize,
                    succeeded: row.try_get::<i64, _>("succeeded")? as usize,
                    failed: row.try_get::<i64, _>("failed")? as usize,
                    skipped: row.try_get::<i64, _>("skipped")? as usize,
                    opportunities: row.try_get::<i64, _>("opportunities")? as usize,
                    error: row.try_get("error")?,
                })
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
