//! Commit engine
//!
//! Persists staged rows one at a time. Each row is an independent unit: its
//! header, factor set and pending flag are written inside one transaction,
//! and a failure rolls back that row only. Rows are attempted in order and a
//! failed row never stops the rest of the batch.

pub mod coerce;

use std::time::Duration;

use rating_common::db::ratings;
use rating_common::HeaderId;
use serde::{Deserialize, Serialize};
use sqlx::{Connection, SqliteConnection, SqlitePool};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::normalizer::CandidateRow;
use coerce::CoercionError;

/// Whether rows create new headers or overwrite existing ones
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitMode {
    /// Create a header per row; any `header_id` is ignored
    Insert,
    /// Overwrite the header named by each row's `header_id`
    Update,
}

/// Why one row was not committed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RowFailureKind {
    #[error("{field}: {message}")]
    Coercion { field: String, message: String },

    #[error("constraint violation: {message}")]
    Constraint { message: String },

    #[error("not found: {message}")]
    NotFound { message: String },

    #[error("timed out after {after_ms} ms")]
    Timeout { after_ms: u64 },

    #[error("database error: {message}")]
    Database { message: String },
}

impl From<CoercionError> for RowFailureKind {
    fn from(err: CoercionError) -> Self {
        RowFailureKind::Coercion {
            field: err.field.to_string(),
            message: err.message,
        }
    }
}

impl From<rating_common::Error> for RowFailureKind {
    fn from(err: rating_common::Error) -> Self {
        if err.is_constraint_violation() {
            return RowFailureKind::Constraint {
                message: database_message(&err),
            };
        }
        match err {
            rating_common::Error::NotFound(message) => RowFailureKind::NotFound { message },
            other => RowFailureKind::Database {
                message: database_message(&other),
            },
        }
    }
}

impl From<sqlx::Error> for RowFailureKind {
    fn from(err: sqlx::Error) -> Self {
        RowFailureKind::from(rating_common::Error::from(err))
    }
}

/// Driver message without the wrapping error chain
fn database_message(err: &rating_common::Error) -> String {
    match err {
        rating_common::Error::Database(sqlx::Error::Database(db_err)) => db_err.message().to_string(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowFailure {
    /// 0-based position in the committed batch
    pub row_index: usize,
    /// Source line of the row in the uploaded file
    pub line: u64,
    pub reason: RowFailureKind,
}

/// Outcome of one commit call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReport {
    pub mode: CommitMode,
    pub ok_count: usize,
    pub committed: Vec<HeaderId>,
    pub failures: Vec<RowFailure>,
}

impl CommitReport {
    pub fn attempted(&self) -> usize {
        self.ok_count + self.failures.len()
    }
}

/// Batch-level failure: nothing was committed
#[derive(Debug, Error)]
pub enum CommitError {
    #[error("database unavailable: {0}")]
    Unavailable(String),
}

/// Writes candidate rows to the rating store
#[derive(Clone)]
pub struct CommitEngine {
    pool: SqlitePool,
    row_timeout: Duration,
}

impl CommitEngine {
    pub fn new(pool: SqlitePool, row_timeout: Duration) -> Self {
        Self { pool, row_timeout }
    }

    /// Commit every row in order, one transaction per row
    pub async fn commit(&self, rows: &[CandidateRow], mode: CommitMode) -> Result<CommitReport, CommitError> {
        let mut conn = match tokio::time::timeout(self.row_timeout, self.pool.acquire()).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => return Err(CommitError::Unavailable(e.to_string())),
            Err(_) => {
                return Err(CommitError::Unavailable(format!(
                    "no connection within {} ms",
                    self.row_timeout.as_millis()
                )))
            }
        };

        let mut report = CommitReport {
            mode,
            ok_count: 0,
            committed: Vec::with_capacity(rows.len()),
            failures: Vec::new(),
        };

        for (row_index, row) in rows.iter().enumerate() {
            let outcome = match tokio::time::timeout(self.row_timeout, commit_row(&mut conn, row, mode)).await {
                Ok(result) => result,
                Err(_) => Err(RowFailureKind::Timeout {
                    after_ms: self.row_timeout.as_millis() as u64,
                }),
            };

            match outcome {
                Ok(header_id) => {
                    debug!(row_index, line = row.line, header_id = %header_id, "Row committed");
                    report.ok_count += 1;
                    report.committed.push(header_id);
                }
                Err(reason) => {
                    warn!(row_index, line = row.line, error = %reason, "Row commit failed");
                    report.failures.push(RowFailure {
                        row_index,
                        line: row.line,
                        reason,
                    });
                }
            }
        }

        info!(
            mode = ?mode,
            attempted = report.attempted(),
            committed = report.ok_count,
            failed = report.failures.len(),
            "Commit finished"
        );
        Ok(report)
    }
}

async fn commit_row(conn: &mut SqliteConnection, row: &CandidateRow, mode: CommitMode) -> Result<HeaderId, RowFailureKind> {
    let header = coerce::coerce_header(&row.header)?;
    coerce::check_note(&row.factors.note)?;
    let target = match mode {
        CommitMode::Insert => None,
        CommitMode::Update => Some(coerce::coerce_header_id(row.header_id.as_deref())?),
    };

    let mut tx = conn.begin().await?;

    let header_id = match target {
        None => ratings::create_header(&mut *tx, &header).await?,
        Some(id) => {
            ratings::update_header(&mut *tx, id, &header).await?;
            id
        }
    };

    let factor_set_id = ratings::create_or_get_factor_set(&mut *tx, header_id).await?;
    ratings::update_factor_set(&mut *tx, factor_set_id, &row.factors).await?;
    ratings::set_pending(&mut *tx, header_id, row.is_pending()).await?;

    tx.commit().await?;
    Ok(header_id)
}
