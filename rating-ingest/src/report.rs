//! User-facing reports for uploads and commits

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::commit::{CommitMode, CommitReport};
use crate::normalizer::CandidateRow;
use crate::parser::Encoding;
use crate::staging::StagedBatch;
use crate::validator::Rejection;
use rating_common::HeaderId;

/// What an upload produced: staged rows plus rejected lines
#[derive(Debug, Clone, Serialize)]
pub struct UploadPreview {
    /// Staged batch to confirm; absent when no row passed validation
    pub batch_id: Option<Uuid>,
    pub encoding: Encoding,
    pub valid_count: usize,
    pub rejected_count: usize,
    pub rejections: Vec<Rejection>,
    pub rows: Vec<CandidateRow>,
}

impl UploadPreview {
    pub fn new(batch: Option<&StagedBatch>, encoding: Encoding, rejections: Vec<Rejection>) -> Self {
        let rows = batch.map(|b| b.rows.clone()).unwrap_or_default();
        Self {
            batch_id: batch.map(|b| b.batch_id),
            encoding,
            valid_count: rows.len(),
            rejected_count: rejections.len(),
            rejections,
            rows,
        }
    }
}

/// One uncommitted row, as shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureLine {
    /// Position in the committed batch; absent for rows rejected on re-validation
    pub row_index: Option<usize>,
    pub line: u64,
    pub reason: String,
}

/// Outcome of a confirm, kept per session for the results view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSummary {
    pub mode: CommitMode,
    pub succeeded: usize,
    pub failed: usize,
    pub committed: Vec<HeaderId>,
    pub failures: Vec<FailureLine>,
}

impl CommitSummary {
    pub fn is_complete_success(&self) -> bool {
        self.failed == 0
    }

    /// Failure list as CSV (`row_index,line,reason`)
    pub fn to_csv(&self) -> anyhow::Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(["row_index", "line", "reason"])?;
        for failure in &self.failures {
            let row_index = failure.row_index.map(|i| i.to_string()).unwrap_or_default();
            writer.write_record([row_index, failure.line.to_string(), failure.reason.clone()])?;
        }
        let bytes = writer.into_inner().map_err(|e| e.into_error())?;
        Ok(String::from_utf8(bytes)?)
    }
}

/// Summarize a commit; rows rejected while re-validating corrections come first
pub fn report(commit: &CommitReport, rejections: &[Rejection]) -> CommitSummary {
    let mut failures: Vec<FailureLine> = rejections
        .iter()
        .map(|rejection| FailureLine {
            row_index: None,
            line: rejection.line,
            reason: rejection.to_string(),
        })
        .collect();

    failures.extend(commit.failures.iter().map(|failure| FailureLine {
        row_index: Some(failure.row_index),
        line: failure.line,
        reason: failure.reason.to_string(),
    }));

    CommitSummary {
        mode: commit.mode,
        succeeded: commit.ok_count,
        failed: failures.len(),
        committed: commit.committed.clone(),
        failures,
    }
}

/// Last commit summary per session, dropped after a time-to-live
pub struct SummaryStore {
    ttl: Duration,
    entries: RwLock<HashMap<String, (Instant, CommitSummary)>>,
}

impl SummaryStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Record a session's summary; expired summaries of every session go first
    pub async fn insert(&self, session: &str, summary: CommitSummary) {
        let ttl = self.ttl;
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, (stored_at, _)| stored_at.elapsed() < ttl);
        let purged = before - entries.len();
        if purged > 0 {
            debug!(purged, "Expired commit summaries dropped");
        }
        entries.insert(session.to_string(), (Instant::now(), summary));
    }

    /// The session's summary, unless missing or expired
    pub async fn get(&self, session: &str) -> Option<CommitSummary> {
        let entries = self.entries.read().await;
        entries
            .get(session)
            .filter(|(stored_at, _)| stored_at.elapsed() < self.ttl)
            .map(|(_, summary)| summary.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::{RowFailure, RowFailureKind};
    use crate::validator::RejectionKind;

    fn sample_report() -> CommitReport {
        CommitReport {
            mode: CommitMode::Insert,
            ok_count: 2,
            committed: vec![HeaderId(1), HeaderId(2)],
            failures: vec![RowFailure {
                row_index: 2,
                line: 4,
                reason: RowFailureKind::Constraint {
                    message: "UNIQUE constraint failed: rating_headers.market".to_string(),
                },
            }],
        }
    }

    #[test]
    fn test_report_counts() {
        let summary = report(&sample_report(), &[]);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert!(!summary.is_complete_success());
        assert_eq!(summary.failures[0].row_index, Some(2));
        assert_eq!(summary.failures[0].line, 4);
        assert!(summary.failures[0].reason.starts_with("constraint violation"));
    }

    #[test]
    fn test_rejections_are_listed_before_commit_failures() {
        let rejection = Rejection {
            line: 7,
            field: "f20".to_string(),
            kind: RejectionKind::OutOfRange,
            value: Some("2".to_string()),
        };
        let summary = report(&sample_report(), &[rejection]);

        assert_eq!(summary.failed, 2);
        assert_eq!(summary.failures[0].row_index, None);
        assert_eq!(summary.failures[0].reason, "line 7: f20 out of range ('2')");
    }

    #[test]
    fn test_csv_export_quotes_reasons() {
        let mut summary = report(&sample_report(), &[]);
        summary.failures[0].reason = "a, b".to_string();

        let csv = summary.to_csv().unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("row_index,line,reason"));
        assert_eq!(lines.next(), Some("2,4,\"a, b\""));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_clean_commit_is_complete_success() {
        let commit = CommitReport {
            mode: CommitMode::Update,
            ok_count: 1,
            committed: vec![HeaderId(5)],
            failures: vec![],
        };
        let summary = report(&commit, &[]);
        assert!(summary.is_complete_success());
        assert_eq!(summary.to_csv().unwrap(), "row_index,line,reason\n");
    }

    #[tokio::test]
    async fn test_summary_store_keeps_latest_per_session() {
        let store = SummaryStore::new(Duration::from_secs(60));
        let first = report(&sample_report(), &[]);
        let mut second = first.clone();
        second.mode = CommitMode::Update;

        store.insert("s1", first).await;
        store.insert("s1", second.clone()).await;

        assert_eq!(store.get("s1").await, Some(second));
        assert_eq!(store.get("s2").await, None);
        assert_eq!(store.entries.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_expired_summaries_are_hidden_and_purged() {
        let store = SummaryStore::new(Duration::ZERO);
        store.insert("a", report(&sample_report(), &[])).await;
        assert_eq!(store.get("a").await, None);

        store.insert("b", report(&sample_report(), &[])).await;
        assert_eq!(store.entries.read().await.len(), 1);
    }
}
