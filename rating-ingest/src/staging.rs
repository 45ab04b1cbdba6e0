//! Per-session staging of validated rows between preview and confirm
//!
//! A staged batch is serialized to JSON on `put` and deserialized on `take`,
//! so decimals travel as strings and come back bit-identical. `take` removes
//! the batch atomically: two confirms racing on one session see one batch
//! and one [`StagingError::Empty`].

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::normalizer::CandidateRow;

/// Validated rows awaiting confirmation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedBatch {
    pub batch_id: Uuid,
    pub staged_at: DateTime<Utc>,
    pub rows: Vec<CandidateRow>,
}

impl StagedBatch {
    pub fn new(rows: Vec<CandidateRow>) -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            staged_at: rating_common::time::now(),
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StagingError {
    #[error("no data to confirm, re-upload")]
    Empty,

    #[error("staged data expired, re-upload")]
    Expired,

    #[error("staged batch {actual} does not match requested batch {expected}")]
    Stale { expected: Uuid, actual: Uuid },

    #[error("staged data unreadable: {0}")]
    Corrupt(String),
}

/// Session-scoped holding area for one batch per session
pub trait StagingStore: Send + Sync {
    /// Stage a batch, replacing any batch already staged for the session
    fn put(&self, session: &str, batch: &StagedBatch) -> Result<Uuid, StagingError>;

    /// Remove and return the session's batch
    ///
    /// With `expected`, the staged batch must carry that id; on mismatch the
    /// batch stays staged.
    fn take(&self, session: &str, expected: Option<Uuid>) -> Result<StagedBatch, StagingError>;

    /// Read the session's batch without removing it
    fn peek(&self, session: &str) -> Result<StagedBatch, StagingError>;

    /// Drop the session's batch, if any
    fn discard(&self, session: &str) -> bool;

    /// Drop every expired batch, returning how many were dropped
    fn purge_expired(&self) -> usize;
}

struct Entry {
    batch_id: Uuid,
    payload: String,
    stored_at: Instant,
}

/// Process-local [`StagingStore`] with a time-to-live per batch
pub struct MemoryStagingStore {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStagingStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        // Entries stay consistent even if a holder panicked
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_expired(&self, entry: &Entry) -> bool {
        entry.stored_at.elapsed() >= self.ttl
    }

    fn decode(entry: &Entry) -> Result<StagedBatch, StagingError> {
        serde_json::from_str(&entry.payload).map_err(|e| StagingError::Corrupt(e.to_string()))
    }
}

impl StagingStore for MemoryStagingStore {
    fn put(&self, session: &str, batch: &StagedBatch) -> Result<Uuid, StagingError> {
        let payload = serde_json::to_string(batch).map_err(|e| StagingError::Corrupt(e.to_string()))?;

        let replaced = self.lock().insert(
            session.to_string(),
            Entry {
                batch_id: batch.batch_id,
                payload,
                stored_at: Instant::now(),
            },
        );

        debug!(
            session_id = %session,
            batch_id = %batch.batch_id,
            rows = batch.len(),
            replaced = replaced.is_some(),
            "Batch staged"
        );
        Ok(batch.batch_id)
    }

    fn take(&self, session: &str, expected: Option<Uuid>) -> Result<StagedBatch, StagingError> {
        let mut entries = self.lock();

        let entry = entries.get(session).ok_or(StagingError::Empty)?;
        if self.is_expired(entry) {
            entries.remove(session);
            return Err(StagingError::Expired);
        }
        if let Some(expected) = expected {
            if entry.batch_id != expected {
                return Err(StagingError::Stale {
                    expected,
                    actual: entry.batch_id,
                });
            }
        }

        let entry = entries.remove(session).ok_or(StagingError::Empty)?;
        drop(entries);

        let batch = Self::decode(&entry)?;
        debug!(session_id = %session, batch_id = %batch.batch_id, "Batch taken");
        Ok(batch)
    }

    fn peek(&self, session: &str) -> Result<StagedBatch, StagingError> {
        let entries = self.lock();
        let entry = entries.get(session).ok_or(StagingError::Empty)?;
        if self.is_expired(entry) {
            return Err(StagingError::Expired);
        }
        Self::decode(entry)
    }

    fn discard(&self, session: &str) -> bool {
        self.lock().remove(session).is_some()
    }

    fn purge_expired(&self) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| !self.is_expired(entry));
        let purged = before - entries.len();
        if purged > 0 {
            info!(purged, "Expired staged batches dropped");
        }
        purged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::HeaderFields;
    use rating_common::{FactorId, FactorSet};
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use std::sync::Arc;

    fn candidate(line: u64, f19a: &str) -> CandidateRow {
        let mut factors = FactorSet::zeroed();
        factors[FactorId::F19a] = rating_common::fixed::quantize(Decimal::from_str(f19a).unwrap());
        CandidateRow {
            line,
            header_id: None,
            header: HeaderFields {
                instrument: format!("INST-{}", line),
                ..HeaderFields::default()
            },
            factor_sum: factors.sum(),
            factors,
        }
    }

    fn store() -> MemoryStagingStore {
        MemoryStagingStore::new(Duration::from_secs(60))
    }

    #[test]
    fn test_round_trip_is_exact() {
        let store = store();
        let batch = StagedBatch::new(vec![candidate(2, "0.12345678"), candidate(3, "0.00000001")]);
        store.put("s1", &batch).unwrap();

        let back = store.take("s1", None).unwrap();
        assert_eq!(back, batch);
        assert_eq!(back.rows[0].factors[FactorId::F19a].to_string(), "0.12345678");
        assert_eq!(back.rows[1].factor_sum.to_string(), "0.00000001");
    }

    #[test]
    fn test_take_is_destructive() {
        let store = store();
        store.put("s1", &StagedBatch::new(vec![candidate(2, "0.5")])).unwrap();

        assert!(store.take("s1", None).is_ok());
        assert_eq!(store.take("s1", None).unwrap_err(), StagingError::Empty);
    }

    #[test]
    fn test_sessions_are_isolated() {
        let store = store();
        store.put("a", &StagedBatch::new(vec![candidate(2, "0.5")])).unwrap();

        assert_eq!(store.take("b", None).unwrap_err(), StagingError::Empty);
        assert!(store.peek("a").is_ok());
    }

    #[test]
    fn test_put_replaces_previous_batch() {
        let store = store();
        let first = StagedBatch::new(vec![candidate(2, "0.5")]);
        let second = StagedBatch::new(vec![candidate(9, "0.25")]);
        store.put("s1", &first).unwrap();
        store.put("s1", &second).unwrap();

        assert_eq!(store.take("s1", None).unwrap(), second);
    }

    #[test]
    fn test_stale_batch_id_keeps_batch_staged() {
        let store = store();
        let batch = StagedBatch::new(vec![candidate(2, "0.5")]);
        store.put("s1", &batch).unwrap();

        let other = Uuid::new_v4();
        let err = store.take("s1", Some(other)).unwrap_err();
        assert!(matches!(err, StagingError::Stale { expected, .. } if expected == other));

        assert_eq!(store.take("s1", Some(batch.batch_id)).unwrap(), batch);
    }

    #[test]
    fn test_expired_batch_cannot_be_taken() {
        let store = MemoryStagingStore::new(Duration::ZERO);
        store.put("s1", &StagedBatch::new(vec![candidate(2, "0.5")])).unwrap();

        assert_eq!(store.peek("s1").unwrap_err(), StagingError::Expired);
        assert_eq!(store.take("s1", None).unwrap_err(), StagingError::Expired);
        assert_eq!(store.take("s1", None).unwrap_err(), StagingError::Empty);
    }

    #[test]
    fn test_purge_expired() {
        let store = MemoryStagingStore::new(Duration::ZERO);
        store.put("a", &StagedBatch::new(vec![])).unwrap();
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.purge_expired(), 0);
    }

    #[test]
    fn test_concurrent_take_yields_one_batch() {
        let store = Arc::new(store());
        store.put("s1", &StagedBatch::new(vec![candidate(2, "0.5")])).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.take("s1", None).is_ok())
            })
            .collect();
        let taken = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(taken, 1);
    }
}
