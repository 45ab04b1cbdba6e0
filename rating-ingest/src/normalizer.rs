//! Row normalizer
//!
//! Splits each parsed row into raw header fields and thirty validated factor
//! values. A row either becomes a [`CandidateRow`] or yields exactly one
//! [`Rejection`] (the first failing factor, else the sum check). Header
//! fields are carried verbatim; they are only coerced at commit time.

use std::collections::BTreeMap;

use rating_common::{FactorId, FactorSet};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::parser::{Table, TableRow};
use crate::validator::{self, Rejection};

/// Raw header cells, exactly as uploaded
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderFields {
    pub market: String,
    pub origin: String,
    pub instrument: String,
    pub capital_event: String,
    pub historical_value: String,
    pub payment_date: String,
    pub event_sequence: String,
    pub fiscal_year: String,
    pub update_factor: String,
    pub is_future_settlement: String,
    pub entered_by_amounts: String,
    pub description: String,
}

impl HeaderFields {
    fn from_row(table: &Table, row: &TableRow) -> Self {
        let cell = |name: &str| table.cell(row, name).to_string();
        Self {
            market: cell("market"),
            origin: cell("origin"),
            instrument: cell("instrument"),
            capital_event: cell("capital_event"),
            historical_value: cell("historical_value"),
            payment_date: cell("payment_date"),
            event_sequence: cell("event_sequence"),
            fiscal_year: cell("fiscal_year"),
            update_factor: cell("update_factor"),
            is_future_settlement: cell("is_future_settlement"),
            entered_by_amounts: cell("entered_by_amounts"),
            description: cell("description"),
        }
    }
}

/// One unvalidated row: header cells plus factor cells keyed by column
///
/// Also the shape accepted for user-corrected rows on confirm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRow {
    pub line: u64,
    #[serde(default)]
    pub header_id: Option<String>,
    pub header: HeaderFields,
    pub factors: BTreeMap<String, String>,
    #[serde(default)]
    pub factor_note: String,
}

impl RawRow {
    pub fn from_table(table: &Table, row: &TableRow) -> Self {
        let header_id = Some(table.cell(row, "header_id").trim())
            .filter(|id| !id.is_empty())
            .map(str::to_string);

        let factors = FactorId::ALL
            .into_iter()
            .map(|id| (id.column().to_string(), table.cell(row, id.column()).to_string()))
            .collect();

        Self {
            line: row.line,
            header_id,
            header: HeaderFields::from_row(table, row),
            factors,
            factor_note: table.cell(row, "factor_note").to_string(),
        }
    }
}

/// A row whose factors passed validation, ready to stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRow {
    pub line: u64,
    pub header_id: Option<String>,
    pub header: HeaderFields,
    pub factors: FactorSet,
    #[serde(with = "rust_decimal::serde::str")]
    pub factor_sum: Decimal,
}

impl CandidateRow {
    /// All factors zero: the header will be flagged pending
    pub fn is_pending(&self) -> bool {
        self.factors.is_all_zero()
    }
}

/// Output of normalization: candidates and rejections, each in file order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Normalized {
    pub valid: Vec<CandidateRow>,
    pub rejections: Vec<Rejection>,
}

impl Normalized {
    fn collect(outcomes: impl IntoIterator<Item = Result<CandidateRow, Rejection>>) -> Self {
        let mut normalized = Normalized::default();
        for outcome in outcomes {
            match outcome {
                Ok(row) => normalized.valid.push(row),
                Err(rejection) => normalized.rejections.push(rejection),
            }
        }
        normalized
    }
}

/// Validate one raw row
///
/// Factors are checked in canonical order; the first failure wins. A factor
/// column absent from `raw.factors` is treated as an empty cell.
pub fn validate_row(raw: &RawRow) -> Result<CandidateRow, Rejection> {
    let mut factors = FactorSet::zeroed();
    for id in FactorId::ALL {
        let text = raw.factors.get(id.column()).map(String::as_str).unwrap_or("");
        factors[id] = validator::validate_factor(id, text, raw.line)?;
    }
    factors.note = raw.factor_note.trim().to_string();

    let factor_sum = validator::validate_row_sum(&factors, raw.line)?;

    Ok(CandidateRow {
        line: raw.line,
        header_id: raw.header_id.clone(),
        header: raw.header.clone(),
        factors,
        factor_sum,
    })
}

/// Normalize every row of a parsed table
pub fn normalize(table: &Table) -> Normalized {
    let normalized = Normalized::collect(
        table
            .rows
            .iter()
            .map(|row| validate_row(&RawRow::from_table(table, row))),
    );
    debug!(
        valid = normalized.valid.len(),
        rejected = normalized.rejections.len(),
        "Rows normalized"
    );
    normalized
}

/// Normalize already-extracted raw rows (user corrections on confirm)
pub fn normalize_raw(rows: &[RawRow]) -> Normalized {
    Normalized::collect(rows.iter().map(validate_row))
}

/// Build the row validation pool, or `None` to validate sequentially
///
/// Built once at startup and shared by every upload.
pub fn build_pool(workers: usize) -> Option<ThreadPool> {
    if workers <= 1 {
        return None;
    }
    match ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|index| format!("normalize-{}", index))
        .build()
    {
        Ok(pool) => Some(pool),
        Err(e) => {
            warn!(error = %e, workers, "Worker pool unavailable, validating sequentially");
            None
        }
    }
}

/// Normalize on `pool`; output order matches file order
///
/// Blocks the calling thread until every row is validated.
pub fn normalize_parallel(table: &Table, pool: &ThreadPool) -> Normalized {
    if table.len() < 2 {
        return normalize(table);
    }

    // Indexed parallel iterators collect in source order
    let outcomes: Vec<Result<CandidateRow, Rejection>> = pool.install(|| {
        table
            .rows
            .par_iter()
            .map(|row| validate_row(&RawRow::from_table(table, row)))
            .collect()
    });

    let normalized = Normalized::collect(outcomes);
    debug!(
        workers = pool.current_num_threads(),
        valid = normalized.valid.len(),
        rejected = normalized.rejections.len(),
        "Rows normalized in parallel"
    );
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{self, required_columns};
    use crate::validator::RejectionKind;

    fn upload(rows: &[Vec<(&str, &str)>]) -> Table {
        let columns: Vec<&str> = required_columns().chain(["header_id", "factor_note"]).collect();
        let mut text = columns.join(",");
        text.push('\n');
        for overrides in rows {
            let cells: Vec<String> = columns
                .iter()
                .map(|column| {
                    overrides
                        .iter()
                        .find(|(name, _)| name == column)
                        .map(|(_, value)| value.to_string())
                        .unwrap_or_else(|| match FactorId::from_column(column) {
                            Some(_) => "0".to_string(),
                            None if *column == "header_id" || *column == "factor_note" => String::new(),
                            None => "x".to_string(),
                        })
                })
                .collect();
            text.push_str(&cells.join(","));
            text.push('\n');
        }
        parser::parse(text.as_bytes(), None).unwrap()
    }

    #[test]
    fn test_valid_row_becomes_candidate() {
        let table = upload(&[vec![("f08", "0.5"), ("f20", "0.25"), ("header_id", " 12 "), ("factor_note", " note ")]]);
        let normalized = normalize(&table);

        assert!(normalized.rejections.is_empty());
        let row = &normalized.valid[0];
        assert_eq!(row.line, 2);
        assert_eq!(row.header_id.as_deref(), Some("12"));
        assert_eq!(row.header.market, "x");
        assert_eq!(row.factors[FactorId::F08].to_string(), "0.50000000");
        assert_eq!(row.factors.note, "note");
        assert_eq!(row.factor_sum.to_string(), "0.75000000");
        assert!(!row.is_pending());
    }

    #[test]
    fn test_first_failing_factor_is_reported() {
        let table = upload(&[vec![("f10", "abc"), ("f20", "1.000000001")]]);
        let normalized = normalize(&table);

        assert!(normalized.valid.is_empty());
        assert_eq!(normalized.rejections.len(), 1);
        assert_eq!(normalized.rejections[0].field, "f10");
        assert_eq!(normalized.rejections[0].kind, RejectionKind::NotNumeric);
    }

    #[test]
    fn test_sum_over_one_is_rejected_after_factors() {
        let table = upload(&[vec![("f08", "0.6"), ("f09", "0.6")]]);
        let normalized = normalize(&table);
        assert_eq!(normalized.rejections[0].kind, RejectionKind::SumOutOfRange);
    }

    #[test]
    fn test_all_zero_row_is_pending() {
        let table = upload(&[vec![]]);
        let normalized = normalize(&table);
        assert!(normalized.valid[0].is_pending());
        assert_eq!(normalized.valid[0].header_id, None);
    }

    #[test]
    fn test_missing_factor_key_in_raw_row_is_empty() {
        let table = upload(&[vec![]]);
        let mut raw = RawRow::from_table(&table, &table.rows[0]);
        raw.factors.remove("f33");

        let rejection = validate_row(&raw).unwrap_err();
        assert_eq!(rejection.field, "f33");
        assert_eq!(rejection.kind, RejectionKind::Empty);
    }

    #[test]
    fn test_parallel_matches_sequential_order() {
        let rows: Vec<Vec<(&str, &str)>> = (0..40)
            .map(|i| if i % 3 == 0 { vec![("f15", "2")] } else { vec![("f15", "0.1")] })
            .collect();
        let table = upload(&rows);

        let pool = build_pool(4).unwrap();

        let sequential = normalize(&table);
        let parallel = normalize_parallel(&table, &pool);
        assert_eq!(sequential, parallel);
        assert_eq!(parallel.rejections.len(), 14);
        assert!(parallel.valid.windows(2).all(|w| w[0].line < w[1].line));
    }

    #[test]
    fn test_single_worker_builds_no_pool() {
        assert!(build_pool(0).is_none());
        assert!(build_pool(1).is_none());
        assert_eq!(build_pool(3).unwrap().current_num_threads(), 3);
    }
}
