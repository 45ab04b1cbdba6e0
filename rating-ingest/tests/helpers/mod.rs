//! Shared builders for rating-ingest integration tests

#![allow(dead_code)]

use rating_common::config::IngestSettings;
use rating_common::db::init_in_memory;
use rating_common::FactorId;
use rating_ingest::parser::HEADER_COLUMNS;
use rating_ingest::AppState;

/// Header line with every required column, comma separated
pub fn header_line() -> String {
    HEADER_COLUMNS
        .iter()
        .copied()
        .chain(FactorId::ALL.iter().map(|id| id.column()))
        .collect::<Vec<_>>()
        .join(",")
}

/// One data line: a valid header for `instrument` / `sequence`, all factors
/// zero except the given overrides
pub fn data_line(instrument: &str, sequence: u32, factors: &[(FactorId, &str)]) -> String {
    let sequence = sequence.to_string();
    let mut cells: Vec<String> = [
        "EQUITY",
        "ISSUER",
        instrument,
        "DIV-2024",
        "1500.25",
        "2024-05-15",
        sequence.as_str(),
        "2024",
        "1.0213",
        "false",
        "Interim dividend",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    for id in FactorId::ALL {
        let value = factors
            .iter()
            .find(|(factor, _)| *factor == id)
            .map(|(_, value)| value.to_string())
            .unwrap_or_else(|| "0".to_string());
        cells.push(value);
    }
    cells.join(",")
}

/// Full file from data lines
pub fn csv_file(lines: &[String]) -> String {
    let mut text = header_line();
    for line in lines {
        text.push('\n');
        text.push_str(line);
    }
    text.push('\n');
    text
}

/// The three-row upload: sum 1.1, excess precision, valid single factor
pub fn three_row_upload() -> String {
    csv_file(&[
        data_line("ROW-A", 1, &[(FactorId::F08, "0.5"), (FactorId::F09, "0.6")]),
        data_line("ROW-B", 2, &[(FactorId::F20, "1.000000001")]),
        data_line("ROW-C", 3, &[(FactorId::F37, "1.0")]),
    ])
}

pub fn test_settings() -> IngestSettings {
    IngestSettings {
        staging_ttl_secs: 600,
        results_ttl_secs: 600,
        commit_timeout_ms: 5_000,
        max_upload_bytes: 1024 * 1024,
        normalize_workers: 2,
    }
}

pub async fn test_state() -> AppState {
    test_state_with(test_settings()).await
}

pub async fn test_state_with(settings: IngestSettings) -> AppState {
    let pool = init_in_memory().await.expect("in-memory database");
    AppState::new(pool, settings)
}
