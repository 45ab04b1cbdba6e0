//! Tabular parser for uploaded rating files
//!
//! Turns raw upload bytes into a [`Table`]: named columns plus data rows that
//! remember their physical line in the file. Decoding tries the declared
//! encoding first, then UTF-8, then Latin-1, and stops at the first attempt
//! whose header carries every required column. The field delimiter is sniffed
//! from the header line (comma, semicolon or tab).

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use rating_common::FactorId;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// Header columns every upload must carry
pub const HEADER_COLUMNS: [&str; 11] = [
    "market",
    "origin",
    "instrument",
    "capital_event",
    "historical_value",
    "payment_date",
    "event_sequence",
    "fiscal_year",
    "update_factor",
    "is_future_settlement",
    "description",
];

/// Columns read when present, defaulted when absent
pub const OPTIONAL_COLUMNS: [&str; 3] = ["header_id", "entered_by_amounts", "factor_note"];

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
const DELIMITERS: [u8; 3] = [b',', b';', b'\t'];

/// Every required column in canonical order: header fields, then factors
pub fn required_columns() -> impl Iterator<Item = &'static str> {
    HEADER_COLUMNS
        .into_iter()
        .chain(FactorId::ALL.into_iter().map(FactorId::column))
}

/// Character encodings the parser can decode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Encoding {
    Utf8,
    Latin1,
}

impl Encoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Utf8 => "utf-8",
            Encoding::Latin1 => "latin-1",
        }
    }

    /// Decode bytes, or `None` when they are not valid in this encoding
    ///
    /// A leading UTF-8 byte order mark is dropped for both encodings.
    pub fn decode(&self, bytes: &[u8]) -> Option<String> {
        let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
        match self {
            Encoding::Utf8 => std::str::from_utf8(body).ok().map(str::to_owned),
            // Latin-1 maps every byte to the code point of the same value
            Encoding::Latin1 => Some(body.iter().map(|&b| char::from(b)).collect()),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Encoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "utf-8" | "utf8" | "utf-8-sig" => Ok(Encoding::Utf8),
            // windows-1252 differs from Latin-1 in 0x80-0x9F and is not accepted
            "latin-1" | "latin1" | "iso-8859-1" | "iso8859-1" => Ok(Encoding::Latin1),
            other => Err(format!("unsupported encoding '{}'", other)),
        }
    }
}

/// Upload could not be turned into a table
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("file is empty")]
    Empty,

    #[error("file could not be decoded with any supported encoding")]
    Undecodable,

    #[error("missing columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("malformed file at line {line}: {message}")]
    Malformed { line: u64, message: String },

    #[error("file exceeds the upload limit of {limit} bytes")]
    TooLarge { limit: usize },
}

/// One data row, cells in header order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    /// 1-based physical line in the file (header is line 1)
    pub line: u64,
    pub cells: Vec<String>,
}

/// Parsed upload: named columns plus rows
#[derive(Debug, Clone)]
pub struct Table {
    pub encoding: Encoding,
    pub delimiter: u8,
    pub columns: Vec<String>,
    index: HashMap<String, usize>,
    pub rows: Vec<TableRow>,
}

impl Table {
    fn new(encoding: Encoding, delimiter: u8, columns: Vec<String>, rows: Vec<TableRow>) -> Self {
        let mut index = HashMap::with_capacity(columns.len());
        for (position, name) in columns.iter().enumerate() {
            // First occurrence wins on duplicated column names
            index.entry(name.clone()).or_insert(position);
        }
        Self {
            encoding,
            delimiter,
            columns,
            index,
            rows,
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Cell text for a named column; missing columns and short rows read as ""
    pub fn cell<'a>(&self, row: &'a TableRow, name: &str) -> &'a str {
        self.column_index(name)
            .and_then(|i| row.cells.get(i))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Parse upload bytes into a table
///
/// `declared` is tried first when given. An attempt that decodes but lacks
/// required columns is remembered; if no attempt matches fully, the closest
/// attempt's missing columns are reported. When no attempt recognizes any
/// required column the file is reported as undecodable.
pub fn parse(bytes: &[u8], declared: Option<Encoding>) -> Result<Table, ParseError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(ParseError::Empty);
    }

    let mut attempts: Vec<Encoding> = declared.into_iter().collect();
    for fallback in [Encoding::Utf8, Encoding::Latin1] {
        if !attempts.contains(&fallback) {
            attempts.push(fallback);
        }
    }

    let required_count = required_columns().count();
    let mut closest: Option<Vec<String>> = None;

    for encoding in attempts {
        let Some(text) = encoding.decode(bytes) else {
            debug!(encoding = %encoding, "Upload is not valid in this encoding");
            continue;
        };

        match read_table(&text, encoding)? {
            Attempt::Matched(table) => {
                let optional: Vec<&str> = OPTIONAL_COLUMNS
                    .into_iter()
                    .filter(|name| table.has_column(name))
                    .collect();
                debug!(
                    encoding = %encoding,
                    delimiter = %char::from(table.delimiter),
                    optional = ?optional,
                    rows = table.len(),
                    "Upload parsed"
                );
                return Ok(table);
            }
            Attempt::Missing(missing) => {
                debug!(encoding = %encoding, missing = missing.len(), "Header incomplete");
                let recognized_any = missing.len() < required_count;
                let closer = closest.as_ref().map_or(true, |best| missing.len() < best.len());
                if recognized_any && closer {
                    closest = Some(missing);
                }
            }
        }
    }

    match closest {
        Some(missing) => Err(ParseError::MissingColumns(missing)),
        None => Err(ParseError::Undecodable),
    }
}

enum Attempt {
    Matched(Table),
    Missing(Vec<String>),
}

fn read_table(text: &str, encoding: Encoding) -> Result<Attempt, ParseError> {
    let delimiter = sniff_delimiter(text);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let columns: Vec<String> = match reader.headers() {
        Ok(header) => header.iter().map(normalize_column).collect(),
        Err(e) => {
            debug!(error = %e, "Header line unreadable");
            return Ok(Attempt::Missing(required_columns().map(str::to_string).collect()));
        }
    };

    let missing: Vec<String> = required_columns()
        .filter(|name| !columns.iter().any(|c| c == name))
        .map(str::to_string)
        .collect();
    if !missing.is_empty() {
        return Ok(Attempt::Missing(missing));
    }

    let mut rows = Vec::new();
    for (offset, record) in reader.records().enumerate() {
        let record = record.map_err(|e| ParseError::Malformed {
            line: e.position().map(|p| p.line()).unwrap_or(offset as u64 + 2),
            message: e.to_string(),
        })?;

        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }

        let line = record.position().map(|p| p.line()).unwrap_or(offset as u64 + 2);
        rows.push(TableRow {
            line,
            cells: record.iter().map(str::to_string).collect(),
        });
    }

    Ok(Attempt::Matched(Table::new(encoding, delimiter, columns, rows)))
}

fn normalize_column(name: &str) -> String {
    name.trim_start_matches('\u{feff}').trim().to_ascii_lowercase()
}

/// Pick the candidate delimiter occurring most often on the first line
fn sniff_delimiter(text: &str) -> u8 {
    let first_line = text.lines().next().unwrap_or("");
    let mut best = DELIMITERS[0];
    let mut best_count = 0;
    for candidate in DELIMITERS {
        let count = first_line.bytes().filter(|&b| b == candidate).count();
        if count > best_count {
            best = candidate;
            best_count = count;
        }
    }
    best
}
