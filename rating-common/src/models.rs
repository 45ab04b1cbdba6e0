//! Rating domain model
//!
//! A [`HeaderRecord`] describes one capital/tax event for an instrument and
//! owns exactly one [`FactorSet`]: thirty proportional factors addressed by
//! [`FactorId`].

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Index, IndexMut};
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use crate::fixed;

// ========================================
// Identifiers
// ========================================

/// Primary key of a persisted header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HeaderId(pub i64);

impl fmt::Display for HeaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for HeaderId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(HeaderId)
    }
}

/// Primary key of a persisted factor set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactorSetId(pub i64);

impl fmt::Display for FactorSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ========================================
// Enumerations
// ========================================

/// Market the event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Market {
    Equity,
    Bond,
    Fund,
    Ac,
    Bc,
}

impl Market {
    pub fn as_str(&self) -> &'static str {
        match self {
            Market::Equity => "EQUITY",
            Market::Bond => "BOND",
            Market::Fund => "FUND",
            Market::Ac => "AC",
            Market::Bc => "BC",
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Market {
    type Err = String;

    /// Case-insensitive; the legacy Spanish labels are accepted as aliases
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EQUITY" | "ACCIONES" => Ok(Market::Equity),
            "BOND" | "BONOS" => Ok(Market::Bond),
            "FUND" | "FONDOS" => Ok(Market::Fund),
            "AC" => Ok(Market::Ac),
            "BC" => Ok(Market::Bc),
            other => Err(format!("unknown market '{}'", other)),
        }
    }
}

/// Party that reported the event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Origin {
    Broker,
    Depositary,
    Issuer,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Broker => "BROKER",
            Origin::Depositary => "DEPOSITARY",
            Origin::Issuer => "ISSUER",
        }
    }

    /// Parse an optional origin: blank input means "no origin"
    pub fn parse_optional(s: &str) -> Result<Option<Self>, String> {
        if s.trim().is_empty() {
            Ok(None)
        } else {
            s.parse().map(Some)
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Origin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BROKER" | "CORREDOR" => Ok(Origin::Broker),
            "DEPOSITARY" | "DEPOSITARIO" => Ok(Origin::Depositary),
            "ISSUER" | "EMISOR" => Ok(Origin::Issuer),
            other => Err(format!("unknown origin '{}'", other)),
        }
    }
}

// ========================================
// Factors
// ========================================

/// Canonical identifier of each of the thirty factors
///
/// Declaration order is the canonical order (08..18, 19a, 20..37); it is
/// also the index into [`FactorSet`] storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FactorId {
    F08,
    F09,
    F10,
    F11,
    F12,
    F13,
    F14,
    F15,
    F16,
    F17,
    F18,
    F19a,
    F20,
    F21,
    F22,
    F23,
    F24,
    F25,
    F26,
    F27,
    F28,
    F29,
    F30,
    F31,
    F32,
    F33,
    F34,
    F35,
    F36,
    F37,
}

impl FactorId {
    pub const COUNT: usize = 30;

    pub const ALL: [FactorId; FactorId::COUNT] = [
        FactorId::F08,
        FactorId::F09,
        FactorId::F10,
        FactorId::F11,
        FactorId::F12,
        FactorId::F13,
        FactorId::F14,
        FactorId::F15,
        FactorId::F16,
        FactorId::F17,
        FactorId::F18,
        FactorId::F19a,
        FactorId::F20,
        FactorId::F21,
        FactorId::F22,
        FactorId::F23,
        FactorId::F24,
        FactorId::F25,
        FactorId::F26,
        FactorId::F27,
        FactorId::F28,
        FactorId::F29,
        FactorId::F30,
        FactorId::F31,
        FactorId::F32,
        FactorId::F33,
        FactorId::F34,
        FactorId::F35,
        FactorId::F36,
        FactorId::F37,
    ];

    /// Position in canonical order
    pub const fn index(self) -> usize {
        self as usize
    }

    /// CSV / database column name (`f08`, `f19a`, ...)
    pub const fn column(self) -> &'static str {
        match self {
            FactorId::F08 => "f08",
            FactorId::F09 => "f09",
            FactorId::F10 => "f10",
            FactorId::F11 => "f11",
            FactorId::F12 => "f12",
            FactorId::F13 => "f13",
            FactorId::F14 => "f14",
            FactorId::F15 => "f15",
            FactorId::F16 => "f16",
            FactorId::F17 => "f17",
            FactorId::F18 => "f18",
            FactorId::F19a => "f19a",
            FactorId::F20 => "f20",
            FactorId::F21 => "f21",
            FactorId::F22 => "f22",
            FactorId::F23 => "f23",
            FactorId::F24 => "f24",
            FactorId::F25 => "f25",
            FactorId::F26 => "f26",
            FactorId::F27 => "f27",
            FactorId::F28 => "f28",
            FactorId::F29 => "f29",
            FactorId::F30 => "f30",
            FactorId::F31 => "f31",
            FactorId::F32 => "f32",
            FactorId::F33 => "f33",
            FactorId::F34 => "f34",
            FactorId::F35 => "f35",
            FactorId::F36 => "f36",
            FactorId::F37 => "f37",
        }
    }

    /// Human label as printed on the tax form (`08`, `19a`, ...)
    pub fn label(self) -> &'static str {
        &self.column()[1..]
    }

    /// Look up a factor by column name (case-insensitive, trimmed)
    pub fn from_column(name: &str) -> Option<Self> {
        let wanted = name.trim().to_ascii_lowercase();
        FactorId::ALL.into_iter().find(|id| id.column() == wanted)
    }
}

impl fmt::Display for FactorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// The thirty factors of one header, plus the free-text note
///
/// Serializes as a flat map of column name to canonical decimal string
/// (`{"f08": "0.50000000", ..., "note": ""}`) so that values survive any
/// JSON-based transport without touching a float.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactorSet {
    values: [Decimal; FactorId::COUNT],
    pub note: String,
}

impl Default for FactorSet {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl FactorSet {
    /// All factors `0.00000000`, empty note
    pub fn zeroed() -> Self {
        Self {
            values: [fixed::zero(); FactorId::COUNT],
            note: String::new(),
        }
    }

    /// Iterate factors in canonical order
    pub fn iter(&self) -> impl Iterator<Item = (FactorId, Decimal)> + '_ {
        FactorId::ALL.into_iter().map(move |id| (id, self.values[id.index()]))
    }

    /// Exact sum of all thirty factors, quantized
    pub fn sum(&self) -> Decimal {
        fixed::quantize(self.values.iter().copied().sum())
    }

    /// True when every factor is zero (the header is pending)
    pub fn is_all_zero(&self) -> bool {
        self.values.iter().all(|v| v.is_zero())
    }
}

impl Index<FactorId> for FactorSet {
    type Output = Decimal;

    fn index(&self, id: FactorId) -> &Decimal {
        &self.values[id.index()]
    }
}

impl IndexMut<FactorId> for FactorSet {
    fn index_mut(&mut self, id: FactorId) -> &mut Decimal {
        &mut self.values[id.index()]
    }
}

impl Serialize for FactorSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(FactorId::COUNT + 1))?;
        for (id, value) in self.iter() {
            map.serialize_entry(id.column(), &fixed::to_fixed_string(value))?;
        }
        map.serialize_entry("note", &self.note)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for FactorSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut raw = BTreeMap::<String, String>::deserialize(deserializer)?;
        let mut set = FactorSet::zeroed();
        set.note = raw.remove("note").unwrap_or_default();

        for id in FactorId::ALL {
            let text = raw
                .remove(id.column())
                .ok_or_else(|| de::Error::missing_field(id.column()))?;
            set[id] = Decimal::from_str_exact(&text)
                .map_err(|e| de::Error::custom(format!("{}: {}", id.column(), e)))?;
        }

        if let Some(extra) = raw.keys().next() {
            return Err(de::Error::custom(format!("unexpected factor key '{}'", extra)));
        }

        Ok(set)
    }
}

// ========================================
// Headers
// ========================================

/// Typed header fields ready to be written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewHeader {
    pub market: Market,
    pub origin: Option<Origin>,
    pub instrument: String,
    pub capital_event: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub historical_value: Decimal,
    pub payment_date: NaiveDate,
    pub event_sequence: u32,
    pub fiscal_year: u32,
    #[serde(with = "rust_decimal::serde::str")]
    pub update_factor: Decimal,
    pub is_future_settlement: bool,
    pub entered_by_amounts: bool,
    pub description: String,
}

/// A persisted header as read back from storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderRecord {
    pub id: HeaderId,
    #[serde(flatten)]
    pub fields: NewHeader,
    pub pending: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Display for HeaderRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} · {} · {}",
            self.fields.fiscal_year, self.fields.instrument, self.fields.payment_date
        )
    }
}
