//! Header and factor set persistence
//!
//! Every operation takes a `&mut SqliteConnection` so the caller decides the
//! transaction scope: pass `&mut *tx` to run inside a transaction, or a pooled
//! connection to run standalone.

use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use crate::fixed;
use crate::models::{FactorId, FactorSet, FactorSetId, HeaderId, HeaderRecord, Market, NewHeader, Origin};
use crate::time;
use crate::{Error, Result};

/// Insert a header; `pending` starts false until factors are written
pub async fn create_header(conn: &mut SqliteConnection, header: &NewHeader) -> Result<HeaderId> {
    let now = time::now().to_rfc3339();

    let result = sqlx::query(
        r#"
        INSERT INTO rating_headers (
            market, origin, instrument, capital_event, historical_value,
            payment_date, event_sequence, fiscal_year, update_factor,
            is_future_settlement, entered_by_amounts, description,
            pending, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
        "#,
    )
    .bind(header.market.as_str())
    .bind(header.origin.map(|o| o.as_str()).unwrap_or(""))
    .bind(&header.instrument)
    .bind(&header.capital_event)
    .bind(fixed::to_fixed_string(header.historical_value))
    .bind(header.payment_date.format("%Y-%m-%d").to_string())
    .bind(header.event_sequence as i64)
    .bind(header.fiscal_year as i64)
    .bind(fixed::to_fixed_string(header.update_factor))
    .bind(header.is_future_settlement)
    .bind(header.entered_by_amounts)
    .bind(&header.description)
    .bind(&now)
    .bind(&now)
    .execute(&mut *conn)
    .await?;

    Ok(HeaderId(result.last_insert_rowid()))
}

/// Overwrite all editable fields of an existing header
pub async fn update_header(conn: &mut SqliteConnection, id: HeaderId, header: &NewHeader) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE rating_headers SET
            market = ?, origin = ?, instrument = ?, capital_event = ?,
            historical_value = ?, payment_date = ?, event_sequence = ?,
            fiscal_year = ?, update_factor = ?, is_future_settlement = ?,
            entered_by_amounts = ?, description = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(header.market.as_str())
    .bind(header.origin.map(|o| o.as_str()).unwrap_or(""))
    .bind(&header.instrument)
    .bind(&header.capital_event)
    .bind(fixed::to_fixed_string(header.historical_value))
    .bind(header.payment_date.format("%Y-%m-%d").to_string())
    .bind(header.event_sequence as i64)
    .bind(header.fiscal_year as i64)
    .bind(fixed::to_fixed_string(header.update_factor))
    .bind(header.is_future_settlement)
    .bind(header.entered_by_amounts)
    .bind(&header.description)
    .bind(time::now().to_rfc3339())
    .bind(id.0)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("header {}", id)));
    }

    Ok(())
}

/// Return the header's factor set id, creating an all-zero set if absent
pub async fn create_or_get_factor_set(conn: &mut SqliteConnection, header_id: HeaderId) -> Result<FactorSetId> {
    sqlx::query("INSERT INTO rating_factor_sets (header_id) VALUES (?) ON CONFLICT(header_id) DO NOTHING")
        .bind(header_id.0)
        .execute(&mut *conn)
        .await?;

    let id: i64 = sqlx::query_scalar("SELECT id FROM rating_factor_sets WHERE header_id = ?")
        .bind(header_id.0)
        .fetch_one(&mut *conn)
        .await?;

    Ok(FactorSetId(id))
}

/// Write all thirty factors and the note
pub async fn update_factor_set(conn: &mut SqliteConnection, id: FactorSetId, factors: &FactorSet) -> Result<()> {
    let mut query = sqlx::query(update_factor_set_sql());
    for (_, value) in factors.iter() {
        query = query.bind(fixed::to_fixed_string(value));
    }

    let result = query
        .bind(&factors.note)
        .bind(id.0)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("factor set {}", id)));
    }

    Ok(())
}

/// Persist the derived pending flag
pub async fn set_pending(conn: &mut SqliteConnection, id: HeaderId, pending: bool) -> Result<()> {
    let result = sqlx::query("UPDATE rating_headers SET pending = ? WHERE id = ?")
        .bind(pending)
        .bind(id.0)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("header {}", id)));
    }

    Ok(())
}

/// Delete a header; its factor set goes with it
pub async fn delete_header(conn: &mut SqliteConnection, id: HeaderId) -> Result<bool> {
    let result = sqlx::query("DELETE FROM rating_headers WHERE id = ?")
        .bind(id.0)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn load_header(conn: &mut SqliteConnection, id: HeaderId) -> Result<Option<HeaderRecord>> {
    let row = sqlx::query(
        r#"
        SELECT id, market, origin, instrument, capital_event, historical_value,
               payment_date, event_sequence, fiscal_year, update_factor,
               is_future_settlement, entered_by_amounts, description,
               pending, created_at, updated_at
        FROM rating_headers
        WHERE id = ?
        "#,
    )
    .bind(id.0)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(|row| header_from_row(&row)).transpose()
}

pub async fn load_factor_set(conn: &mut SqliteConnection, header_id: HeaderId) -> Result<Option<FactorSet>> {
    let row = sqlx::query("SELECT * FROM rating_factor_sets WHERE header_id = ?")
        .bind(header_id.0)
        .fetch_optional(&mut *conn)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let mut set = FactorSet::zeroed();
    for id in FactorId::ALL {
        let text: String = row.try_get(id.column())?;
        set[id] = parse_stored_decimal(id.column(), &text)?;
    }
    set.note = row.try_get("factor_note")?;

    Ok(Some(set))
}

pub async fn count_headers(conn: &mut SqliteConnection) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM rating_headers")
        .fetch_one(&mut *conn)
        .await?;
    Ok(count)
}

fn update_factor_set_sql() -> &'static str {
    static SQL: OnceLock<String> = OnceLock::new();
    SQL.get_or_init(|| {
        let assignments: Vec<String> = FactorId::ALL
            .iter()
            .map(|id| format!("{} = ?", id.column()))
            .collect();
        format!(
            "UPDATE rating_factor_sets SET {}, factor_note = ? WHERE id = ?",
            assignments.join(", ")
        )
    })
}

fn header_from_row(row: &SqliteRow) -> Result<HeaderRecord> {
    let market: String = row.try_get("market")?;
    let origin: String = row.try_get("origin")?;
    let payment_date: String = row.try_get("payment_date")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    let fields = NewHeader {
        market: Market::from_str(&market).map_err(Error::Internal)?,
        origin: Origin::parse_optional(&origin).map_err(Error::Internal)?,
        instrument: row.try_get("instrument")?,
        capital_event: row.try_get("capital_event")?,
        historical_value: parse_stored_decimal("historical_value", &row.try_get::<String, _>("historical_value")?)?,
        payment_date: NaiveDate::parse_from_str(&payment_date, "%Y-%m-%d")
            .map_err(|e| Error::Internal(format!("Failed to parse payment_date: {}", e)))?,
        event_sequence: row.try_get::<i64, _>("event_sequence")? as u32,
        fiscal_year: row.try_get::<i64, _>("fiscal_year")? as u32,
        update_factor: parse_stored_decimal("update_factor", &row.try_get::<String, _>("update_factor")?)?,
        is_future_settlement: row.try_get("is_future_settlement")?,
        entered_by_amounts: row.try_get("entered_by_amounts")?,
        description: row.try_get("description")?,
    };

    Ok(HeaderRecord {
        id: HeaderId(row.try_get("id")?),
        fields,
        pending: row.try_get("pending")?,
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}

fn parse_stored_decimal(column: &str, text: &str) -> Result<Decimal> {
    Decimal::from_str_exact(text)
        .map_err(|e| Error::Internal(format!("Failed to parse {} '{}': {}", column, text, e)))
}

fn parse_timestamp(column: &str, text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
}
