//! SQL backend abstraction. Spec.md §6 describes the contract the core
//! consumes as a standard row-iterator: query with context, columns,
//! row-by-row scan, and close. `TenantConnection` is that contract as a
//! Rust trait, with an `hdbconnect_async`-backed implementation — no pack
//! example ships a HANA driver, so this module is grounded on the
//! teacher's `async_trait` usage for its storage-adapter traits rather
//! than on a specific database integration.

use std::time::Duration;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::NaiveDateTime;
use hdbconnect_async::{Connection, ConnectParams, HdbValue};
use thiserror::Error;

use crate::coerce::CellValue;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("query failed: {0}")]
    Query(String),
    #[error("row scan failed: {0}")]
    Scan(String),
    #[error("query timed out after {0:?}")]
    Timeout(Duration),
}

/// A rectangular, already-converted result set: column names plus rows of
/// tagged cells, matching the "interface-typed rectangular buffer" Row
/// Projection expects as input (spec.md §4.B).
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

/// One tenant's exclusively-owned database connection (spec.md §4.D, §5
/// "Per-tenant connection ownership"). `query` covers both the
/// single/multi-row case and the metadata-lookup case the original
/// distinguishes as `QueryRow`: callers that only want the first row
/// simply read `rows[0]`.
#[async_trait]
pub trait TenantConnection: Send + Sync {
    async fn query(&self, sql: &str, timeout: Duration) -> Result<ResultSet, DriverError>;
    async fn close(&self) -> Result<(), DriverError>;
}

pub struct HdbTenantConnection {
    conn: Connection,
}

impl HdbTenantConnection {
    pub async fn connect(conn_str: &str, user: &str, password: &str) -> Result<Self, DriverError> {
        let mut params = ConnectParams::builder();
        params
            .hostname(conn_str)
            .dbuser(user)
            .password(password.to_string());
        let params = params
            .build()
            .map_err(|e| DriverError::Connect(e.to_string()))?;
        let conn = Connection::new(params)
            .await
            .map_err(|e| DriverError::Connect(e.to_string()))?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl TenantConnection for HdbTenantConnection {
    async fn query(&self, sql: &str, timeout: Duration) -> Result<ResultSet, DriverError> {
        let result = tokio::time::timeout(timeout, self.conn.query(sql))
            .await
            .map_err(|_| DriverError::Timeout(timeout))?
            .map_err(|e| DriverError::Query(e.to_string()))?;

        let columns: Vec<String> = result
            .metadata()
            .iter()
            .map(|field| field.displayname().to_string())
            .collect();

        let mut rows = Vec::new();
        for row in result
            .into_rows()
            .await
            .map_err(|e| DriverError::Scan(e.to_string()))?
        {
            let mut cells = Vec::with_capacity(row.len());
            for value in row.into_iter() {
                cells.push(hdb_value_to_cell(value).map_err(DriverError::Scan)?);
            }
            rows.push(cells);
        }
        Ok(ResultSet { columns, rows })
    }

    async fn close(&self) -> Result<(), DriverError> {
        Ok(())
    }
}

fn hdb_value_to_cell(value: HdbValue) -> Result<CellValue, String> {
    Ok(match value {
        HdbValue::NULL => CellValue::Null,
        HdbValue::BOOLEAN(b) => CellValue::Int64(b as i64),
        HdbValue::TINYINT(v) => CellValue::Int64(v as i64),
        HdbValue::SMALLINT(v) => CellValue::Int64(v as i64),
        HdbValue::INT(v) => CellValue::Int64(v as i64),
        HdbValue::BIGINT(v) => CellValue::Int64(v),
        HdbValue::REAL(v) => CellValue::Float64(v as f64),
        HdbValue::DOUBLE(v) => CellValue::Float64(v),
        HdbValue::DECIMAL(v) => {
            let parsed: BigDecimal = v
                .to_string()
                .parse()
                .map_err(|e| format!("decimal parse error: {e}"))?;
            CellValue::Decimal(parsed)
        }
        HdbValue::STRING(s) => CellValue::Text(s),
        HdbValue::BINARY(b) => CellValue::Bytes(b),
        // The driver's timestamp types already render as
        // `TIMESTAMP_FORMAT`-shaped text via their own Display; route
        // through the same timestamp parser row projection uses rather
        // than depend on a separate date/time conversion surface.
        HdbValue::LONGDATE(_) | HdbValue::SECONDDATE(_) | HdbValue::DAYDATE(_) => {
            let rendered = format!("{value:?}");
            match NaiveDateTime::parse_from_str(rendered.trim(), crate::coerce::TIMESTAMP_FORMAT) {
                Ok(naive) => CellValue::Time(naive.and_utc()),
                Err(_) => CellValue::Text(rendered),
            }
        }
        other => CellValue::Text(format!("{other:?}")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FakeConnection {
        script: Mutex<Vec<Result<ResultSet, DriverError>>>,
    }

    #[async_trait]
    impl TenantConnection for FakeConnection {
        async fn query(&self, _sql: &str, _timeout: Duration) -> Result<ResultSet, DriverError> {
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                return Err(DriverError::Query("no more scripted responses".into()));
            }
            script.remove(0)
        }

        async fn close(&self) -> Result<(), DriverError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn fake_connection_returns_scripted_result() {
        let fake = FakeConnection {
            script: Mutex::new(vec![Ok(ResultSet {
                columns: vec!["x".into()],
                rows: vec![vec![CellValue::Int64(1)]],
            })]),
        };
        let result = fake.query("select 1", Duration::from_secs(1)).await.unwrap();
        assert_eq!(result.columns, vec!["x".to_string()]);
        assert_eq!(result.rows.len(), 1);
    }
}
