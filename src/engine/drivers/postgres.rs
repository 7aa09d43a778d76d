//! PostgreSQL Driver
//!
//! Implements the driver capability for PostgreSQL using SQLx.
//!
//! ## Options
//!
//! - `ssl`: `true` requires TLS, `false` disables it; unset keeps the URI's `sslmode`.
//! - `application_name`: reported in `pg_stat_activity`.
//! - `connect_timeout`: seconds, enforced around the connect handshake.
//!
//! Any other text or numeric option is sent as a server runtime parameter.

use std::str::FromStr;
use std::time::Instant;

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgConnection, PgRow, PgSslMode, Postgres};
use sqlx::{Column, ConnectOptions, Connection, Row, TypeInfo};

use crate::engine::config::{
    ConnectionOptions, OptionValue, OPTION_APPLICATION_NAME, OPTION_CONNECT_TIMEOUT,
    OPTION_DRIVER, OPTION_SSL,
};
use crate::engine::drivers::{elapsed_ms, with_connect_timeout, Driver, DriverHandle};
use crate::engine::error::BoxError;
use crate::engine::sql_safety::returns_rows;
use crate::engine::types::{ColumnInfo, RawResult, Value};

/// PostgreSQL driver implementation
pub struct PostgresDriver;

impl PostgresDriver {
    pub fn new() -> Self {
        Self
    }

    /// Builds connect options from the URI plus recognized options
    fn connect_options(uri: &str, options: &ConnectionOptions) -> Result<PgConnectOptions, BoxError> {
        let mut connect = PgConnectOptions::from_str(uri)?;

        if let Some(ssl) = options.get(OPTION_SSL).and_then(OptionValue::as_bool) {
            connect = connect.ssl_mode(if ssl { PgSslMode::Require } else { PgSslMode::Disable });
        }
        if let Some(name) = options.get(OPTION_APPLICATION_NAME).and_then(OptionValue::as_str) {
            connect = connect.application_name(name);
        }

        let runtime_params: Vec<(String, String)> = options
            .iter()
            .filter(|(key, _)| {
                ![OPTION_DRIVER, OPTION_SSL, OPTION_APPLICATION_NAME, OPTION_CONNECT_TIMEOUT]
                    .contains(&key.as_str())
            })
            .filter_map(|(key, value)| match value {
                OptionValue::Text(s) => Some((key.clone(), s.clone())),
                OptionValue::Int(i) => Some((key.clone(), i.to_string())),
                OptionValue::Bool(b) => Some((key.clone(), if *b { "on" } else { "off" }.to_string())),
            })
            .collect();
        if !runtime_params.is_empty() {
            connect = connect.options(runtime_params);
        }

        Ok(connect)
    }

    /// Helper to bind a Value to a Postgres query
    fn bind_param<'q>(
        query: sqlx::query::Query<'q, Postgres, PgArguments>,
        value: &'q Value,
    ) -> sqlx::query::Query<'q, Postgres, PgArguments> {
        match value {
            Value::Null => query.bind(Option::<String>::None),
            Value::Bool(b) => query.bind(b),
            Value::Int(i) => query.bind(i),
            Value::Float(f) => query.bind(f),
            Value::Text(s) => query.bind(s),
            Value::Bytes(b) => query.bind(b),
            Value::Json(j) => query.bind(j),
            // Fallback for arrays or other complex types not yet fully mapped
            Value::Array(_) => query.bind(Option::<String>::None),
        }
    }

    /// Extracts a value from a PgRow at the given index
    fn extract_value(row: &PgRow, idx: usize) -> Value {
        // Integers BEFORE bool to avoid misinterpretation
        if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
            return v.map(Value::Int).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<i32>, _>(idx) {
            return v.map(|i| Value::Int(i as i64)).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<i16>, _>(idx) {
            return v.map(|i| Value::Int(i as i64)).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
            return v.map(Value::Bool).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
            return v.map(Value::Float).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<f32>, _>(idx) {
            return v.map(|f| Value::Float(f as f64)).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<Decimal>, _>(idx) {
            return v
                .map(|d| Value::Float(d.to_f64().unwrap_or(0.0)))
                .unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
            return v.map(Value::Text).unwrap_or(Value::Null);
        }
        // Date/Time types as ISO 8601 text
        if let Ok(v) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx) {
            return v.map(|dt| Value::Text(dt.to_rfc3339())).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
            return v
                .map(|dt| Value::Text(dt.format("%Y-%m-%d %H:%M:%S").to_string()))
                .unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<chrono::NaiveDate>, _>(idx) {
            return v
                .map(|d| Value::Text(d.format("%Y-%m-%d").to_string()))
                .unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<chrono::NaiveTime>, _>(idx) {
            return v
                .map(|t| Value::Text(t.format("%H:%M:%S").to_string()))
                .unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
            return v.map(Value::Bytes).unwrap_or(Value::Null);
        }
        // JSON/JSONB
        if let Ok(v) = row.try_get::<Option<serde_json::Value>, _>(idx) {
            return v.map(Value::Json).unwrap_or(Value::Null);
        }

        Value::Null
    }

    /// Gets column info from a PgRow
    fn get_column_info(row: &PgRow) -> Vec<ColumnInfo> {
        row.columns()
            .iter()
            .map(|col| ColumnInfo {
                name: col.name().to_string(),
                data_type: col.type_info().name().to_string(),
            })
            .collect()
    }

    fn convert_rows(pg_rows: &[PgRow], start: Instant) -> RawResult {
        let columns = pg_rows.first().map(Self::get_column_info).unwrap_or_default();
        let rows = pg_rows
            .iter()
            .map(|row| {
                row.columns()
                    .iter()
                    .map(|col| Self::extract_value(row, col.ordinal()))
                    .collect()
            })
            .collect();

        RawResult {
            columns,
            rows,
            affected_rows: None,
            execution_time_ms: elapsed_ms(start),
        }
    }
}

impl Default for PostgresDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Driver for PostgresDriver {
    fn driver_id(&self) -> &'static str {
        "postgres"
    }

    fn driver_name(&self) -> &'static str {
        "PostgreSQL"
    }

    fn schemes(&self) -> &'static [&'static str] {
        &["postgresql", "postgres"]
    }

    async fn open(
        &self,
        uri: &str,
        options: &ConnectionOptions,
    ) -> Result<Box<dyn DriverHandle>, BoxError> {
        let connect = Self::connect_options(uri, options)?;
        let conn = with_connect_timeout(options, connect.connect()).await?;
        Ok(Box::new(PostgresHandle { conn }))
    }
}

/// One dedicated PostgreSQL connection
struct PostgresHandle {
    conn: PgConnection,
}

#[async_trait]
impl DriverHandle for PostgresHandle {
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<RawResult, BoxError> {
        let start = Instant::now();
        let mut query = sqlx::query(sql);
        for param in params {
            query = PostgresDriver::bind_param(query, param);
        }

        if returns_rows(sql) {
            let pg_rows = query.fetch_all(&mut self.conn).await?;
            Ok(PostgresDriver::convert_rows(&pg_rows, start))
        } else {
            let result = query.execute(&mut self.conn).await?;
            Ok(RawResult::with_affected_rows(result.rows_affected(), elapsed_ms(start)))
        }
    }

    async fn close(self: Box<Self>) -> Result<(), BoxError> {
        self.conn.close().await?;
        Ok(())
    }
}
