//! MySQL Driver
//!
//! Implements the driver capability for MySQL/MariaDB databases using SQLx.
//!
//! ## Transaction Handling
//!
//! Same architecture as PostgreSQL, except that transactions open with
//! `START TRANSACTION`.

use std::str::FromStr;
use std::time::Instant;

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::mysql::{MySql, MySqlArguments, MySqlConnectOptions, MySqlConnection, MySqlRow, MySqlSslMode};
use sqlx::{Column, ConnectOptions, Connection, Row, TypeInfo};

use crate::engine::config::{ConnectionOptions, OptionValue, OPTION_SSL};
use crate::engine::drivers::{elapsed_ms, with_connect_timeout, Driver, DriverHandle};
use crate::engine::error::BoxError;
use crate::engine::sql_safety::returns_rows;
use crate::engine::types::{ColumnInfo, RawResult, Value};

/// MySQL driver implementation
pub struct MySqlDriver;

impl MySqlDriver {
    pub fn new() -> Self {
        Self
    }

    fn connect_options(uri: &str, options: &ConnectionOptions) -> Result<MySqlConnectOptions, BoxError> {
        let mut connect = MySqlConnectOptions::from_str(uri)?;
        if let Some(ssl) = options.get(OPTION_SSL).and_then(OptionValue::as_bool) {
            connect = connect.ssl_mode(if ssl {
                MySqlSslMode::Required
            } else {
                MySqlSslMode::Disabled
            });
        }
        Ok(connect)
    }

    /// Helper to bind a Value to a MySQL query
    fn bind_param<'q>(
        query: sqlx::query::Query<'q, MySql, MySqlArguments>,
        value: &'q Value,
    ) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
        match value {
            Value::Null => query.bind(Option::<String>::None),
            Value::Bool(b) => query.bind(b),
            Value::Int(i) => query.bind(i),
            Value::Float(f) => query.bind(f),
            Value::Text(s) => query.bind(s),
            Value::Bytes(b) => query.bind(b),
            Value::Json(j) => query.bind(j),
            // Fallback for arrays
            Value::Array(_) => query.bind(Option::<String>::None),
        }
    }

    /// BIGINT UNSIGNED values past `i64::MAX` come back as text
    fn unsigned_value(value: u64) -> Value {
        i64::try_from(value)
            .map(Value::Int)
            .unwrap_or_else(|_| Value::Text(value.to_string()))
    }

    /// Extracts a value from a MySqlRow at the given index
    fn extract_value(row: &MySqlRow, idx: usize) -> Value {
        // Try u64 first for BIGINT UNSIGNED columns
        if let Ok(v) = row.try_get::<Option<u64>, _>(idx) {
            return v.map(Self::unsigned_value).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
            return v.map(Value::Int).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<i32>, _>(idx) {
            return v.map(|i| Value::Int(i as i64)).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<u32>, _>(idx) {
            return v.map(|u| Value::Int(u as i64)).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<i16>, _>(idx) {
            return v.map(|i| Value::Int(i as i64)).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<u16>, _>(idx) {
            return v.map(|u| Value::Int(u as i64)).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<i8>, _>(idx) {
            return v.map(|i| Value::Int(i as i64)).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<u8>, _>(idx) {
            return v.map(|u| Value::Int(u as i64)).unwrap_or(Value::Null);
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
        if let Ok(v) = row.try_get::<Option<serde_json::Value>, _>(idx) {
            return v.map(Value::Json).unwrap_or(Value::Null);
        }

        Value::Null
    }

    /// Gets column info from a MySqlRow
    fn get_column_info(row: &MySqlRow) -> Vec<ColumnInfo> {
        row.columns()
            .iter()
            .map(|col| ColumnInfo {
                name: col.name().to_string(),
                data_type: col.type_info().name().to_string(),
            })
            .collect()
    }

    fn convert_rows(mysql_rows: &[MySqlRow], start: Instant) -> RawResult {
        let columns = mysql_rows.first().map(Self::get_column_info).unwrap_or_default();
        let rows = mysql_rows
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

impl Default for MySqlDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Driver for MySqlDriver {
    fn driver_id(&self) -> &'static str {
        "mysql"
    }

    fn driver_name(&self) -> &'static str {
        "MySQL / MariaDB"
    }

    fn schemes(&self) -> &'static [&'static str] {
        &["mysql", "mariadb"]
    }

    async fn open(
        &self,
        uri: &str,
        options: &ConnectionOptions,
    ) -> Result<Box<dyn DriverHandle>, BoxError> {
        let connect = Self::connect_options(uri, options)?;
        let conn = with_connect_timeout(options, connect.connect()).await?;
        Ok(Box::new(MySqlHandle { conn }))
    }
}

/// One dedicated MySQL connection
struct MySqlHandle {
    conn: MySqlConnection,
}

#[async_trait]
impl DriverHandle for MySqlHandle {
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<RawResult, BoxError> {
        let start = Instant::now();
        let mut query = sqlx::query(sql);
        for param in params {
            query = MySqlDriver::bind_param(query, param);
        }

        if returns_rows(sql) {
            let mysql_rows = query.fetch_all(&mut self.conn).await?;
            Ok(MySqlDriver::convert_rows(&mysql_rows, start))
        } else {
            let result = query.execute(&mut self.conn).await?;
            Ok(RawResult::with_affected_rows(result.rows_affected(), elapsed_ms(start)))
        }
    }

    async fn begin(&mut self) -> Result<(), BoxError> {
        sqlx::query("START TRANSACTION").execute(&mut self.conn).await?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), BoxError> {
        self.conn.close().await?;
        Ok(())
    }
}
