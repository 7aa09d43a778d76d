//! SQLite Driver
//!
//! File-backed driver using SQLx. URIs have the form `sqlite:///<path>`;
//! `sqlite:///:memory:` opens a private in-memory database.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Instant;

use async_trait::async_trait;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Column, ConnectOptions, Connection, Row, TypeInfo};

use crate::engine::config::ConnectionOptions;
use crate::engine::drivers::{elapsed_ms, with_connect_timeout, Driver, DriverHandle};
use crate::engine::error::BoxError;
use crate::engine::sql_safety::returns_rows;
use crate::engine::types::{ColumnInfo, RawResult, Value};

pub const MEMORY_DATABASE: &str = ":memory:";

/// Database path encoded in a `sqlite:///<path>` URI.
///
/// The third slash separates the empty authority from the path, so
/// `sqlite:////var/db/app.db` is absolute and `sqlite:///app.db` is relative.
pub fn database_path(uri: &str) -> Result<&str, BoxError> {
    let rest = uri
        .split_once("://")
        .map(|(_, rest)| rest)
        .ok_or_else(|| format!("Not a SQLite URI: {}", uri))?;
    let path = rest.strip_prefix('/').unwrap_or(rest);
    if path.is_empty() {
        return Err("SQLite URI has no database path".into());
    }
    Ok(path)
}

/// SQLite driver implementation
pub struct SqliteDriver;

impl SqliteDriver {
    pub fn new() -> Self {
        Self
    }

    fn connect_options(uri: &str) -> Result<SqliteConnectOptions, BoxError> {
        let path = database_path(uri)?;
        if path == MEMORY_DATABASE {
            return Ok(SqliteConnectOptions::from_str("sqlite::memory:")?);
        }
        Ok(SqliteConnectOptions::new()
            .filename(PathBuf::from(path))
            .create_if_missing(true))
    }

    /// Helper to bind a Value to a SQLite query
    fn bind_param<'q>(
        query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
        value: &'q Value,
    ) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
        match value {
            Value::Null => query.bind(Option::<String>::None),
            Value::Bool(b) => query.bind(b),
            Value::Int(i) => query.bind(i),
            Value::Float(f) => query.bind(f),
            Value::Text(s) => query.bind(s),
            Value::Bytes(b) => query.bind(b),
            Value::Json(j) => query.bind(j.to_string()),
            Value::Array(_) => query.bind(Option::<String>::None),
        }
    }

    /// Extracts a value from a SqliteRow at the given index
    fn extract_value(row: &SqliteRow, idx: usize) -> Value {
        if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
            return v.map(Value::Int).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
            return v.map(Value::Float).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
            return v.map(Value::Text).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
            return v.map(Value::Bytes).unwrap_or(Value::Null);
        }

        Value::Null
    }

    fn get_column_info(row: &SqliteRow) -> Vec<ColumnInfo> {
        row.columns()
            .iter()
            .map(|col| ColumnInfo {
                name: col.name().to_string(),
                data_type: col.type_info().name().to_string(),
            })
            .collect()
    }

    fn convert_rows(sqlite_rows: &[SqliteRow], start: Instant) -> RawResult {
        let columns = sqlite_rows.first().map(Self::get_column_info).unwrap_or_default();
        let rows = sqlite_rows
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

impl Default for SqliteDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Driver for SqliteDriver {
    fn driver_id(&self) -> &'static str {
        "sqlite"
    }

    fn driver_name(&self) -> &'static str {
        "SQLite"
    }

    fn schemes(&self) -> &'static [&'static str] {
        &["sqlite"]
    }

    async fn open(
        &self,
        uri: &str,
        options: &ConnectionOptions,
    ) -> Result<Box<dyn DriverHandle>, BoxError> {
        let connect = Self::connect_options(uri)?;
        let conn = with_connect_timeout(options, connect.connect()).await?;
        Ok(Box::new(SqliteHandle { conn }))
    }
}

/// One SQLite connection
struct SqliteHandle {
    conn: SqliteConnection,
}

#[async_trait]
impl DriverHandle for SqliteHandle {
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<RawResult, BoxError> {
        let start = Instant::now();
        let mut query = sqlx::query(sql);
        for param in params {
            query = SqliteDriver::bind_param(query, param);
        }

        if returns_rows(sql) {
            let sqlite_rows = query.fetch_all(&mut self.conn).await?;
            Ok(SqliteDriver::convert_rows(&sqlite_rows, start))
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_path_strips_the_authority_slash() {
        assert_eq!(database_path("sqlite:///app.db").ok(), Some("app.db"));
        assert_eq!(database_path("sqlite:////var/db/app.db").ok(), Some("/var/db/app.db"));
        assert_eq!(database_path("sqlite:///:memory:").ok(), Some(":memory:"));
        assert!(database_path("sqlite:///").is_err());
        assert!(database_path("app.db").is_err());
    }

    #[tokio::test]
    async fn in_memory_round_trip() {
        let driver = SqliteDriver::new();
        let mut handle = driver
            .open("sqlite:///:memory:", &ConnectionOptions::new())
            .await
            .expect("open");

        handle
            .execute("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)", &[])
            .await
            .expect("create");
        let inserted = handle
            .execute("INSERT INTO t (name) VALUES (?), (?)", &["a".into(), Value::Null])
            .await
            .expect("insert");
        assert_eq!(inserted.affected_rows, Some(2));

        let selected = handle
            .execute("SELECT id, name FROM t ORDER BY id", &[])
            .await
            .expect("select");
        assert_eq!(selected.columns.len(), 2);
        assert_eq!(
            selected.rows,
            vec![
                vec![Value::Int(1), Value::Text("a".into())],
                vec![Value::Int(2), Value::Null],
            ]
        );

        handle.close().await.expect("close");
    }

    #[tokio::test]
    async fn rollback_discards_writes() {
        let mut handle = SqliteDriver::new()
            .open("sqlite:///:memory:", &ConnectionOptions::new())
            .await
            .expect("open");
        handle.execute("CREATE TABLE t (v INTEGER)", &[]).await.expect("create");

        handle.begin().await.expect("begin");
        handle.execute("INSERT INTO t VALUES (1)", &[]).await.expect("insert");
        handle.rollback().await.expect("rollback");

        let count = handle.execute("SELECT COUNT(*) FROM t", &[]).await.expect("count");
        assert_eq!(count.rows[0][0], Value::Int(0));
    }
}
