//! Universal data types for the connection engine
//!
//! These types provide a normalized representation of query results
//! across every supported database engine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::engine::error::EngineError;

/// Universal value representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(#[serde(with = "base64_bytes")] Vec<u8>),
    Json(serde_json::Value),
    Array(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Text rendering used when a value is folded into a summary structure.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Bool(b) => Some(b.to_string()),
            Self::Int(i) => Some(i.to_string()),
            Self::Float(f) => Some(f.to_string()),
            Self::Text(s) => Some(s.clone()),
            Self::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
            Self::Json(j) => Some(j.to_string()),
            Self::Array(items) => serde_json::to_string(items).ok(),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

/// Column metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

/// Result exactly as the driver produced it
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawResult {
    /// Column information
    pub columns: Vec<ColumnInfo>,
    /// Result rows, positional
    pub rows: Vec<Vec<Value>>,
    /// Number of affected rows (for INSERT/UPDATE/DELETE)
    pub affected_rows: Option<u64>,
    /// Execution time in milliseconds
    pub execution_time_ms: f64,
}

impl RawResult {
    pub fn with_affected_rows(affected: u64, time_ms: f64) -> Self {
        Self {
            affected_rows: Some(affected),
            execution_time_ms: time_ms,
            ..Self::default()
        }
    }

    /// Pairs every positional row with the column names.
    pub fn into_rows(self) -> Vec<Row> {
        let names: Vec<String> = self.columns.into_iter().map(|c| c.name).collect();
        self.rows
            .into_iter()
            .map(|values| Row::new(names.clone(), values))
            .collect()
    }
}

/// A single row as an ordered column name -> value mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// Value of the first column with this name.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|idx| self.values.get(idx))
    }

    /// Case-insensitive lookup, for engines that fold identifier case.
    pub fn get_ignore_case(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .and_then(|idx| self.values.get(idx))
    }

    pub fn get_index(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(String::as_str).zip(self.values.iter())
    }
}

/// Outcome of `execute_query`
///
/// Statements whose text starts with `SELECT` are materialized into rows;
/// everything else keeps the driver's raw result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum QueryOutput {
    Rows(Vec<Row>),
    Raw(RawResult),
}

impl QueryOutput {
    pub fn is_rows(&self) -> bool {
        matches!(self, Self::Rows(_))
    }

    /// Rows in either form. A raw result without a row set yields none.
    pub fn into_rows(self) -> Vec<Row> {
        match self {
            Self::Rows(rows) => rows,
            Self::Raw(raw) => raw.into_rows(),
        }
    }

    pub fn rows_affected(&self) -> Option<u64> {
        match self {
            Self::Rows(_) => None,
            Self::Raw(raw) => raw.affected_rows,
        }
    }
}

/// Supported database vendors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    #[serde(alias = "postgresql")]
    Postgres,
    #[serde(alias = "mariadb")]
    MySql,
    Oracle,
    #[serde(alias = "sqlserver")]
    MsSql,
    Sqlite,
}

impl Vendor {
    /// Driver identifier filled into the config when the caller set none.
    pub fn canonical_driver(&self) -> &'static str {
        match self {
            Self::Postgres => "postgresql",
            Self::MySql => "mysql",
            Self::Oracle => "oracle",
            Self::MsSql => "mssql",
            Self::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
            Self::Oracle => "oracle",
            Self::MsSql => "mssql",
            Self::Sqlite => "sqlite",
        };
        f.write_str(name)
    }
}

impl FromStr for Vendor {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "mysql" | "mariadb" => Ok(Self::MySql),
            "oracle" => Ok(Self::Oracle),
            "mssql" | "sqlserver" => Ok(Self::MsSql),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(EngineError::configuration(format!(
                "Unsupported database vendor: {}",
                other
            ))),
        }
    }
}

/// How a connection reaches its server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    Direct,
    Local,
    Remote,
    SshTunnel,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Direct => "direct",
            Self::Local => "local",
            Self::Remote => "remote",
            Self::SshTunnel => "ssh_tunnel",
        };
        f.write_str(name)
    }
}

impl FromStr for StrategyKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(Self::Direct),
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            "ssh_tunnel" => Ok(Self::SshTunnel),
            other => Err(EngineError::configuration(format!(
                "Unknown connection strategy: {}",
                other
            ))),
        }
    }
}
