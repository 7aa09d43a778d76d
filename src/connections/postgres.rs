//! PostgreSQL connection
//!
//! Catalog helpers over `pg_catalog` and `information_schema`. Parameters
//! use `$n` placeholders.

use serde::Serialize;
use tracing::info;

use crate::connections::{degrade, ensure_connected, fetch_rows, first_text, strategy_connection};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::sql_safety::{validate_identifier, validate_identifiers, IdentifierCharset};
use crate::engine::traits::{ConnectionStrategy, DatabaseConnection};
use crate::engine::types::{Row, Value, Vendor};

/// Schema assumed when a helper is not given one
pub const DEFAULT_SCHEMA: &str = "public";

pub struct PostgresConnection {
    strategy: Box<dyn ConnectionStrategy>,
}

strategy_connection!(PostgresConnection, Vendor::Postgres);

/// Aggregated metadata for one table.
///
/// Columns are required; the other parts are `None` when their query failed.
#[derive(Debug, Clone, Serialize)]
pub struct PostgresTableInfo {
    pub table_name: String,
    pub schema_name: String,
    pub columns: Vec<Row>,
    pub primary_keys: Option<Vec<String>>,
    pub indexes: Option<Vec<Row>>,
    pub foreign_keys: Option<Vec<Row>>,
}

const TABLES_SQL: &str = "SELECT tablename AS table_name, schemaname AS schema_name \
     FROM pg_catalog.pg_tables \
     WHERE schemaname != 'pg_catalog' AND schemaname != 'information_schema' \
     ORDER BY schemaname, tablename";

const COLUMNS_SQL: &str = "SELECT column_name, data_type, is_nullable, column_default, \
     character_maximum_length, numeric_precision, numeric_scale \
     FROM information_schema.columns \
     WHERE table_schema = $1 AND table_name = $2 \
     ORDER BY ordinal_position";

const PRIMARY_KEYS_SQL: &str = "SELECT kcu.column_name \
     FROM information_schema.table_constraints tc \
     JOIN information_schema.key_column_usage kcu \
       ON tc.constraint_name = kcu.constraint_name \
      AND tc.table_schema = kcu.table_schema \
     WHERE tc.constraint_type = 'PRIMARY KEY' \
       AND tc.table_schema = $1 AND tc.table_name = $2 \
     ORDER BY kcu.ordinal_position";

const INDEXES_SQL: &str = "SELECT indexname AS index_name, indexdef AS index_definition \
     FROM pg_indexes \
     WHERE schemaname = $1 AND tablename = $2";

const FOREIGN_KEYS_SQL: &str = "SELECT tc.constraint_name, kcu.column_name, \
     ccu.table_schema AS foreign_table_schema, \
     ccu.table_name AS foreign_table_name, \
     ccu.column_name AS foreign_column_name \
     FROM information_schema.table_constraints tc \
     JOIN information_schema.key_column_usage kcu \
       ON tc.constraint_name = kcu.constraint_name \
      AND tc.table_schema = kcu.table_schema \
     JOIN information_schema.constraint_column_usage ccu \
       ON ccu.constraint_name = tc.constraint_name \
      AND ccu.table_schema = tc.table_schema \
     WHERE tc.constraint_type = 'FOREIGN KEY' \
       AND tc.table_schema = $1 AND tc.table_name = $2";

impl PostgresConnection {
    /// User tables across all non-system schemas.
    pub async fn get_tables(&mut self) -> EngineResult<Vec<Row>> {
        ensure_connected(self).await?;
        fetch_rows(self, TABLES_SQL, &[]).await
    }

    pub async fn create_schema(&mut self, name: &str) -> EngineResult<()> {
        ensure_connected(self).await?;
        validate_identifier("schema", name, IdentifierCharset::Plain)?;

        self.execute_query(&format!("CREATE SCHEMA IF NOT EXISTS {}", name), &[])
            .await?;
        info!(schema = name, "Created schema");
        Ok(())
    }

    pub async fn get_schema_names(&mut self) -> EngineResult<Vec<String>> {
        ensure_connected(self).await?;
        let rows = fetch_rows(
            self,
            "SELECT schema_name FROM information_schema.schemata ORDER BY schema_name",
            &[],
        )
        .await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get("schema_name").and_then(Value::to_text))
            .collect())
    }

    /// Columns, primary keys, indexes and foreign keys of `schema.table`.
    ///
    /// `schema` defaults to `public`.
    pub async fn get_table_info(
        &mut self,
        table: &str,
        schema: Option<&str>,
    ) -> EngineResult<PostgresTableInfo> {
        ensure_connected(self).await?;
        let schema = schema.unwrap_or(DEFAULT_SCHEMA);
        let params = [Value::from(schema), Value::from(table)];

        let columns = fetch_rows(self, COLUMNS_SQL, &params).await?;

        let primary_keys = degrade(
            "primary_keys",
            fetch_rows(self, PRIMARY_KEYS_SQL, &params).await,
        )
        .map(|rows| {
            rows.iter()
                .filter_map(|row| row.get("column_name").and_then(Value::to_text))
                .collect()
        });
        let indexes = degrade("indexes", fetch_rows(self, INDEXES_SQL, &params).await);
        let foreign_keys = degrade(
            "foreign_keys",
            fetch_rows(self, FOREIGN_KEYS_SQL, &params).await,
        );

        Ok(PostgresTableInfo {
            table_name: table.to_string(),
            schema_name: schema.to_string(),
            columns,
            primary_keys,
            indexes,
            foreign_keys,
        })
    }

    pub async fn vacuum_table(&mut self, table: &str, schema: Option<&str>) -> EngineResult<()> {
        ensure_connected(self).await?;
        let schema = schema.unwrap_or(DEFAULT_SCHEMA);
        validate_identifier("schema", schema, IdentifierCharset::Plain)?;
        validate_identifier("table", table, IdentifierCharset::Plain)?;

        self.execute_query(&format!("VACUUM {}.{}", schema, table), &[])
            .await?;
        info!(schema, table, "Vacuumed table");
        Ok(())
    }

    /// Creates an index on `schema.table (columns)`.
    ///
    /// Without an explicit name the index is called `idx_<table>_<columns>`.
    /// Returns the index name.
    pub async fn create_index(
        &mut self,
        table: &str,
        columns: &[&str],
        index_name: Option<&str>,
        schema: Option<&str>,
        unique: bool,
    ) -> EngineResult<String> {
        ensure_connected(self).await?;
        let schema = schema.unwrap_or(DEFAULT_SCHEMA);
        validate_identifier("schema", schema, IdentifierCharset::Plain)?;
        validate_identifier("table", table, IdentifierCharset::Plain)?;
        if columns.is_empty() {
            return Err(EngineError::configuration("An index needs at least one column"));
        }
        validate_identifiers("column", columns.iter().copied(), IdentifierCharset::Plain)?;

        let name = match index_name {
            Some(name) => name.to_string(),
            None => format!("idx_{}_{}", table, columns.join("_")),
        };
        validate_identifier("index", &name, IdentifierCharset::Plain)?;

        let sql = format!(
            "CREATE {}INDEX {} ON {}.{} ({})",
            if unique { "UNIQUE " } else { "" },
            name,
            schema,
            table,
            columns.join(", ")
        );
        self.execute_query(&sql, &[]).await?;
        info!(index = %name, schema, table, "Created index");
        Ok(name)
    }

    pub async fn get_server_version(&mut self) -> EngineResult<Option<String>> {
        ensure_connected(self).await?;
        let rows = fetch_rows(self, "SHOW server_version", &[]).await?;
        Ok(first_text(&rows, "server_version"))
    }
}
