//! MySQL / MariaDB connection
//!
//! Thin wrappers over `SHOW` and the table maintenance statements. Table
//! names are plain identifiers; parameters use `?`.

use tracing::info;

use crate::connections::{ensure_connected, fetch_rows, first_text, strategy_connection};
use crate::engine::error::EngineResult;
use crate::engine::sql_safety::{validate_identifier, IdentifierCharset};
use crate::engine::traits::ConnectionStrategy;
use crate::engine::types::{Row, Value, Vendor};

pub struct MySqlConnection {
    strategy: Box<dyn ConnectionStrategy>,
}

strategy_connection!(MySqlConnection, Vendor::MySql);

impl MySqlConnection {
    pub async fn show_tables(&mut self) -> EngineResult<Vec<Row>> {
        ensure_connected(self).await?;
        fetch_rows(self, "SHOW TABLES", &[]).await
    }

    pub async fn show_databases(&mut self) -> EngineResult<Vec<Row>> {
        ensure_connected(self).await?;
        fetch_rows(self, "SHOW DATABASES", &[]).await
    }

    pub async fn show_table_status(&mut self) -> EngineResult<Vec<Row>> {
        ensure_connected(self).await?;
        fetch_rows(self, "SHOW TABLE STATUS", &[]).await
    }

    pub async fn get_server_version(&mut self) -> EngineResult<Option<String>> {
        ensure_connected(self).await?;
        let rows = fetch_rows(self, "SELECT VERSION() AS version", &[]).await?;
        Ok(first_text(&rows, "version"))
    }

    /// `DESCRIBE <table>`
    pub async fn get_table_structure(&mut self, table: &str) -> EngineResult<Vec<Row>> {
        self.table_statement("DESCRIBE", table).await
    }

    /// The `CREATE TABLE` statement MySQL reports for `table`.
    pub async fn get_create_table(&mut self, table: &str) -> EngineResult<Option<String>> {
        let rows = self.table_statement("SHOW CREATE TABLE", table).await?;
        Ok(first_text(&rows, "Create Table"))
    }

    pub async fn optimize_table(&mut self, table: &str) -> EngineResult<Vec<Row>> {
        let rows = self.table_statement("OPTIMIZE TABLE", table).await?;
        info!(table, "Optimized table");
        Ok(rows)
    }

    pub async fn analyze_table(&mut self, table: &str) -> EngineResult<Vec<Row>> {
        let rows = self.table_statement("ANALYZE TABLE", table).await?;
        info!(table, "Analyzed table");
        Ok(rows)
    }

    pub async fn repair_table(&mut self, table: &str) -> EngineResult<Vec<Row>> {
        let rows = self.table_statement("REPAIR TABLE", table).await?;
        info!(table, "Repaired table");
        Ok(rows)
    }

    pub async fn check_table(&mut self, table: &str) -> EngineResult<Vec<Row>> {
        self.table_statement("CHECK TABLE", table).await
    }

    /// System variables, optionally filtered by a `LIKE` pattern.
    pub async fn get_variables(&mut self, pattern: Option<&str>) -> EngineResult<Vec<Row>> {
        ensure_connected(self).await?;
        match pattern {
            Some(pattern) => {
                fetch_rows(self, "SHOW VARIABLES LIKE ?", &[Value::from(pattern)]).await
            }
            None => fetch_rows(self, "SHOW VARIABLES", &[]).await,
        }
    }

    async fn table_statement(&mut self, statement: &str, table: &str) -> EngineResult<Vec<Row>> {
        ensure_connected(self).await?;
        validate_identifier("table", table, IdentifierCharset::Plain)?;
        fetch_rows(self, &format!("{} {}", statement, table), &[]).await
    }
}
