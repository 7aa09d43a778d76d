//! Oracle connection
//!
//! Data dictionary helpers and PL/SQL procedure calls. Oracle folds unquoted
//! identifiers to upper case, so table and owner filters are upper-cased
//! before binding. Parameters use `:n` placeholders.
//!
//! No Oracle driver is bundled; register one under the `oracle` scheme.

use serde::Serialize;
use tracing::warn;

use crate::connections::{
    degrade, ensure_connected, fetch_rows, first_text, placeholders, strategy_connection,
};
use crate::engine::error::{EngineResult, ErrorKind};
use crate::engine::sql_safety::{validate_identifier, IdentifierCharset};
use crate::engine::traits::{ConnectionStrategy, DatabaseConnection};
use crate::engine::types::{QueryOutput, Row, Value, Vendor};

pub struct OracleConnection {
    strategy: Box<dyn ConnectionStrategy>,
}

strategy_connection!(OracleConnection, Vendor::Oracle);

/// `USERENV` context of the current session. Each field is `None` when its
/// lookup failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OracleSessionInfo {
    pub username: Option<String>,
    pub instance: Option<String>,
    pub host: Option<String>,
    pub ip_address: Option<String>,
    pub os_user: Option<String>,
    pub current_schema: Option<String>,
    pub current_time: Option<String>,
}

const TABLE_PRIVILEGES_SQL: &str = "SELECT GRANTEE, OWNER, TABLE_NAME, GRANTOR, PRIVILEGE, \
     GRANTABLE, HIERARCHY FROM ALL_TAB_PRIVS";

const DBA_TABLESPACES_SQL: &str = "SELECT TABLESPACE_NAME, STATUS, CONTENTS, LOGGING, \
     EXTENT_MANAGEMENT, ALLOCATION_TYPE, SEGMENT_SPACE_MANAGEMENT, BIGFILE \
     FROM DBA_TABLESPACES ORDER BY TABLESPACE_NAME";

const USER_TABLESPACES_SQL: &str = "SELECT TABLESPACE_NAME, STATUS, CONTENTS, LOGGING, \
     EXTENT_MANAGEMENT, ALLOCATION_TYPE, SEGMENT_SPACE_MANAGEMENT \
     FROM USER_TABLESPACES ORDER BY TABLESPACE_NAME";

const ALL_TABLES_SQL: &str = "SELECT OWNER, TABLE_NAME, TABLESPACE_NAME, STATUS, NUM_ROWS, \
     BLOCKS, LAST_ANALYZED FROM ALL_TABLES";

const TAB_COLUMNS_SELECT: &str = "SELECT COLUMN_NAME, DATA_TYPE, DATA_LENGTH, DATA_PRECISION, \
     DATA_SCALE, NULLABLE, COLUMN_ID";

impl OracleConnection {
    /// Calls a stored procedure as `BEGIN name(:1, ...); END;`.
    ///
    /// `name` may be schema- or package-qualified (`pkg.proc`).
    pub async fn execute_procedure(
        &mut self,
        name: &str,
        params: &[Value],
    ) -> EngineResult<QueryOutput> {
        ensure_connected(self).await?;
        validate_identifier("procedure", name, IdentifierCharset::Dotted)?;

        let sql = if params.is_empty() {
            format!("BEGIN {}; END;", name)
        } else {
            format!(
                "BEGIN {}({}); END;",
                name,
                placeholders(params.len(), |i| format!(":{}", i))
            )
        };
        self.execute_query(&sql, params).await
    }

    /// Grants from `ALL_TAB_PRIVS`, optionally for one table.
    pub async fn get_table_privileges(&mut self, table: Option<&str>) -> EngineResult<Vec<Row>> {
        ensure_connected(self).await?;
        match table {
            Some(table) => {
                let sql = format!("{} WHERE TABLE_NAME = :1", TABLE_PRIVILEGES_SQL);
                fetch_rows(self, &sql, &[Value::from(table.to_uppercase())]).await
            }
            None => fetch_rows(self, TABLE_PRIVILEGES_SQL, &[]).await,
        }
    }

    pub async fn get_session_info(&mut self) -> EngineResult<OracleSessionInfo> {
        ensure_connected(self).await?;
        Ok(OracleSessionInfo {
            username: self.userenv("SESSION_USER", "username").await,
            instance: self.userenv("INSTANCE_NAME", "instance").await,
            host: self.userenv("HOST", "host").await,
            ip_address: self.userenv("IP_ADDRESS", "ip_address").await,
            os_user: self.userenv("OS_USER", "os_user").await,
            current_schema: self.userenv("CURRENT_SCHEMA", "current_schema").await,
            current_time: self
                .single_value(
                    "SELECT TO_CHAR(SYSDATE, 'YYYY-MM-DD HH24:MI:SS') AS current_time FROM DUAL",
                    "current_time",
                )
                .await,
        })
    }

    /// Tablespaces from `DBA_TABLESPACES`, or `USER_TABLESPACES` when the
    /// session lacks DBA privileges.
    pub async fn get_tablespaces(&mut self) -> EngineResult<Vec<Row>> {
        ensure_connected(self).await?;
        match fetch_rows(self, DBA_TABLESPACES_SQL, &[]).await {
            Err(e) if e.kind() == ErrorKind::Query => {
                warn!(error = %e, "DBA_TABLESPACES not readable, falling back to USER_TABLESPACES");
                fetch_rows(self, USER_TABLESPACES_SQL, &[]).await
            }
            other => other,
        }
    }

    pub async fn get_all_tables(&mut self, owner: Option<&str>) -> EngineResult<Vec<Row>> {
        ensure_connected(self).await?;
        match owner {
            Some(owner) => {
                let sql = format!("{} WHERE OWNER = :1 ORDER BY OWNER, TABLE_NAME", ALL_TABLES_SQL);
                fetch_rows(self, &sql, &[Value::from(owner.to_uppercase())]).await
            }
            None => {
                let sql = format!("{} ORDER BY OWNER, TABLE_NAME", ALL_TABLES_SQL);
                fetch_rows(self, &sql, &[]).await
            }
        }
    }

    /// Column metadata from `ALL_TAB_COLUMNS` for an owner, or from
    /// `USER_TAB_COLUMNS` for the current schema.
    pub async fn get_table_columns(
        &mut self,
        table: &str,
        owner: Option<&str>,
    ) -> EngineResult<Vec<Row>> {
        ensure_connected(self).await?;
        let table = Value::from(table.to_uppercase());
        match owner {
            Some(owner) => {
                let sql = format!(
                    "{} FROM ALL_TAB_COLUMNS WHERE TABLE_NAME = :1 AND OWNER = :2 ORDER BY COLUMN_ID",
                    TAB_COLUMNS_SELECT
                );
                fetch_rows(self, &sql, &[table, Value::from(owner.to_uppercase())]).await
            }
            None => {
                let sql = format!(
                    "{} FROM USER_TAB_COLUMNS WHERE TABLE_NAME = :1 ORDER BY COLUMN_ID",
                    TAB_COLUMNS_SELECT
                );
                fetch_rows(self, &sql, &[table]).await
            }
        }
    }

    async fn userenv(&mut self, parameter: &str, alias: &str) -> Option<String> {
        let sql = format!(
            "SELECT SYS_CONTEXT('USERENV', '{}') AS {} FROM DUAL",
            parameter, alias
        );
        self.single_value(&sql, alias).await
    }

    async fn single_value(&mut self, sql: &str, column: &str) -> Option<String> {
        degrade(column, fetch_rows(self, sql, &[]).await)
            .and_then(|rows| first_text(&rows, column))
    }
}
