//! Statement classification and identifier validation.
//!
//! Identifiers (table, schema, column, index, procedure names) cannot be
//! bound as parameters, so every helper that splices one into SQL text runs
//! it through [`validate_identifier`] first. Values are always bound.

use crate::engine::error::{EngineError, EngineResult};

/// Characters accepted in an identifier on top of `[A-Za-z0-9_]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierCharset {
    /// Letters, digits, underscore.
    Plain,
    /// Plain plus `.` for `schema.object` names.
    Dotted,
    /// Dotted plus `[` and `]` for bracket-quoted multi-part names.
    Bracketed,
}

impl IdentifierCharset {
    fn allows(&self, c: char) -> bool {
        if c.is_ascii_alphanumeric() || c == '_' {
            return true;
        }
        match self {
            Self::Plain => false,
            Self::Dotted => c == '.',
            Self::Bracketed => matches!(c, '.' | '[' | ']'),
        }
    }
}

/// Rejects any identifier containing a character outside `charset`.
///
/// `kind` names the identifier in the error message ("table", "schema", ...).
pub fn validate_identifier(kind: &str, name: &str, charset: IdentifierCharset) -> EngineResult<()> {
    if name.is_empty() {
        return Err(EngineError::configuration(format!("Empty {} name", kind)));
    }

    if let Some(bad) = name.chars().find(|c| !charset.allows(*c)) {
        return Err(EngineError::configuration(format!(
            "Invalid {} name {:?}: character {:?} is not allowed",
            kind, name, bad
        )));
    }

    Ok(())
}

/// Validates every identifier in `names`.
pub fn validate_identifiers<'a>(
    kind: &str,
    names: impl IntoIterator<Item = &'a str>,
    charset: IdentifierCharset,
) -> EngineResult<()> {
    names
        .into_iter()
        .try_for_each(|name| validate_identifier(kind, name, charset))
}

/// True when the trimmed, case-insensitive statement text starts with `SELECT`.
///
/// This decides whether `execute_query` materializes rows.
pub fn is_select(sql: &str) -> bool {
    starts_with_keyword(sql, "SELECT")
}

/// True for statements that produce a row set on the wire.
///
/// Drivers use this to pick between fetching rows and counting affected
/// rows. It is wider than [`is_select`] so that `SHOW`, `PRAGMA` and friends
/// still hand their rows back inside a raw result.
pub fn returns_rows(sql: &str) -> bool {
    const ROW_KEYWORDS: &[&str] = &[
        "SELECT", "WITH", "SHOW", "PRAGMA", "EXPLAIN", "VALUES", "DESCRIBE", "DESC", "TABLE",
        "CHECK", "ANALYZE", "OPTIMIZE", "REPAIR",
    ];
    ROW_KEYWORDS.iter().any(|kw| starts_with_keyword(sql, kw))
}

fn starts_with_keyword(sql: &str, keyword: &str) -> bool {
    let trimmed = sql.trim_start();
    let Some(head) = trimmed.get(..keyword.len()) else {
        return false;
    };
    if !head.eq_ignore_ascii_case(keyword) {
        return false;
    }
    // Keyword must end here ("SELECTED_ROWS" is not a SELECT).
    trimmed[keyword.len()..]
        .chars()
        .next()
        .map_or(true, |c| !(c.is_ascii_alphanumeric() || c == '_'))
}

/// Escapes a value for use inside a single-quoted SQL string literal.
pub fn escape_string_literal(value: &str) -> String {
    value.replace('\'', "''")
}
