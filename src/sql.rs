//! Identifier quoting and statement checks for generated SQL.
//!
//! Table and column names come from user-supplied CSV headers and record
//! specs, so nothing is spliced into SQL text without passing through
//! [`quote_ident`]. Identifiers cannot be bound as statement parameters;
//! quoting is the only protection available.

use crate::error::{JoinerError, Result};
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;

/// SQLite accepts much longer names, but no survey field comes close.
const MAX_IDENTIFIER_LENGTH: usize = 128;

pub fn validate_identifier(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(JoinerError::Identifier(
            "identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(JoinerError::Identifier(format!(
            "identifier contains a null byte: {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(JoinerError::Identifier(format!(
            "identifier exceeds {} bytes: {:?}",
            MAX_IDENTIFIER_LENGTH, name
        )));
    }

    Ok(())
}

/// Quote an identifier with double quotes, doubling any embedded quote.
///
/// ```ignore
/// assert_eq!(quote_ident("CASEID")?, "\"CASEID\"");
/// assert_eq!(quote_ident("odd\"name")?, "\"odd\"\"name\"");
/// ```
pub fn quote_ident(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// `"table"."column"`
pub fn qualify(table: &str, column: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_ident(table)?, quote_ident(column)?))
}

/// Single-quoted string literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Parse a generated statement with the SQLite dialect.
///
/// Used by dry runs, where statements are printed rather than executed, so
/// that a malformed plan is still caught before anyone runs it by hand.
pub fn check_statement(sql: &str) -> Result<()> {
    Parser::parse_sql(&SQLiteDialect {}, sql)
        .map(|_| ())
        .map_err(|e| JoinerError::SqlSyntax(format!("{}: {}", e, sql)))
}
