//! Identifier validation and quoting for dynamically built SQL.
//!
//! Table and column names come from configuration and cannot be bound as
//! parameters, so they are validated and quoted here before being spliced into
//! statements. Data values are always bound.

use crate::error::{MigrateError, Result};

/// PostgreSQL truncates identifiers beyond 63 bytes.
const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Reserved words that start a clause after WHERE.
const CLAUSE_KEYWORDS: &[&str] = &[
    "ORDER", "GROUP", "HAVING", "WINDOW", "LIMIT", "OFFSET", "FETCH", "UNION", "INTERSECT",
    "EXCEPT",
];

/// Validate an identifier for security issues.
///
/// Rejects empty identifiers, identifiers containing null bytes, and
/// identifiers longer than PostgreSQL's limit.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MigrateError::Config(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(MigrateError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(MigrateError::Config(format!(
            "SECURITY: Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote a PostgreSQL identifier.
///
/// Escapes double quotes by doubling them and wraps in double quotes.
pub fn quote_pg(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Quote a possibly schema-qualified table name (`schema.table` or `table`).
pub fn quote_table(name: &str) -> Result<String> {
    match name.split_once('.') {
        Some((schema, table)) => Ok(format!("{}.{}", quote_pg(schema)?, quote_pg(table)?)),
        None => quote_pg(name),
    }
}

/// Quote and join a column list.
pub fn quote_columns<S: AsRef<str>>(columns: &[S]) -> Result<String> {
    let quoted = columns
        .iter()
        .map(|c| quote_pg(c.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    Ok(quoted.join(", "))
}

/// Validate a configured row-filter condition.
///
/// Conditions are operator-supplied SQL and are spliced verbatim, so anything
/// that could end the statement or hide the rest of it is rejected.
pub fn validate_condition(condition: &str) -> Result<()> {
    if condition.contains(';') {
        return Err(MigrateError::Config(format!(
            "SECURITY: Filter condition contains semicolon (possible injection): {:?}",
            condition
        )));
    }

    if condition.contains("--") || condition.contains("/*") || condition.contains("*/") {
        return Err(MigrateError::Config(format!(
            "SECURITY: Filter condition contains SQL comment markers (possible injection): {:?}",
            condition
        )));
    }

    if let Some(keyword) = top_level_clause(condition) {
        return Err(MigrateError::Config(format!(
            "Filter condition contains a {} clause; only a WHERE condition and LIMIT n \
             are supported: {:?}",
            keyword, condition
        )));
    }

    Ok(())
}

/// First clause keyword outside quotes and parentheses, if any.
fn top_level_clause(condition: &str) -> Option<String> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut word = String::new();

    for c in condition.chars().chain(std::iter::once(' ')) {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        if c.is_alphanumeric() || c == '_' {
            if depth == 0 {
                word.push(c.to_ascii_uppercase());
            }
            continue;
        }
        if CLAUSE_KEYWORDS.contains(&word.as_str()) {
            return Some(word);
        }
        word.clear();
        match c {
            '\'' | '"' => quote = Some(c),
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    None
}
