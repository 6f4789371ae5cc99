//! Identifier and literal quoting for generated SQL.
//!
//! Table and column names come from the database catalog and cannot be bound
//! as statement parameters, so every generated statement quotes them here.
//! Identifiers are validated first: empty names, null bytes and names longer
//! than any supported engine allows are rejected.

use crate::error::{CrawlError, Result};

/// Maximum identifier length (conservative limit across databases).
/// - PostgreSQL: 63 bytes
/// - MySQL: 64 characters
/// - SQLite: unbounded, capped to the same limit
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Validate an identifier for security issues.
///
/// # Errors
///
/// Returns `CrawlError::Config` for invalid identifiers with a descriptive message.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(CrawlError::Config("Identifier cannot be empty".to_string()));
    }

    if name.contains('\0') {
        return Err(CrawlError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(CrawlError::Config(format!(
            "SECURITY: Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote a PostgreSQL identifier: `"name"`, inner quotes doubled.
pub fn quote_pg(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Quote a MySQL identifier: `` `name` ``, inner backticks doubled.
pub fn quote_mysql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("`{}`", name.replace('`', "``")))
}

/// SQLite accepts MySQL-style backticks.
pub fn quote_sqlite(name: &str) -> Result<String> {
    quote_mysql(name)
}

/// Qualify a PostgreSQL table name with schema.
pub fn qualify_pg(schema: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_pg(schema)?, quote_pg(table)?))
}

/// Quote a string value as a SQL literal: `'it''s'`.
pub fn quote_literal(value: &str) -> Result<String> {
    if value.contains('\0') {
        return Err(CrawlError::Config(format!(
            "SECURITY: Literal contains null byte: {:?}",
            value
        )));
    }
    Ok(format!("'{}'", value.replace('\'', "''")))
}

/// Match a table name against a glob with `*` (any run) and `?` (one char).
/// Matching is case-insensitive.
pub fn matches_pattern(name: &str, pattern: &str) -> bool {
    let name: Vec<char> = name.to_lowercase().chars().collect();
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();

    let (mut n, mut p) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while n < name.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == name[n]) {
            n += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some((p, n));
            p += 1;
        } else if let Some((sp, sn)) = star {
            // backtrack: let the last star swallow one more char
            p = sp + 1;
            n = sn + 1;
            star = Some((sp, sn + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|c| *c == '*')
}

/// Apply include/exclude glob lists. An empty include list admits everything.
pub fn table_selected(name: &str, include: &[String], exclude: &[String]) -> bool {
    let included = include.is_empty() || include.iter().any(|p| matches_pattern(name, p));
    included && !exclude.iter().any(|p| matches_pattern(name, p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("users").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("bad\0name").is_err());
        assert!(validate_identifier(&"x".repeat(129)).is_err());
        assert!(validate_identifier(&"x".repeat(128)).is_ok());
    }

    #[test]
    fn test_quote_pg() {
        assert_eq!(quote_pg("users").unwrap(), "\"users\"");
        assert_eq!(quote_pg("table\"name").unwrap(), "\"table\"\"name\"");
        assert!(quote_pg("").is_err());
    }

    #[test]
    fn test_quote_mysql_and_sqlite() {
        assert_eq!(quote_mysql("users").unwrap(), "`users`");
        assert_eq!(quote_mysql("table`name").unwrap(), "`table``name`");
        assert_eq!(quote_sqlite("order").unwrap(), "`order`");
    }

    #[test]
    fn test_qualify_pg() {
        assert_eq!(qualify_pg("sales", "orders").unwrap(), "\"sales\".\"orders\"");
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal("abc").unwrap(), "'abc'");
        assert_eq!(quote_literal("it's").unwrap(), "'it''s'");
        assert!(quote_literal("a\0b").is_err());
    }

    #[test]
    fn test_matches_pattern() {
        assert!(matches_pattern("users", "users"));
        assert!(matches_pattern("Users", "users"));
        assert!(matches_pattern("user_roles", "user_*"));
        assert!(matches_pattern("tmp_1", "tmp_?"));
        assert!(!matches_pattern("tmp_12", "tmp_?"));
        assert!(matches_pattern("a_log_b_log", "*_log"));
        assert!(matches_pattern("anything", "*"));
        assert!(!matches_pattern("orders", "user*"));
    }

    #[test]
    fn test_table_selected() {
        let include = vec!["user*".to_string(), "orders".to_string()];
        let exclude = vec!["*_bak".to_string()];
        assert!(table_selected("users", &include, &exclude));
        assert!(table_selected("orders", &include, &exclude));
        assert!(!table_selected("users_bak", &include, &exclude));
        assert!(!table_selected("items", &include, &exclude));
        assert!(table_selected("items", &[], &[]));
    }
}
