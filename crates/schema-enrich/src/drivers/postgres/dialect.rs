//! PostgreSQL SQL dialect (Strategy pattern).

use crate::core::identifier::{qualify_pg, quote_pg};
use crate::core::traits::Dialect;
use crate::error::Result;

/// PostgreSQL dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Create a new PostgreSQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &str {
        "postgresql"
    }

    fn quote_ident(&self, name: &str) -> Result<String> {
        quote_pg(name)
    }

    /// `"schema"."table"` when a schema is configured.
    fn table_ref(&self, schema: Option<&str>, table: &str) -> Result<String> {
        match schema.filter(|s| !s.is_empty()) {
            Some(s) => qualify_pg(s, table),
            None => quote_pg(table),
        }
    }

    fn char_length_expr(&self, quoted_column: &str) -> String {
        format!("CHAR_LENGTH({}::TEXT)", quoted_column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        let dialect = PostgresDialect::new();
        assert_eq!(dialect.quote_ident("users").unwrap(), "\"users\"");
        assert_eq!(dialect.quote_ident("my\"table").unwrap(), "\"my\"\"table\"");
    }

    #[test]
    fn test_table_ref() {
        let dialect = PostgresDialect::new();
        assert_eq!(
            dialect.table_ref(Some("sales"), "orders").unwrap(),
            "\"sales\".\"orders\""
        );
        assert_eq!(dialect.table_ref(None, "orders").unwrap(), "\"orders\"");
        assert_eq!(dialect.table_ref(Some(""), "orders").unwrap(), "\"orders\"");
    }

    #[test]
    fn test_aggregate_queries() {
        let dialect = PostgresDialect::new();
        assert_eq!(
            dialect
                .build_char_length_query("\"t\"", "c", "MIN")
                .unwrap(),
            "SELECT MIN(CHAR_LENGTH(\"c\"::TEXT)) FROM \"t\" WHERE \"c\" IS NOT NULL"
        );
        assert_eq!(
            dialect.build_aggregate_query("\"t\"", "c", "AVG").unwrap(),
            "SELECT AVG(\"c\") FROM \"t\" WHERE \"c\" IS NOT NULL"
        );
        assert_eq!(
            dialect.build_count_query("\"t\"", "c", true).unwrap(),
            "SELECT COUNT(DISTINCT \"c\") FROM \"t\""
        );
    }
}
