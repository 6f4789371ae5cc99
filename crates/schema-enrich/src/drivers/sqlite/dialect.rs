//! SQLite SQL dialect (Strategy pattern).

use crate::core::identifier::quote_sqlite;
use crate::core::traits::Dialect;
use crate::error::Result;

/// SQLite dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Create a new SQLite dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for SqliteDialect {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn quote_ident(&self, name: &str) -> Result<String> {
        quote_sqlite(name)
    }

    // no CHAR_LENGTH in SQLite
    fn char_length_expr(&self, quoted_column: &str) -> String {
        format!("LENGTH(CAST({} AS TEXT))", quoted_column)
    }
}
