//! MySQL/MariaDB SQL dialect (Strategy pattern).

use crate::core::identifier::quote_mysql;
use crate::core::traits::Dialect;
use crate::error::Result;

/// MySQL/MariaDB dialect implementation.
///
/// Tables are addressed unqualified: the connection is already bound to the
/// crawled database.
#[derive(Debug, Clone, Default)]
pub struct MysqlDialect;

impl MysqlDialect {
    /// Create a new MySQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for MysqlDialect {
    fn name(&self) -> &str {
        "mysql"
    }

    fn quote_ident(&self, name: &str) -> Result<String> {
        quote_mysql(name)
    }

    fn char_length_expr(&self, quoted_column: &str) -> String {
        format!("CHAR_LENGTH({})", quoted_column)
    }
}
