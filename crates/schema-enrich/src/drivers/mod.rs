//! Database driver implementations.
//!
//! - [`mysql`]: MySQL/MariaDB driver (sqlx, `mysql` feature)
//! - [`postgres`]: PostgreSQL driver (tokio-postgres + deadpool-postgres)
//! - [`sqlite`]: SQLite driver (sqlx, `sqlite` feature)
//! - [`common`]: Shared utilities (TLS)
//!
//! Each driver provides a [`Dialect`] for statement generation and a
//! [`SchemaSource`] for catalog reads.
//!
//! # Adding New Databases
//!
//! 1. Create a new module under `drivers/`
//! 2. Implement `Dialect` and `SchemaSource`
//! 3. Add a variant to [`DialectImpl`] and an arm to [`connect`]
//! 4. Add the type sets to `typemap`
//! 5. Gate the driver with a feature flag in `Cargo.toml`

use std::sync::Arc;

pub mod common;
#[cfg(feature = "mysql")]
pub mod mysql;
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use common::{SslMode, TlsBuilder};

#[cfg(feature = "mysql")]
pub use mysql::{MysqlDialect, MysqlSource};
pub use postgres::{PostgresDialect, PostgresSource};
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteDialect, SqliteSource};

use crate::config::DatabaseConfig;
use crate::core::traits::{Dialect, SchemaSource};
use crate::error::{CrawlError, Result};
use crate::typemap::DatabaseKind;

/// Enum-based static dispatch for dialects.
///
/// Manual impl rather than a macro; the compiler generates a match per call.
#[derive(Debug, Clone)]
pub enum DialectImpl {
    #[cfg(feature = "mysql")]
    Mysql(MysqlDialect),
    Postgres(PostgresDialect),
    #[cfg(feature = "sqlite")]
    Sqlite(SqliteDialect),
}

impl Dialect for DialectImpl {
    fn name(&self) -> &str {
        match self {
            #[cfg(feature = "mysql")]
            DialectImpl::Mysql(d) => d.name(),
            DialectImpl::Postgres(d) => d.name(),
            #[cfg(feature = "sqlite")]
            DialectImpl::Sqlite(d) => d.name(),
        }
    }

    fn quote_ident(&self, name: &str) -> Result<String> {
        match self {
            #[cfg(feature = "mysql")]
            DialectImpl::Mysql(d) => d.quote_ident(name),
            DialectImpl::Postgres(d) => d.quote_ident(name),
            #[cfg(feature = "sqlite")]
            DialectImpl::Sqlite(d) => d.quote_ident(name),
        }
    }

    fn table_ref(&self, schema: Option<&str>, table: &str) -> Result<String> {
        match self {
            #[cfg(feature = "mysql")]
            DialectImpl::Mysql(d) => d.table_ref(schema, table),
            DialectImpl::Postgres(d) => d.table_ref(schema, table),
            #[cfg(feature = "sqlite")]
            DialectImpl::Sqlite(d) => d.table_ref(schema, table),
        }
    }

    fn char_length_expr(&self, quoted_column: &str) -> String {
        match self {
            #[cfg(feature = "mysql")]
            DialectImpl::Mysql(d) => d.char_length_expr(quoted_column),
            DialectImpl::Postgres(d) => d.char_length_expr(quoted_column),
            #[cfg(feature = "sqlite")]
            DialectImpl::Sqlite(d) => d.char_length_expr(quoted_column),
        }
    }
}

impl DialectImpl {
    /// Dialect for a resolved engine.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::UnsupportedDialect`] when the engine's driver
    /// feature is compiled out.
    pub fn from_kind(kind: DatabaseKind) -> Result<Self> {
        match kind {
            #[cfg(feature = "mysql")]
            DatabaseKind::Mysql => Ok(DialectImpl::Mysql(MysqlDialect::new())),
            DatabaseKind::Postgres => Ok(DialectImpl::Postgres(PostgresDialect::new())),
            #[cfg(feature = "sqlite")]
            DatabaseKind::Sqlite => Ok(DialectImpl::Sqlite(SqliteDialect::new())),
            #[allow(unreachable_patterns)]
            other => Err(CrawlError::UnsupportedDialect(format!(
                "{} (driver feature not enabled)",
                other
            ))),
        }
    }

    /// Create a dialect implementation from a database type string.
    pub fn from_db_type(db_type: &str) -> Result<Self> {
        let kind = DatabaseKind::parse(db_type)
            .ok_or_else(|| CrawlError::UnsupportedDialect(db_type.to_string()))?;
        Self::from_kind(kind)
    }
}

/// Open a [`SchemaSource`] for the configured database.
pub async fn connect(config: &DatabaseConfig, max_conns: u32) -> Result<Arc<dyn SchemaSource>> {
    match config.kind()? {
        #[cfg(feature = "mysql")]
        DatabaseKind::Mysql => Ok(Arc::new(MysqlSource::connect(config, max_conns).await?)),
        DatabaseKind::Postgres => Ok(Arc::new(PostgresSource::connect(config, max_conns).await?)),
        #[cfg(feature = "sqlite")]
        DatabaseKind::Sqlite => Ok(Arc::new(
            SqliteSource::connect(&config.sqlite_url(), max_conns).await?,
        )),
        #[allow(unreachable_patterns)]
        other => Err(CrawlError::UnsupportedDialect(format!(
            "{} (driver feature not enabled)",
            other
        ))),
    }
}
