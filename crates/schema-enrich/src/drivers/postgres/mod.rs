//! PostgreSQL driver.
//!
//! - [`PostgresDialect`]: SQL syntax strategy
//! - [`PostgresSource`]: catalog reader over `pg_catalog`, pooled with deadpool-postgres

mod dialect;
mod reader;

pub use dialect::PostgresDialect;
pub use reader::PostgresSource;
