//! MySQL/MariaDB driver.
//!
//! - [`MysqlDialect`]: SQL syntax strategy
//! - [`MysqlSource`]: catalog reader over INFORMATION_SCHEMA
//!
//! Only available with the `mysql` feature (on by default).
//!
//! # Supported Versions
//!
//! - MySQL 5.7+, 8.0+
//! - MariaDB 10.2+

mod dialect;
mod reader;

pub use dialect::MysqlDialect;
pub use reader::MysqlSource;
