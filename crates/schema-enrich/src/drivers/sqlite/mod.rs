//! SQLite driver.
//!
//! - [`SqliteDialect`]: SQL syntax strategy
//! - [`SqliteSource`]: catalog reader over `sqlite_master` and the table pragmas
//!
//! Only available with the `sqlite` feature (on by default). SQLite has no
//! comment support, so table and column comments always come back empty.

mod dialect;
mod reader;

pub use dialect::SqliteDialect;
pub use reader::SqliteSource;
