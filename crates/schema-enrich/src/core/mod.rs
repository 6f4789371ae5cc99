//! Core abstractions for database-agnostic crawling.
//!
//! - [`schema`]: the Database / Table / Field model and its JSON form
//! - [`render`]: M-Schema text rendering of the model
//! - [`traits`]: [`SchemaSource`] and [`Dialect`], implemented by the drivers
//! - [`identifier`]: identifier quoting and table-name globs

pub mod identifier;
pub mod render;
pub mod schema;
pub mod traits;

pub use render::{render_database, render_table, RenderOptions};
pub use schema::{Database, Field, FieldProperty, ForeignKey, NotFound, Table};
pub use traits::{ColumnMeta, Dialect, ForeignKeyMeta, IndexMeta, QueryResult, SchemaSource};
