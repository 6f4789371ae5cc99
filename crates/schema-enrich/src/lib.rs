//! # schema-enrich
//!
//! Relational schema crawler and enricher.
//!
//! This library connects to a MySQL, PostgreSQL or SQLite database and builds
//! a schema model with:
//!
//! - **Catalog metadata**: tables, columns, keys, indexes and foreign keys
//! - **Type taxonomy**: structural and semantic categories per field
//! - **Statistics and examples** sampled from the live data
//! - **Descriptions** produced by a pluggable [`Responder`]
//! - **Resume capability** via a JSON checkpoint file
//!
//! The model renders as compact M-Schema text for prompting.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use schema_enrich::{Config, NoOpResponder, RenderOptions, SchemaCrawler};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> schema_enrich::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let mut crawler = SchemaCrawler::connect(&config, Arc::new(NoOpResponder::new())).await?;
//!     let report = crawler.run(&CancellationToken::new()).await?;
//!     println!("Crawled {} fields", report.fields_total);
//!     println!("{}", crawler.model().render(&RenderOptions::default()));
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod orchestrator;
pub mod responder;
pub mod state;
pub mod typemap;

// Re-exports for convenient access
pub use config::{CommentMode, Config, CrawlerConfig, DatabaseConfig, EnrichmentConfig, Language};
pub use core::{Database, Field, FieldProperty, ForeignKey, RenderOptions, Table};
pub use error::{CrawlError, Result};
pub use orchestrator::{CrawlReport, CrawlerOptions, HealthCheckResult, Progress, SchemaCrawler};
pub use responder::{NoOpResponder, PromptArgs, PromptKind, Responder};
pub use state::{
    description_checkpoint_path, CheckpointStore, DescriptionCheckpoint, FieldCheckpoint,
};
pub use typemap::{Axis, DatabaseKind, DateGranularity, SemanticCategory, StructuralCategory};
