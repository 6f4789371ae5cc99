//! Crawl orchestrator - main workflow coordinator.
//!
//! A [`SchemaCrawler`] owns one schema model for one database and drives it
//! through introspection, field classification and description enrichment.
//! Everything runs sequentially: one statement at a time, tables and fields
//! in model order.

mod classify;
mod describe;
mod stats;

pub use describe::{clean_answer, extract_answer};
pub use stats::{truncate_cell, Aggregate};

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{CommentMode, Config, Language};
use crate::core::identifier::table_selected;
use crate::core::schema::{Database, Field, ForeignKey, Table};
use crate::core::traits::{Dialect, SchemaSource};
use crate::drivers::{self, DialectImpl};
use crate::error::{CrawlError, Result};
use crate::responder::{PromptArgs, PromptKind, Responder};
use crate::state::{description_checkpoint_path, CheckpointStore};
use crate::typemap::DatabaseKind;

/// Crawler settings, usually derived from a [`Config`].
#[derive(Debug, Clone)]
pub struct CrawlerOptions {
    /// Identifier used in the rendered header.
    pub db_id: String,

    /// Namespace shown in rendered headers and used for foreign-key filtering.
    pub schema: Option<String>,

    pub include_tables: Vec<String>,
    pub exclude_tables: Vec<String>,

    /// Distinct values sampled per column during introspection.
    pub sample_size: usize,

    /// Examples per field in rendered text.
    pub example_num: usize,

    /// Time budget for [`SchemaCrawler::execute_with_timeout`].
    pub statement_timeout: Duration,

    pub comment_mode: CommentMode,
    pub language: Language,

    pub schema_file: PathBuf,
    pub checkpoint_file: PathBuf,
}

impl Default for CrawlerOptions {
    fn default() -> Self {
        Self {
            db_id: "Anonymous".to_string(),
            schema: None,
            include_tables: Vec::new(),
            exclude_tables: Vec::new(),
            sample_size: 5,
            example_num: 3,
            statement_timeout: Duration::from_secs(10),
            comment_mode: CommentMode::default(),
            language: Language::default(),
            schema_file: PathBuf::from("schema.json"),
            checkpoint_file: PathBuf::from("checkpoints/analysis_checkpoint.json"),
        }
    }
}

impl CrawlerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            db_id: config.db_id(),
            schema: config.database.schema.clone().filter(|s| !s.is_empty()),
            include_tables: config.crawler.include_tables.clone(),
            exclude_tables: config.crawler.exclude_tables.clone(),
            sample_size: config.crawler.sample_size,
            example_num: config.crawler.example_num,
            statement_timeout: Duration::from_secs(config.crawler.statement_timeout_secs),
            comment_mode: config.enrichment.comment_mode,
            language: config.enrichment.language,
            schema_file: PathBuf::from(&config.output.schema_file),
            checkpoint_file: PathBuf::from(&config.output.checkpoint_file),
        }
    }
}

/// How a classification or enrichment pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Completed,
    /// Cancellation was observed; the unit in flight was finished first.
    Interrupted,
}

impl Progress {
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Progress::Interrupted)
    }
}

/// Result of a crawl run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlReport {
    pub db_id: String,

    /// Dialect name of the crawled database.
    pub dialect: String,

    /// Final status: "completed" or "interrupted".
    pub status: String,

    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,

    pub tables_total: usize,
    pub fields_total: usize,

    /// Fields classified in this run.
    pub fields_classified: usize,

    /// Fields restored from the checkpoint instead of re-classified.
    pub fields_restored: usize,

    /// Fields still without a semantic category.
    pub fields_unclassified: usize,

    /// Column and table descriptions written by enrichment.
    pub descriptions_generated: usize,

    /// Descriptions restored from the description checkpoint.
    pub descriptions_restored: usize,

    /// Responder calls made in this run.
    pub responder_calls: usize,

    pub comment_mode: CommentMode,

    /// Where the schema model was saved.
    pub schema_file: String,

    pub interrupted: bool,
}

impl CrawlReport {
    /// Convert the report to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Result of a connectivity check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub dialect: String,
    pub connected: bool,
    pub latency_ms: u64,
    pub error: Option<String>,
    pub healthy: bool,
}

#[derive(Debug, Default)]
struct RunCounters {
    fields_classified: usize,
    fields_restored: usize,
    descriptions_generated: usize,
    descriptions_restored: usize,
}

/// Crawls one database into a schema model and enriches it.
pub struct SchemaCrawler {
    source: Arc<dyn SchemaSource>,
    dialect: DialectImpl,
    responder: Arc<dyn Responder>,
    options: CrawlerOptions,
    model: Database,
    checkpoint: CheckpointStore,
    descriptions: CheckpointStore,
    /// Set once the model holds introspected or supplied tables.
    populated: bool,
    responder_calls: AtomicUsize,
    counters: RunCounters,
}

impl SchemaCrawler {
    /// Connect to the configured database and build a crawler for it.
    pub async fn connect(config: &Config, responder: Arc<dyn Responder>) -> Result<Self> {
        // fail fast before opening any connection
        DialectImpl::from_kind(config.database.kind()?)?;
        let source = drivers::connect(&config.database, config.crawler.max_connections).await?;
        Self::new(source, responder, CrawlerOptions::from_config(config))
    }

    /// Build a crawler over an existing source.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::UnsupportedDialect`] when the source's engine has
    /// no dialect.
    pub fn new(
        source: Arc<dyn SchemaSource>,
        responder: Arc<dyn Responder>,
        options: CrawlerOptions,
    ) -> Result<Self> {
        let dialect = DialectImpl::from_db_type(source.db_type())?;
        let kind = DatabaseKind::parse(source.db_type());
        let model = Database::new(options.db_id.clone(), options.schema.clone(), kind);
        let checkpoint = CheckpointStore::new(&options.checkpoint_file);
        let descriptions =
            CheckpointStore::new(description_checkpoint_path(&options.checkpoint_file));

        Ok(Self {
            source,
            dialect,
            responder,
            options,
            model,
            checkpoint,
            descriptions,
            populated: false,
            responder_calls: AtomicUsize::new(0),
            counters: RunCounters::default(),
        })
    }

    /// Use a previously saved model instead of introspecting.
    pub fn with_model(mut self, mut model: Database) -> Self {
        if model.dialect.is_none() {
            model.dialect = Some(self.dialect.name().to_string());
        }
        self.model = model;
        self.populated = true;
        self
    }

    pub fn model(&self) -> &Database {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut Database {
        &mut self.model
    }

    pub fn into_model(self) -> Database {
        self.model
    }

    pub fn options(&self) -> &CrawlerOptions {
        &self.options
    }

    pub fn checkpoint(&self) -> &CheckpointStore {
        &self.checkpoint
    }

    pub fn description_checkpoint(&self) -> &CheckpointStore {
        &self.descriptions
    }

    /// Forget every checkpointed classification and description, for a
    /// fresh run.
    pub fn reset_checkpoint(&mut self) {
        self.checkpoint.clear();
        self.descriptions.clear();
    }

    /// Responder calls made so far.
    pub fn responder_calls(&self) -> usize {
        self.responder_calls.load(Ordering::Relaxed)
    }

    /// Quoted FROM-clause reference for a table.
    fn table_ref(&self, table: &str) -> Result<String> {
        let namespace = match self.model.kind() {
            Some(DatabaseKind::Postgres) => Some(self.source.default_schema()),
            _ => None,
        };
        self.dialect.table_ref(namespace, table)
    }

    /// Ask the responder, counting the call.
    async fn ask(&self, kind: PromptKind, args: &PromptArgs) -> String {
        self.responder_calls.fetch_add(1, Ordering::Relaxed);
        let answer = self.responder.respond(kind, args).await;
        if answer.trim().is_empty() {
            debug!("{}", CrawlError::CollaboratorUnavailable { step: kind.to_string() });
        }
        answer
    }

    /// Populate the model from the live catalog.
    ///
    /// Any previous model content is replaced. A table that fails to load is
    /// logged and skipped.
    pub async fn introspect(&mut self) -> Result<()> {
        self.model = Database::new(
            self.model.db_id.clone(),
            self.model.schema.clone(),
            self.model.kind(),
        );

        let tables = self.source.list_tables().await?;
        let selected: Vec<String> = tables
            .into_iter()
            .filter(|t| {
                let keep =
                    table_selected(t, &self.options.include_tables, &self.options.exclude_tables);
                if !keep {
                    debug!("Skipping table {} (filtered)", t);
                }
                keep
            })
            .collect();

        info!("Found {} tables to crawl", selected.len());

        for name in &selected {
            if let Err(e) = self.introspect_table(name).await {
                warn!("Skipping table {}: {}", name, e);
                self.model.tables.shift_remove(name.as_str());
                self.model.foreign_keys.retain(|fk| fk.table != *name);
            }
        }

        self.populated = true;
        info!(
            "Introspected {} tables, {} fields",
            self.model.tables.len(),
            self.model.field_count()
        );
        Ok(())
    }

    async fn introspect_table(&mut self, name: &str) -> Result<()> {
        let pk = self.source.primary_key(name).await?;
        let unique_keys = self.source.unique_constraints(name).await?;
        let indexes = self.source.indexes(name).await?;
        let foreign_keys = self.source.foreign_keys(name).await?;
        let columns = self.source.columns(name).await?;
        let comment = self.source.table_comment(name).await?.unwrap_or_default();
        let table_ref = self.table_ref(name)?;

        let mut table = Table::new(name, comment);
        table.unique_keys = unique_keys.clone();
        table.keys = indexes.into_iter().map(|i| i.columns).collect();
        self.model.add_table(table);

        for fk in foreign_keys {
            // drivers report the crawled namespace as None
            let ref_schema = fk.ref_schema.or_else(|| self.model.schema.clone());
            for (column, ref_column) in fk.columns.into_iter().zip(fk.ref_columns) {
                self.model.add_foreign_key(ForeignKey {
                    table: name.to_string(),
                    column,
                    ref_schema: ref_schema.clone(),
                    ref_table: fk.ref_table.clone(),
                    ref_column,
                });
            }
        }

        for col in columns {
            let examples = self.sample_examples(name, &table_ref, &col.name).await;

            let primary_key = pk.contains(&col.name);
            let unique = (primary_key && pk.len() == 1)
                || unique_keys
                    .iter()
                    .any(|u| u.len() == 1 && u[0] == col.name);

            let mut field = Field::new(col.name, col.raw_type);
            field.primary_key = primary_key;
            field.nullable = col.nullable;
            field.default = col.default;
            field.autoincrement = col.autoincrement;
            field.unique = unique;
            field.comment = col.comment.unwrap_or_default();
            field.examples = examples;
            self.model.add_field(name, field)?;
        }

        debug!(
            "Loaded table {} ({} fields)",
            name,
            self.model.table(name).map(|t| t.fields.len()).unwrap_or(0)
        );
        Ok(())
    }

    /// Up to `sample_size` distinct non-null values; a failing query yields none.
    async fn sample_examples(&self, table: &str, table_ref: &str, column: &str) -> Vec<String> {
        let sql = match self.dialect.build_distinct_query(
            table_ref,
            column,
            Some(self.options.sample_size),
        ) {
            Ok(sql) => sql,
            Err(e) => {
                warn!("{}: {}", CrawlError::SamplingFailed { table: table.into(), field: column.into() }, e);
                return Vec::new();
            }
        };

        match self.source.query(&sql).await {
            Ok(res) => res.first_column(),
            Err(e) => {
                warn!("{}: {}", CrawlError::SamplingFailed { table: table.into(), field: column.into() }, e);
                Vec::new()
            }
        }
    }

    /// Run a statement with a time budget.
    ///
    /// The statement runs on its own task. On timeout the task is left
    /// running detached and `false` is returned; errors also yield `false`.
    pub async fn execute_with_timeout(&self, sql: &str, timeout: Duration) -> bool {
        let source = Arc::clone(&self.source);
        let statement = sql.to_string();
        let handle = tokio::spawn(async move { source.execute(&statement).await });

        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(Ok(()))) => true,
            Ok(Ok(Err(e))) => {
                error!("Statement failed: {}", e.format_detailed());
                false
            }
            Ok(Err(e)) => {
                error!("Statement task failed: {}", e);
                false
            }
            Err(_) => {
                error!(
                    "{}",
                    CrawlError::Timeout {
                        seconds: timeout.as_secs(),
                        statement: sql.to_string(),
                    }
                );
                warn!("Timed-out statement is still running in the background: {}", sql);
                false
            }
        }
    }

    /// Run a statement with the configured time budget.
    pub async fn execute(&self, sql: &str) -> bool {
        self.execute_with_timeout(sql, self.options.statement_timeout)
            .await
    }

    /// Introspect (unless a model was supplied), classify, enrich and save.
    ///
    /// Interruption is not an error: the model is saved and the report says
    /// `interrupted`.
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<CrawlReport> {
        let started_at = Utc::now();
        let calls_before = self.responder_calls();
        self.counters = RunCounters::default();

        info!(
            "Starting crawl of {} ({})",
            self.options.db_id,
            self.dialect.name()
        );

        if self.populated {
            info!("Phase 1: Using supplied schema model");
        } else {
            info!("Phase 1: Introspecting schema");
            self.introspect().await?;
        }

        info!("Phase 2: Classifying fields");
        let mut progress = self.classify_fields(cancel).await?;

        if progress.is_interrupted() {
            warn!("Classification interrupted; skipping description enrichment");
        } else {
            info!(
                "Phase 3: Enriching descriptions (mode: {:?})",
                self.options.comment_mode
            );
            progress = self
                .enrich_descriptions(self.options.comment_mode, cancel)
                .await?;
        }

        info!("Phase 4: Saving schema model to {:?}", self.options.schema_file);
        self.model.save(&self.options.schema_file)?;

        let completed_at = Utc::now();
        let duration = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;
        let interrupted = progress.is_interrupted();
        let fields_unclassified = self
            .model
            .tables
            .values()
            .flat_map(|t| t.fields.values())
            .filter(|f| !f.is_classified())
            .count();

        let report = CrawlReport {
            db_id: self.model.db_id.clone(),
            dialect: self.dialect.name().to_string(),
            status: if interrupted { "interrupted" } else { "completed" }.to_string(),
            started_at,
            completed_at,
            duration_seconds: duration,
            tables_total: self.model.tables.len(),
            fields_total: self.model.field_count(),
            fields_classified: self.counters.fields_classified,
            fields_restored: self.counters.fields_restored,
            fields_unclassified,
            descriptions_generated: self.counters.descriptions_generated,
            descriptions_restored: self.counters.descriptions_restored,
            responder_calls: self.responder_calls() - calls_before,
            comment_mode: self.options.comment_mode,
            schema_file: self.options.schema_file.display().to_string(),
            interrupted,
        };

        info!(
            "Crawl {}: {} tables, {} fields ({} classified, {} restored) in {:.2}s",
            report.status,
            report.tables_total,
            report.fields_total,
            report.fields_classified,
            report.fields_restored,
            report.duration_seconds
        );
        Ok(report)
    }

    /// `SELECT 1` round trip.
    pub async fn health_check(&self) -> HealthCheckResult {
        let start = Instant::now();
        let outcome = self.source.ping().await;
        let latency_ms = start.elapsed().as_millis() as u64;

        let (connected, error) = match outcome {
            Ok(()) => (true, None),
            Err(e) => (false, Some(e.to_string())),
        };
        HealthCheckResult {
            dialect: self.dialect.name().to_string(),
            connected,
            latency_ms,
            error,
            healthy: connected,
        }
    }

    /// Close the underlying connection pool.
    pub async fn close(&self) {
        self.source.close().await;
    }
}

#[cfg(test)]
pub(crate) mod testing;
