//! Error types for the crawler library.

use thiserror::Error;

use crate::core::schema::NotFound;

/// Main error type for crawl and enrichment operations.
#[derive(Error, Debug)]
pub enum CrawlError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database engine without a supported code path
    #[error("Unsupported dialect '{0}'. Supported dialects: mysql, postgresql, sqlite")]
    UnsupportedDialect(String),

    /// Connection or query failure with context
    #[error("Database error: {message}\n  Context: {context}")]
    Database { message: String, context: String },

    /// PostgreSQL driver error
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// A statistic query failed for one field
    #[error("Statistic {op} unavailable for {table}.{field}")]
    StatisticsUnavailable {
        table: String,
        field: String,
        op: String,
    },

    /// Distinct-value sampling failed for one field
    #[error("Sampling failed for {table}.{field}")]
    SamplingFailed { table: String, field: String },

    /// Checkpoint file could not be read or written
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// The external responder produced no answer
    #[error("No answer from responder during {step}")]
    CollaboratorUnavailable { step: String },

    /// Named table or field is absent from the schema model
    #[error(transparent)]
    NotFound(#[from] NotFound),

    /// Statement exceeded its time budget
    #[error("Statement timed out after {seconds}s: {statement}")]
    Timeout { seconds: u64, statement: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CrawlError {
    /// Create a Database error with context about where it occurred
    pub fn db(message: impl ToString, context: impl Into<String>) -> Self {
        CrawlError::Database {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a StatisticsUnavailable error
    pub fn statistic(
        table: impl Into<String>,
        field: impl Into<String>,
        op: impl Into<String>,
    ) -> Self {
        CrawlError::StatisticsUnavailable {
            table: table.into(),
            field: field.into(),
            op: op.into(),
        }
    }

    /// Process exit code used by the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            CrawlError::Config(_) | CrawlError::UnsupportedDialect(_) | CrawlError::Yaml(_) => 1,
            CrawlError::Database { .. } | CrawlError::Postgres(_) => 2,
            CrawlError::StatisticsUnavailable { .. }
            | CrawlError::SamplingFailed { .. }
            | CrawlError::NotFound(_) => 3,
            CrawlError::Checkpoint(_) | CrawlError::Json(_) => 4,
            CrawlError::CollaboratorUnavailable { .. } => 5,
            CrawlError::Timeout { .. } => 6,
            CrawlError::Io(_) => 7,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for crawl operations.
pub type Result<T> = std::result::Result<T, CrawlError>;
