//! Configuration type definitions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database to crawl.
    pub database: DatabaseConfig,

    /// Introspection and statistics behavior.
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Description enrichment behavior.
    #[serde(default)]
    pub enrichment: EnrichmentConfig,

    /// Output file locations.
    #[serde(default)]
    pub output: OutputConfig,
}

/// Connection settings for the crawled database.
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database type: "mysql", "postgres" or "sqlite".
    pub r#type: String,

    /// Database host (server engines).
    #[serde(default = "default_localhost")]
    pub host: String,

    /// Database port; 0 selects the engine default.
    #[serde(default)]
    pub port: u16,

    /// Database name (server engines).
    #[serde(default)]
    pub database: String,

    /// Username.
    #[serde(default)]
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Namespace to crawl (PostgreSQL only; default "public").
    #[serde(default)]
    pub schema: Option<String>,

    /// SSL mode (PostgreSQL; default "disable").
    #[serde(default = "default_disable")]
    pub ssl_mode: String,

    /// Database file (SQLite only).
    #[serde(default)]
    pub path: Option<String>,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("type", &self.r#type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("ssl_mode", &self.ssl_mode)
            .field("path", &self.path)
            .finish()
    }
}

impl DatabaseConfig {
    /// Port to connect to, falling back to the engine default.
    pub fn effective_port(&self, default_port: u16) -> u16 {
        if self.port == 0 {
            default_port
        } else {
            self.port
        }
    }
}

/// Introspection and statistics behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// Identifier used in the rendered header; defaults to the database name.
    #[serde(default)]
    pub db_id: Option<String>,

    /// Table-name globs to crawl; empty means every table.
    #[serde(default)]
    pub include_tables: Vec<String>,

    /// Table-name globs to skip.
    #[serde(default)]
    pub exclude_tables: Vec<String>,

    /// Distinct values sampled per column during introspection.
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,

    /// Examples shown per field in rendered text.
    #[serde(default = "default_example_num")]
    pub example_num: usize,

    /// Time budget for `execute_with_timeout` statements.
    #[serde(default = "default_statement_timeout")]
    pub statement_timeout_secs: u64,

    /// Connection pool size.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            db_id: None,
            include_tables: Vec::new(),
            exclude_tables: Vec::new(),
            sample_size: default_sample_size(),
            example_num: default_example_num(),
            statement_timeout_secs: default_statement_timeout(),
            max_connections: default_max_connections(),
        }
    }
}

/// Description enrichment behavior.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    #[serde(default)]
    pub comment_mode: CommentMode,

    #[serde(default)]
    pub language: Language,
}

/// How existing table and column comments are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentMode {
    /// Keep the comments stored in the database.
    #[default]
    Origin,

    /// Generate descriptions only where comments are missing.
    Merge,

    /// Discard every comment and generate all descriptions.
    Generation,

    /// Discard every comment and generate nothing.
    NoComment,
}

impl FromStr for CommentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "origin" => Ok(CommentMode::Origin),
            "merge" => Ok(CommentMode::Merge),
            "generation" => Ok(CommentMode::Generation),
            "no_comment" => Ok(CommentMode::NoComment),
            other => Err(format!(
                "unknown comment mode '{}'. Expected: origin, merge, generation, no_comment",
                other
            )),
        }
    }
}

/// Language of generated descriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Language {
    #[default]
    #[serde(rename = "EN", alias = "en")]
    En,

    #[serde(rename = "CN", alias = "cn", alias = "zh")]
    Cn,
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Language::En => "EN",
            Language::Cn => "CN",
        }
    }
}

/// Output file locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Saved schema model.
    #[serde(default = "default_schema_file")]
    pub schema_file: String,

    /// Per-field classification checkpoint.
    #[serde(default = "default_checkpoint_file")]
    pub checkpoint_file: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            schema_file: default_schema_file(),
            checkpoint_file: default_checkpoint_file(),
        }
    }
}

// Default value functions for serde
fn default_localhost() -> String {
    "localhost".to_string()
}

fn default_disable() -> String {
    "disable".to_string()
}

fn default_sample_size() -> usize {
    5
}

fn default_example_num() -> usize {
    3
}

fn default_statement_timeout() -> u64 {
    10
}

fn default_max_connections() -> u32 {
    1
}

fn default_schema_file() -> String {
    "schema.json".to_string()
}

fn default_checkpoint_file() -> String {
    "checkpoints/analysis_checkpoint.json".to_string()
}
