//! Configuration validation.

use super::Config;
use crate::drivers::common::SslMode;
use crate::error::{CrawlError, Result};
use crate::typemap::DatabaseKind;

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    let db = &config.database;
    let kind = db.kind()?;

    // Server engines need somewhere to connect to
    if kind != DatabaseKind::Sqlite {
        if db.host.is_empty() {
            return Err(CrawlError::Config("database.host is required".into()));
        }
        if db.database.is_empty() {
            return Err(CrawlError::Config("database.database is required".into()));
        }
        if db.user.is_empty() {
            return Err(CrawlError::Config("database.user is required".into()));
        }
    }

    if kind == DatabaseKind::Postgres {
        SslMode::parse(&db.ssl_mode)?;
    } else if db.schema.as_deref().is_some_and(|s| !s.is_empty()) {
        return Err(CrawlError::Config(format!(
            "database.schema is only supported for postgres, not '{}'",
            db.r#type
        )));
    }

    let crawler = &config.crawler;
    if crawler.statement_timeout_secs == 0 {
        return Err(CrawlError::Config(
            "crawler.statement_timeout_secs must be at least 1".into(),
        ));
    }
    if crawler.max_connections == 0 {
        return Err(CrawlError::Config(
            "crawler.max_connections must be at least 1".into(),
        ));
    }
    if crawler
        .include_tables
        .iter()
        .chain(crawler.exclude_tables.iter())
        .any(|p| p.trim().is_empty())
    {
        return Err(CrawlError::Config(
            "crawler.include_tables/exclude_tables cannot contain empty patterns".into(),
        ));
    }

    if config.output.schema_file.is_empty() {
        return Err(CrawlError::Config("output.schema_file is required".into()));
    }
    if config.output.checkpoint_file.is_empty() {
        return Err(CrawlError::Config(
            "output.checkpoint_file is required".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        CrawlerConfig, DatabaseConfig, EnrichmentConfig, OutputConfig,
    };

    fn valid_config() -> Config {
        Config {
            database: DatabaseConfig {
                r#type: "postgres".to_string(),
                host: "localhost".to_string(),
                port: 5432,
                database: "sales".to_string(),
                user: "postgres".to_string(),
                password: "password".to_string(),
                schema: Some("public".to_string()),
                ssl_mode: "disable".to_string(),
                path: None,
            },
            crawler: CrawlerConfig::default(),
            enrichment: EnrichmentConfig::default(),
            output: OutputConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_missing_host() {
        let mut config = valid_config();
        config.database.host = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_sqlite_needs_no_server_fields() {
        let mut config = valid_config();
        config.database.r#type = "sqlite".to_string();
        config.database.host.clear();
        config.database.database.clear();
        config.database.user.clear();
        config.database.schema = None;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_schema_rejected_for_mysql() {
        let mut config = valid_config();
        config.database.r#type = "mysql".to_string();
        assert!(validate(&config).is_err());
        config.database.schema = None;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_bad_ssl_mode() {
        let mut config = valid_config();
        config.database.ssl_mode = "sometimes".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_timeout() {
        let mut config = valid_config();
        config.crawler.statement_timeout_secs = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_empty_pattern() {
        let mut config = valid_config();
        config.crawler.exclude_tables = vec!["  ".to_string()];
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_unsupported_type() {
        let mut config = valid_config();
        config.database.r#type = "mssql".to_string();
        assert!(matches!(
            validate(&config),
            Err(CrawlError::UnsupportedDialect(_))
        ));
    }

    #[test]
    fn test_database_config_debug_redacts_password() {
        let mut config = valid_config();
        config.database.password = "super_secret_password_123".to_string();
        let debug_output = format!("{:?}", config.database);
        assert!(
            debug_output.contains("[REDACTED]"),
            "Debug output should contain [REDACTED]"
        );
        assert!(
            !debug_output.contains("super_secret_password_123"),
            "Debug output should not contain actual password value"
        );
    }
}
