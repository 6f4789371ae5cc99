//! Core traits for database-agnostic crawling.
//!
//! - [`SchemaSource`]: catalog introspection and ad-hoc queries against a live database
//! - [`Dialect`]: SQL syntax strategy for statistic and sampling statements
//!
//! Drivers implement both; the crawler only ever talks to these traits.

use async_trait::async_trait;

use crate::error::Result;

/// Column metadata as reported by the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMeta {
    pub name: String,
    /// Declared type, e.g. `varchar(32)` or `character varying(32)`.
    pub raw_type: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub autoincrement: bool,
    pub comment: Option<String>,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, raw_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            raw_type: raw_type.into(),
            nullable: true,
            default: None,
            autoincrement: false,
            comment: None,
        }
    }
}

/// Index metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMeta {
    pub name: String,
    pub columns: Vec<String>,
    pub is_unique: bool,
}

/// One foreign-key constraint; `columns` and `ref_columns` pair up by position.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyMeta {
    pub name: String,
    pub columns: Vec<String>,
    /// `None` when the referenced table lives in the crawled namespace.
    pub ref_schema: Option<String>,
    pub ref_table: String,
    pub ref_columns: Vec<String>,
}

/// Result of an ad-hoc query with every cell rendered as text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl QueryResult {
    /// First cell of the first row, if present and not NULL.
    pub fn scalar(&self) -> Option<&str> {
        self.rows.first().and_then(|r| r.first()).and_then(|c| c.as_deref())
    }

    /// Non-NULL values of the first column.
    pub fn first_column(&self) -> Vec<String> {
        self.rows
            .iter()
            .filter_map(|r| r.first().cloned().flatten())
            .collect()
    }
}

/// Read catalog metadata and run statements against a live database.
///
/// All table arguments are bare names inside the namespace the source was
/// configured for.
#[async_trait]
pub trait SchemaSource: Send + Sync {
    /// Get the database type identifier (e.g., "mysql", "postgresql").
    fn db_type(&self) -> &str;

    /// Namespace the source reads from (PostgreSQL schema, MySQL database,
    /// `main` for SQLite).
    fn default_schema(&self) -> &str;

    /// Base tables in the namespace, sorted by name.
    async fn list_tables(&self) -> Result<Vec<String>>;

    async fn has_table(&self, table: &str) -> Result<bool> {
        Ok(self.list_tables().await?.iter().any(|t| t == table))
    }

    /// Primary-key columns in key order.
    async fn primary_key(&self, table: &str) -> Result<Vec<String>>;

    /// Column sets of unique constraints.
    async fn unique_constraints(&self, table: &str) -> Result<Vec<Vec<String>>>;

    /// Non-primary-key indexes.
    async fn indexes(&self, table: &str) -> Result<Vec<IndexMeta>>;

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyMeta>>;

    /// Columns in ordinal order.
    async fn columns(&self, table: &str) -> Result<Vec<ColumnMeta>>;

    /// Table comment; `None` on engines without comment support.
    async fn table_comment(&self, table: &str) -> Result<Option<String>>;

    /// Run a query, rendering every cell as text.
    async fn query(&self, sql: &str) -> Result<QueryResult>;

    /// Run a statement, discarding any rows.
    async fn execute(&self, sql: &str) -> Result<()>;

    /// Connection round trip.
    async fn ping(&self) -> Result<()> {
        self.query("SELECT 1").await.map(|_| ())
    }

    /// Close the connection pool.
    async fn close(&self);
}

/// SQL syntax strategy for different database engines.
///
/// Identifiers are validated before quoting, so every builder that takes a
/// name can fail.
pub trait Dialect: Send + Sync {
    /// Get the dialect identifier (e.g., "mysql", "postgresql").
    fn name(&self) -> &str;

    /// Quote an identifier (table name, column name, etc.).
    fn quote_ident(&self, name: &str) -> Result<String>;

    /// Table reference for FROM clauses.
    fn table_ref(&self, _schema: Option<&str>, table: &str) -> Result<String> {
        self.quote_ident(table)
    }

    /// Character-length expression over an already quoted column.
    fn char_length_expr(&self, quoted_column: &str) -> String;

    /// `SELECT DISTINCT c FROM t WHERE c IS NOT NULL [LIMIT n]`
    fn build_distinct_query(
        &self,
        table_ref: &str,
        column: &str,
        limit: Option<usize>,
    ) -> Result<String> {
        let col = self.quote_ident(column)?;
        let mut sql = format!(
            "SELECT DISTINCT {} FROM {} WHERE {} IS NOT NULL",
            col, table_ref, col
        );
        if let Some(n) = limit {
            sql.push_str(&format!(" LIMIT {}", n));
        }
        Ok(sql)
    }

    /// `SELECT COUNT([DISTINCT] c) FROM t`
    fn build_count_query(&self, table_ref: &str, column: &str, distinct: bool) -> Result<String> {
        let col = self.quote_ident(column)?;
        let inner = if distinct {
            format!("DISTINCT {}", col)
        } else {
            col
        };
        Ok(format!("SELECT COUNT({}) FROM {}", inner, table_ref))
    }

    /// `SELECT f(c) FROM t WHERE c IS NOT NULL`
    fn build_aggregate_query(&self, table_ref: &str, column: &str, func: &str) -> Result<String> {
        let col = self.quote_ident(column)?;
        Ok(format!(
            "SELECT {}({}) FROM {} WHERE {} IS NOT NULL",
            func, col, table_ref, col
        ))
    }

    /// `SELECT f(<char length of c>) FROM t WHERE c IS NOT NULL`
    fn build_char_length_query(
        &self,
        table_ref: &str,
        column: &str,
        func: &str,
    ) -> Result<String> {
        let col = self.quote_ident(column)?;
        Ok(format!(
            "SELECT {}({}) FROM {} WHERE {} IS NOT NULL",
            func,
            self.char_length_expr(&col),
            table_ref,
            col
        ))
    }

    /// `SELECT COUNT(*) FROM t WHERE c = <literal>`; `literal` is already quoted.
    fn build_value_exists_query(
        &self,
        table_ref: &str,
        column: &str,
        literal: &str,
    ) -> Result<String> {
        Ok(format!(
            "SELECT COUNT(*) FROM {} WHERE {} = {}",
            table_ref,
            self.quote_ident(column)?,
            literal
        ))
    }

    /// `SELECT DISTINCT * FROM t [LIMIT n]`
    fn build_sample_rows_query(&self, table_ref: &str, limit: usize) -> String {
        let mut sql = format!("SELECT DISTINCT * FROM {}", table_ref);
        if limit > 0 {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_result_helpers() {
        let res = QueryResult {
            columns: vec!["v".into()],
            rows: vec![vec![Some("a".into())], vec![None], vec![Some("b".into())]],
        };
        assert_eq!(res.scalar(), Some("a"));
        assert_eq!(res.first_column(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(QueryResult::default().scalar(), None);
    }

    #[test]
    fn test_column_meta_defaults() {
        let col = ColumnMeta::new("id", "INTEGER");
        assert!(col.nullable);
        assert!(!col.autoincrement);
        assert!(col.comment.is_none());
    }
}
