//! Per-field statistics, value sampling and the field context text.
//!
//! Statistics are best effort: a failing statement is logged at debug level
//! and reported as unknown (-1 or `None`), never as an error.

use tracing::debug;

use super::SchemaCrawler;
use crate::core::identifier::quote_literal;
use crate::core::schema::NotFound;
use crate::core::traits::Dialect;
use crate::error::{CrawlError, Result};
use crate::typemap::{Label, StructuralCategory};

/// Longest cell rendered in context text and markdown samples.
const MAX_CELL_CHARS: usize = 30;

/// Values listed in a field context.
const CONTEXT_EXAMPLES: usize = 10;

/// Aggregate function applied to a column or its character length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Max,
    Min,
    Avg,
}

impl Aggregate {
    pub fn sql(&self) -> &'static str {
        match self {
            Aggregate::Max => "MAX",
            Aggregate::Min => "MIN",
            Aggregate::Avg => "AVG",
        }
    }
}

/// Shorten `value` to at most `max_chars` characters, cutting at the last
/// space of the kept prefix and appending `...`.
pub fn truncate_cell(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let kept: String = value.chars().take(max_chars.saturating_sub(3)).collect();
    let cut = match kept.rfind(' ') {
        Some(i) => &kept[..i],
        None => kept.as_str(),
    };
    format!("{}...", cut)
}

fn parse_count(raw: Option<&str>) -> Option<i64> {
    let raw = raw?.trim();
    raw.parse::<i64>()
        .ok()
        .or_else(|| raw.parse::<f64>().ok().map(|v| v as i64))
}

impl SchemaCrawler {
    /// Run a single-value statistic query.
    async fn statistic(&self, table: &str, field: &str, op: &str, sql: Result<String>) -> Option<String> {
        let outcome = match sql {
            Ok(sql) => self.source.query(&sql).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(res) => res.scalar().map(str::to_string),
            Err(e) => {
                debug!("{}: {}", CrawlError::statistic(table, field, op), e);
                None
            }
        }
    }

    /// `COUNT(field)`; -1 when unavailable.
    pub async fn count(&self, table: &str, field: &str) -> i64 {
        let sql = self
            .table_ref(table)
            .and_then(|t| self.dialect.build_count_query(&t, field, false));
        parse_count(self.statistic(table, field, "COUNT", sql).await.as_deref()).unwrap_or(-1)
    }

    /// `COUNT(DISTINCT field)`; -1 when unavailable.
    pub async fn count_distinct(&self, table: &str, field: &str) -> i64 {
        let sql = self
            .table_ref(table)
            .and_then(|t| self.dialect.build_count_query(&t, field, true));
        parse_count(
            self.statistic(table, field, "COUNT(DISTINCT)", sql)
                .await
                .as_deref(),
        )
        .unwrap_or(-1)
    }

    /// Aggregate over non-null values of a Number field; `None` for other
    /// fields or when unavailable.
    pub async fn aggregate(&self, table: &str, field: &str, func: Aggregate) -> Option<String> {
        let structural = self.model.field(table, field)?.structural_category;
        if structural != StructuralCategory::Number {
            return None;
        }
        let sql = self
            .table_ref(table)
            .and_then(|t| self.dialect.build_aggregate_query(&t, field, func.sql()));
        self.statistic(table, field, func.sql(), sql).await
    }

    /// Aggregate over the character length of non-null values; -1 when
    /// unavailable.
    pub async fn aggregate_char_length(&self, table: &str, field: &str, func: Aggregate) -> i64 {
        let op = format!("{}(CHAR_LENGTH)", func.sql());
        let sql = self
            .table_ref(table)
            .and_then(|t| self.dialect.build_char_length_query(&t, field, func.sql()));
        parse_count(self.statistic(table, field, &op, sql).await.as_deref()).unwrap_or(-1)
    }

    /// Distinct non-null values, each truncated to `max_chars`. Empty when
    /// the query fails.
    pub async fn value_examples(
        &self,
        table: &str,
        field: &str,
        max_rows: Option<usize>,
        max_chars: usize,
    ) -> Vec<String> {
        let sql = match self
            .table_ref(table)
            .and_then(|t| self.dialect.build_distinct_query(&t, field, max_rows))
        {
            Ok(sql) => sql,
            Err(e) => {
                debug!("{}: {}", CrawlError::SamplingFailed { table: table.into(), field: field.into() }, e);
                return Vec::new();
            }
        };

        match self.source.query(&sql).await {
            Ok(res) => res
                .first_column()
                .iter()
                .map(|v| truncate_cell(v, max_chars))
                .filter(|v| !v.is_empty())
                .collect(),
            Err(e) => {
                debug!("{}: {}", CrawlError::SamplingFailed { table: table.into(), field: field.into() }, e);
                Vec::new()
            }
        }
    }

    /// Whether any row has `field = value`, compared as a string literal.
    pub async fn value_exists(&self, table: &str, field: &str, value: &str) -> bool {
        let sql = quote_literal(value).and_then(|literal| {
            self.table_ref(table)
                .and_then(|t| self.dialect.build_value_exists_query(&t, field, &literal))
        });
        parse_count(self.statistic(table, field, "EXISTS", sql).await.as_deref())
            .is_some_and(|n| n > 0)
    }

    /// `SELECT DISTINCT * FROM table LIMIT max_rows` for this dialect.
    pub fn sample_rows_query(&self, table: &str, max_rows: usize) -> Result<String> {
        Ok(self
            .dialect
            .build_sample_rows_query(&self.table_ref(table)?, max_rows))
    }

    /// Sample rows of `table` as a markdown table; empty when there are no
    /// rows or the query fails.
    pub async fn sample_rows_markdown(&self, table: &str, max_rows: usize) -> String {
        match self.sample_rows_query(table, max_rows) {
            Ok(sql) => self.query_markdown(&sql).await,
            Err(e) => {
                debug!("Cannot sample rows of {}: {}", table, e);
                String::new()
            }
        }
    }

    /// Run `sql` and render the result as a markdown table.
    pub(super) async fn query_markdown(&self, sql: &str) -> String {
        let res = match self.source.query(sql).await {
            Ok(res) => res,
            Err(e) => {
                debug!("Sample query failed: {}", e);
                return String::new();
            }
        };
        if res.rows.is_empty() {
            return String::new();
        }

        let mut lines = Vec::with_capacity(res.rows.len() + 2);
        lines.push(format!("| {} |", res.columns.join(" | ")));
        lines.push(format!(
            "| {} |",
            vec!["---"; res.columns.len()].join(" | ")
        ));
        for row in &res.rows {
            let cells: Vec<String> = row
                .iter()
                .map(|c| match c {
                    Some(v) => truncate_cell(v, MAX_CELL_CHARS),
                    None => "None".to_string(),
                })
                .collect();
            lines.push(format!("| {} |", cells.join(" | ")));
        }
        lines.join("\n")
    }

    /// Context text describing one field: declared facts, statistics,
    /// enrichment so far and a few values. Unknown statistics are omitted.
    pub async fn build_field_context(&self, table: &str, field: &str) -> Result<String> {
        let f = self.model.field(table, field).ok_or_else(|| NotFound::Field {
            table: table.to_string(),
            field: field.to_string(),
        })?;
        let raw_type = f.raw_type.clone();
        let comment = f.comment.trim().to_string();
        let primary_key = f.primary_key;
        let unique = f.unique || f.primary_key;
        let nullable = f.nullable;
        let axis = f.dimension_or_measure;
        let granularity = f.date_min_granularity;

        let total = self.count(table, field).await;
        let distinct = self.count_distinct(table, field).await;
        let max = self.aggregate(table, field, Aggregate::Max).await;
        let min = self.aggregate(table, field, Aggregate::Min).await;
        let avg = self.aggregate(table, field, Aggregate::Avg).await;
        let max_len = self.aggregate_char_length(table, field, Aggregate::Max).await;
        let min_len = self.aggregate_char_length(table, field, Aggregate::Min).await;

        let mut lines = vec![
            "【Field Info】".to_string(),
            format!("Field Name: {}", field),
            format!("Field Type: {}", raw_type),
        ];
        if !comment.is_empty() {
            lines.push(format!("Field Description: {}", comment));
        }
        lines.push(format!(
            "Primary Key (or part of a composite primary key): {}",
            primary_key
        ));
        lines.push(format!("UNIQUE: {}", unique));
        lines.push(format!("NULLABLE: {}", nullable));
        if total >= 0 {
            lines.push(format!("COUNT: {}", total));
        }
        if distinct >= 0 {
            lines.push(format!("COUNT(DISTINCT): {}", distinct));
        }
        if let Some(v) = max {
            lines.push(format!("MAX: {}", v));
        }
        if let Some(v) = min {
            lines.push(format!("MIN: {}", v));
        }
        if let Some(v) = avg {
            lines.push(format!("AVG: {}", v));
        }
        if max_len >= 0 {
            lines.push(format!("MAX(CHAR_LENGTH): {}", max_len));
        }
        if min_len >= 0 {
            lines.push(format!("MIN(CHAR_LENGTH): {}", min_len));
        }
        if let Some(axis) = axis {
            lines.push(format!("Dimension/Measure: {}", axis.label()));
        }
        if let Some(g) = granularity {
            lines.push(format!(
                "This field likely relates to dates or times; its inferred minimum time granularity is: {}",
                g.label()
            ));
        }

        let examples = self
            .value_examples(table, field, Some(CONTEXT_EXAMPLES), MAX_CELL_CHARS)
            .await;
        if !examples.is_empty() {
            lines.push(format!("Value Examples: [{}]", examples.join(", ")));
        }

        Ok(lines.join("\n"))
    }
}
