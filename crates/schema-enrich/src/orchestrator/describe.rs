//! Description enrichment pass.
//!
//! Comment modes:
//!
//! | mode         | existing comments | generation          |
//! |--------------|-------------------|---------------------|
//! | `origin`     | kept              | none                |
//! | `no_comment` | erased            | none                |
//! | `generation` | erased            | every table/field   |
//! | `merge`      | kept              | only empty comments |
//!
//! Every generated description is checkpointed as soon as it is written, so
//! a rerun after an interruption restores them instead of asking again.
//! Empty answers are not recorded and stay eligible on the next run.

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{Progress, SchemaCrawler};
use crate::config::{CommentMode, Language};
use crate::core::render::RenderOptions;
use crate::core::schema::FieldProperty;
use crate::state::{DescriptionCheckpoint, TABLE_DESCRIPTION_KEY};
use crate::error::Result;
use crate::responder::{PromptArgs, PromptKind};
use crate::typemap::{Axis, Label};

/// Tables whose comment is shorter than this get a generated description.
const MIN_TABLE_COMMENT_CHARS: usize = 10;

/// Examples per field in the per-table schema text.
const TABLE_EXAMPLES: usize = 3;

/// Rows in the per-table sample.
const SAMPLE_ROWS: usize = 10;

/// Wrappers removed when they enclose the whole answer.
const QUOTE_PAIRS: [(&str, &str); 5] = [
    ("**", "**"),
    ("\"", "\""),
    ("'", "'"),
    ("“", "”"),
    ("‘", "’"),
];

/// Normalize a free-text answer into a one-line description.
///
/// Strips a leading colon, quote or bold pairs enclosing the whole text,
/// everything after the first line and one trailing period.
pub fn clean_answer(answer: &str) -> String {
    let mut text = answer.trim();
    text = text
        .strip_prefix(':')
        .or_else(|| text.strip_prefix('：'))
        .unwrap_or(text)
        .trim();
    text = text.lines().next().unwrap_or("").trim();

    let mut period_dropped = false;
    if let Some(rest) = strip_period(text) {
        text = rest;
        period_dropped = true;
    }
    while let Some(inner) = unwrap_quotes(text) {
        text = inner.trim();
    }

    if !period_dropped {
        text = strip_period(text).unwrap_or(text);
    }
    text.trim().to_string()
}

/// Content of `text` when one matching pair encloses all of it.
fn unwrap_quotes(text: &str) -> Option<&str> {
    QUOTE_PAIRS.iter().find_map(|(open, close)| {
        if text.len() < open.len() + close.len() {
            return None;
        }
        text.strip_prefix(*open)?.strip_suffix(*close)
    })
}

fn strip_period(text: &str) -> Option<&str> {
    text.strip_suffix('.').or_else(|| text.strip_suffix('。'))
}

/// Pull a description out of an answer that may be a JSON object.
///
/// A JSON object (bare or wrapped in other text) yields the first string
/// value among `keys`, or nothing. Any other answer is cleaned as free text.
pub fn extract_answer(answer: &str, keys: &[&str]) -> String {
    match json_object(answer) {
        Some(object) => keys
            .iter()
            .find_map(|k| object.get(*k).and_then(Value::as_str))
            .map(clean_answer)
            .unwrap_or_default(),
        None => clean_answer(answer),
    }
}

fn json_object(answer: &str) -> Option<serde_json::Map<String, Value>> {
    let trimmed = answer.trim();
    let candidate = match serde_json::from_str::<Value>(trimmed) {
        Ok(v) => v,
        Err(_) => {
            let start = trimmed.find('{')?;
            let end = trimmed.rfind('}')?;
            if end <= start {
                return None;
            }
            serde_json::from_str::<Value>(&trimmed[start..=end]).ok()?
        }
    };
    match candidate {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

fn column_keys(language: Language) -> &'static [&'static str] {
    match language {
        Language::En => &["english_desc", "description"],
        Language::Cn => &["chinese_name", "description"],
    }
}

impl SchemaCrawler {
    /// Apply `mode` to the model's comments, generating descriptions where
    /// the mode asks for them.
    pub async fn enrich_descriptions(
        &mut self,
        mode: CommentMode,
        cancel: &CancellationToken,
    ) -> Result<Progress> {
        match mode {
            CommentMode::Origin => {
                info!("Keeping database comments");
                return Ok(Progress::Completed);
            }
            CommentMode::NoComment => {
                self.model.erase_all_comments();
                info!("Erased all comments");
                return Ok(Progress::Completed);
            }
            CommentMode::Generation => self.model.erase_all_comments(),
            CommentMode::Merge => {}
        }
        self.generate_descriptions(cancel).await
    }

    /// Summary of the whole database plus domain knowledge, stored as
    /// `db_info`.
    async fn understand_database(&mut self) -> String {
        let db_mschema = self.model.render(&RenderOptions {
            example_num: self.options.example_num,
            ..Default::default()
        });
        let summary = self
            .ask(
                PromptKind::UnderstandDatabase,
                &PromptArgs::new().with("db_mschema", db_mschema),
            )
            .await;
        let domain = self
            .ask(
                PromptKind::DomainKnowledge,
                &PromptArgs::new().with("db_info", summary.as_str()),
            )
            .await;

        let db_info = format!("{}\n{}", summary, domain).trim().to_string();
        self.model.db_info = if db_info.is_empty() {
            None
        } else {
            Some(db_info.clone())
        };
        db_info
    }

    /// Checkpointed description for a field, or for the table itself under
    /// [`TABLE_DESCRIPTION_KEY`].
    fn saved_description(&self, table: &str, unit: &str) -> Option<String> {
        let value = self.descriptions.entry(table, unit)?;
        match DescriptionCheckpoint::from_value(value) {
            Ok(saved) if !saved.description.is_empty() => Some(saved.description),
            Ok(_) => None,
            Err(e) => {
                warn!("Unreadable description checkpoint for {}.{}: {}", table, unit, e);
                None
            }
        }
    }

    fn save_description(&mut self, table: &str, unit: &str, description: &str) {
        match DescriptionCheckpoint::new(description).to_value() {
            Ok(value) => self.descriptions.save(table, unit, value),
            Err(e) => warn!("Cannot checkpoint description of {}.{}: {}", table, unit, e),
        }
    }

    /// Re-apply checkpointed descriptions to the empty comments of `table`.
    fn restore_descriptions(&mut self, table: &str, fields: &[String]) {
        for field in fields {
            let empty = self
                .model
                .field(table, field)
                .is_some_and(|f| f.comment.trim().is_empty());
            if !empty {
                continue;
            }
            if let Some(saved) = self.saved_description(table, field) {
                if self
                    .model
                    .set_field_property(table, field, FieldProperty::Comment(saved))
                    .is_ok()
                {
                    self.counters.descriptions_restored += 1;
                    debug!("Restored description of {}.{}", table, field);
                }
            }
        }

        let short = self
            .model
            .table(table)
            .is_some_and(|t| t.comment.chars().count() < MIN_TABLE_COMMENT_CHARS);
        if short {
            if let Some(saved) = self.saved_description(table, TABLE_DESCRIPTION_KEY) {
                if self.model.set_table_comment(table, saved).is_ok() {
                    self.counters.descriptions_restored += 1;
                    debug!("Restored description of table {}", table);
                }
            }
        }
    }

    async fn generate_descriptions(&mut self, cancel: &CancellationToken) -> Result<Progress> {
        if cancel.is_cancelled() {
            return Ok(Progress::Interrupted);
        }
        let db_info = self.understand_database().await;
        let language = self.options.language;

        let tables: Vec<String> = self.model.tables.keys().cloned().collect();
        let total = tables.len();

        for (idx, table) in tables.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!("Cancelled before describing table {}", table);
                return Ok(Progress::Interrupted);
            }

            let fields: Vec<String> = self
                .model
                .table(table)
                .map(|t| t.fields.keys().cloned().collect())
                .unwrap_or_default();
            self.restore_descriptions(table, &fields);

            let pending: Vec<String> = fields
                .iter()
                .filter(|f| {
                    self.model
                        .field(table, f)
                        .is_some_and(|f| f.comment.trim().is_empty())
                })
                .cloned()
                .collect();
            let need_table_comment = self
                .model
                .table(table)
                .is_some_and(|t| t.comment.chars().count() < MIN_TABLE_COMMENT_CHARS);
            if pending.is_empty() && !need_table_comment {
                debug!("Table {} already described", table);
                continue;
            }
            info!("Describing table {}/{}: {}", idx + 1, total, table);

            let table_mschema = self
                .model
                .render_table(table, TABLE_EXAMPLES, false)
                .unwrap_or_default();
            let (sql, sql_res) = match self.sample_rows_query(table, SAMPLE_ROWS) {
                Ok(sql) => {
                    let res = self.query_markdown(&sql).await;
                    (sql, res)
                }
                Err(e) => {
                    debug!("No sample rows for {}: {}", table, e);
                    (String::new(), String::new())
                }
            };

            let mut axis_notes: Vec<(Axis, String)> = Vec::new();
            if !pending.is_empty() {
                for axis in [Axis::Dimension, Axis::Measure] {
                    let fields = self.model.fields_by_axis(axis, table);
                    if fields.is_empty() {
                        continue;
                    }
                    let args = PromptArgs::new()
                        .with("db_info", db_info.as_str())
                        .with("table_name", table.as_str())
                        .with("table_mschema", table_mschema.as_str())
                        .with("sql", sql.as_str())
                        .with("sql_res", sql_res.as_str())
                        .with("fields", fields.join(", "))
                        .with("category", axis.label());
                    let answer = self.ask(PromptKind::UnderstandFieldsByAxis, &args).await;
                    axis_notes.push((axis, answer));
                }
            }

            for field in &pending {
                if cancel.is_cancelled() {
                    warn!("Cancelled before describing {}.{}", table, field);
                    return Ok(Progress::Interrupted);
                }
                let Some(f) = self.model.field(table, field) else {
                    continue;
                };
                let supp_info = f
                    .dimension_or_measure
                    .and_then(|axis| axis_notes.iter().find(|(a, _)| *a == axis))
                    .map(|(_, note)| note.clone())
                    .unwrap_or_default();

                let field_info = match self.build_field_context(table, field).await {
                    Ok(info) => info,
                    Err(e) => {
                        warn!("Skipping description of {}.{}: {}", table, field, e);
                        continue;
                    }
                };
                let args = PromptArgs::new()
                    .with("table_mschema", table_mschema.as_str())
                    .with("sql", sql.as_str())
                    .with("sql_res", sql_res.as_str())
                    .with("field_name", field.as_str())
                    .with("field_info", field_info)
                    .with("supp_info", supp_info)
                    .with("language", language.code());
                let answer = self.ask(PromptKind::ColumnDescription, &args).await;
                let description = extract_answer(&answer, column_keys(language));
                if description.is_empty() {
                    debug!("No description for {}.{}", table, field);
                    continue;
                }
                if self
                    .model
                    .set_field_property(table, field, FieldProperty::Comment(description.clone()))
                    .is_ok()
                {
                    self.save_description(table, field, &description);
                    self.counters.descriptions_generated += 1;
                }
            }

            if need_table_comment {
                if cancel.is_cancelled() {
                    warn!("Cancelled before describing table {}", table);
                    return Ok(Progress::Interrupted);
                }
                // column descriptions are part of the table text now
                let table_mschema = self
                    .model
                    .render_table(table, TABLE_EXAMPLES, false)
                    .unwrap_or_default();
                let args = PromptArgs::new()
                    .with("table_name", table.as_str())
                    .with("table_mschema", table_mschema)
                    .with("sql", sql.as_str())
                    .with("sql_res", sql_res.as_str())
                    .with("language", language.code());
                let answer = self.ask(PromptKind::TableDescription, &args).await;
                let description = extract_answer(&answer, &["table_desc", "description"]);
                if description.is_empty() {
                    debug!("No description for table {}", table);
                } else if self.model.set_table_comment(table, description.clone()).is_ok() {
                    self.save_description(table, TABLE_DESCRIPTION_KEY, &description);
                    self.counters.descriptions_generated += 1;
                }
            }
        }

        Ok(Progress::Completed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::TempDir;

    use super::*;
    use crate::core::schema::{Database, Field, Table};
    use crate::orchestrator::testing::{CountingResponder, MockSource};
    use crate::orchestrator::CrawlerOptions;
    use crate::typemap::{DatabaseKind, SemanticCategory};

    #[test]
    fn test_clean_answer() {
        assert_eq!(clean_answer("  Customer email address.  "), "Customer email address");
        assert_eq!(clean_answer(": \"Order total\""), "Order total");
        assert_eq!(clean_answer("：“订单金额”。"), "订单金额");
        assert_eq!(clean_answer("**Signup time**"), "Signup time");
        assert_eq!(clean_answer("First line.\nSecond line."), "First line");
        assert_eq!(clean_answer("The user's name"), "The user's name");
        assert_eq!(clean_answer("Version 1.2.3."), "Version 1.2.3");
        assert_eq!(clean_answer("   "), "");
        assert_eq!(clean_answer("'Account status'"), "Account status");
    }

    #[test]
    fn test_clean_answer_keeps_unpaired_apostrophes() {
        assert_eq!(
            clean_answer("Orders placed by customers'"),
            "Orders placed by customers'"
        );
        assert_eq!(clean_answer("'Tis the season"), "'Tis the season");
        assert_eq!(clean_answer("\"Customers' orders\"."), "Customers' orders");
        assert_eq!(clean_answer("**Bold** label"), "**Bold** label");
        assert_eq!(clean_answer("'"), "'");
    }

    #[test]
    fn test_extract_answer_from_json() {
        let keys = column_keys(Language::En);
        assert_eq!(
            extract_answer(r#"{"english_desc": "Login name.", "chinese_name": "登录名"}"#, keys),
            "Login name"
        );
        assert_eq!(
            extract_answer(
                "```json\n{\"chinese_name\": \"登录名\"}\n```",
                column_keys(Language::Cn)
            ),
            "登录名"
        );
        // an object without a usable key yields nothing
        assert_eq!(extract_answer(r#"{"other": "x"}"#, keys), "");
        assert_eq!(extract_answer("plain text", keys), "plain text");
        assert_eq!(extract_answer("[1, 2]", keys), "[1, 2]");
    }

    fn commented_model() -> Database {
        let mut db = Database::new("shop", None, Some(DatabaseKind::Postgres));
        db.add_table(Table::new("users", "Registered customer accounts"));
        let mut id = Field::new("id", "INTEGER");
        id.primary_key = true;
        id.comment = "Surrogate key".to_string();
        db.add_field("users", id).unwrap();
        db.add_field("users", Field::new("nickname", "TEXT")).unwrap();
        db.add_table(Table::new("tags", ""));
        db.add_field("tags", Field::new("label", "TEXT")).unwrap();
        db
    }

    fn crawler(dir: &TempDir, responder: Arc<CountingResponder>) -> SchemaCrawler {
        let options = CrawlerOptions {
            schema_file: dir.path().join("schema.json"),
            checkpoint_file: dir.path().join("checkpoint.json"),
            ..Default::default()
        };
        SchemaCrawler::new(Arc::new(MockSource::new("postgresql")), responder, options)
            .unwrap()
            .with_model(commented_model())
    }

    #[tokio::test]
    async fn test_origin_keeps_comments_without_calls() {
        let dir = TempDir::new().unwrap();
        let responder = Arc::new(CountingResponder::default().fallback("generated"));
        let mut crawler = crawler(&dir, responder.clone());
        let progress = crawler
            .enrich_descriptions(CommentMode::Origin, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(progress, Progress::Completed);
        assert_eq!(responder.total_calls(), 0);
        assert_eq!(crawler.model().table("users").unwrap().comment, "Registered customer accounts");
    }

    #[tokio::test]
    async fn test_no_comment_erases_without_calls() {
        let dir = TempDir::new().unwrap();
        let responder = Arc::new(CountingResponder::default().fallback("generated"));
        let mut crawler = crawler(&dir, responder.clone());
        crawler
            .enrich_descriptions(CommentMode::NoComment, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(responder.total_calls(), 0);
        let users = crawler.model().table("users").unwrap();
        assert_eq!(users.comment, "");
        assert_eq!(users.field("id").unwrap().comment, "");
    }

    #[tokio::test]
    async fn test_merge_fills_only_gaps() {
        let dir = TempDir::new().unwrap();
        let responder = Arc::new(
            CountingResponder::default()
                .answer(PromptKind::ColumnDescription, "nickname", "\"Display name.\"")
                .answer_all(PromptKind::TableDescription, r#"{"table_desc": "Free-form tags"}"#)
                .answer_all(PromptKind::UnderstandDatabase, "A shop.")
                .answer_all(PromptKind::DomainKnowledge, "Retail."),
        );
        let mut crawler = crawler(&dir, responder.clone());
        crawler
            .enrich_descriptions(CommentMode::Merge, &CancellationToken::new())
            .await
            .unwrap();

        let model = crawler.model();
        assert_eq!(model.db_info.as_deref(), Some("A shop.\nRetail."));
        let users = model.table("users").unwrap();
        assert_eq!(users.comment, "Registered customer accounts");
        assert_eq!(users.field("id").unwrap().comment, "Surrogate key");
        assert_eq!(users.field("nickname").unwrap().comment, "Display name");
        assert_eq!(model.table("tags").unwrap().comment, "Free-form tags");
        // tags.label got the empty fallback answer
        assert_eq!(model.field("tags", "label").unwrap().comment, "");

        // one table description (tags) and one column per empty comment
        assert_eq!(responder.calls_for(PromptKind::TableDescription), 1);
        assert_eq!(responder.calls_for(PromptKind::ColumnDescription), 2);
        // nothing classified, so no axis groups
        assert_eq!(responder.calls_for(PromptKind::UnderstandFieldsByAxis), 0);
        assert_eq!(crawler.counters.descriptions_generated, 2);
    }

    #[tokio::test]
    async fn test_generation_groups_fields_by_axis() {
        let dir = TempDir::new().unwrap();
        let responder = Arc::new(
            CountingResponder::default()
                .answer_all(PromptKind::UnderstandFieldsByAxis, "axis notes")
                .fallback("described"),
        );
        let mut crawler = crawler(&dir, responder.clone());
        crawler
            .model_mut()
            .set_field_property("users", "id", FieldProperty::Category(SemanticCategory::Measure))
            .unwrap();
        crawler
            .model_mut()
            .set_field_property("users", "id", FieldProperty::Axis(Axis::Measure))
            .unwrap();
        crawler
            .model_mut()
            .set_field_property("users", "nickname", FieldProperty::Axis(Axis::Dimension))
            .unwrap();

        crawler
            .enrich_descriptions(CommentMode::Generation, &CancellationToken::new())
            .await
            .unwrap();

        let calls = responder.calls();
        let groups: Vec<(&str, &str)> = calls
            .iter()
            .filter(|(k, _)| *k == PromptKind::UnderstandFieldsByAxis)
            .map(|(_, a)| (a.get("category").unwrap(), a.get("fields").unwrap()))
            .collect();
        assert_eq!(groups, vec![("Dimension", "nickname"), ("Measure", "id")]);

        let id_call = calls
            .iter()
            .find(|(k, a)| *k == PromptKind::ColumnDescription && a.get("field_name") == Some("id"))
            .unwrap();
        assert_eq!(id_call.1.get("supp_info"), Some("axis notes"));
        assert_eq!(id_call.1.get("language"), Some("EN"));
        let label_call = calls
            .iter()
            .find(|(k, a)| *k == PromptKind::ColumnDescription && a.get("field_name") == Some("label"))
            .unwrap();
        assert_eq!(label_call.1.get("supp_info"), Some(""));

        // every comment was erased and regenerated
        assert_eq!(responder.calls_for(PromptKind::ColumnDescription), 3);
        assert_eq!(responder.calls_for(PromptKind::TableDescription), 2);
        assert_eq!(crawler.model().table("users").unwrap().comment, "described");
    }

    #[tokio::test]
    async fn test_cancelled_enrichment_is_interrupted() {
        let dir = TempDir::new().unwrap();
        let responder = Arc::new(CountingResponder::default());
        let mut crawler = crawler(&dir, responder.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let progress = crawler
            .enrich_descriptions(CommentMode::Generation, &cancel)
            .await
            .unwrap();
        assert!(progress.is_interrupted());
        assert_eq!(responder.total_calls(), 0);
    }
}
