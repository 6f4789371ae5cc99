//! Field classification pass.

use serde_json::Map;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{Progress, SchemaCrawler};
use crate::core::schema::FieldProperty;
use crate::error::Result;
use crate::responder::{PromptArgs, PromptKind};
use crate::state::FieldCheckpoint;
use crate::typemap::{Axis, DateGranularity, Label, SemanticCategory, StructuralCategory};

/// Upper bound on the characters of each enum value kept as an example.
const ENUM_VALUE_CHARS: usize = 30;

impl SchemaCrawler {
    /// Give every field a semantic category, an axis and, for date/time
    /// fields, a granularity. Fields already in the checkpoint are restored
    /// without asking the responder.
    pub async fn classify_fields(&mut self, cancel: &CancellationToken) -> Result<Progress> {
        let tables: Vec<String> = self.model.tables.keys().cloned().collect();
        let total = tables.len();

        for (idx, table) in tables.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!("Cancelled before classifying table {}", table);
                return Ok(Progress::Interrupted);
            }
            info!("Classifying table {}/{}: {}", idx + 1, total, table);

            let fields: Vec<String> = self
                .model
                .table(table)
                .map(|t| t.fields.keys().cloned().collect())
                .unwrap_or_default();

            for field in &fields {
                if cancel.is_cancelled() {
                    warn!("Cancelled before classifying {}.{}", table, field);
                    return Ok(Progress::Interrupted);
                }
                if self.checkpoint.is_processed(table, field) {
                    self.restore_field(table, field);
                } else {
                    self.classify_field(table, field).await;
                }
            }
        }

        Ok(Progress::Completed)
    }

    async fn classify_field(&mut self, table: &str, field: &str) {
        let Some(f) = self.model.field(table, field) else {
            return;
        };
        let structural = f.structural_category;
        let raw_type = f.raw_type.clone();

        let info = match self.build_field_context(table, field).await {
            Ok(info) => info,
            Err(e) => {
                warn!("Skipping classification of {}.{}: {}", table, field, e);
                return;
            }
        };

        let category = match structural {
            StructuralCategory::Bool => Some(SemanticCategory::Enum),
            StructuralCategory::DateTime => Some(SemanticCategory::DateTime),
            _ => {
                let admissible: Vec<&str> = SemanticCategory::admissible(structural)
                    .iter()
                    .map(|c| c.label())
                    .collect();
                let args = PromptArgs::new()
                    .with("table_name", table)
                    .with("field_name", field)
                    .with("field_type", raw_type.as_str())
                    .with("type_category", structural.label())
                    .with("admissible", admissible.join(", "))
                    .with("field_info", info.as_str());
                let answer = self.ask(PromptKind::FieldCategory, &args).await;
                SemanticCategory::from_answer(structural, &answer)
            }
        };
        let Some(category) = category else {
            debug!("{}.{} left unclassified", table, field);
            return;
        };
        let axis = category.axis();

        let mut granularity = None;
        if category == SemanticCategory::DateTime {
            let args = PromptArgs::new()
                .with("table_name", table)
                .with("field_name", field)
                .with("field_info", info.as_str());
            let answer = self.ask(PromptKind::DateGranularity, &args).await;
            granularity = DateGranularity::from_answer(&answer);
            if granularity.is_none() && !answer.trim().is_empty() {
                debug!(
                    "Ignoring granularity answer {:?} for {}.{}",
                    answer.trim(),
                    table,
                    field
                );
            }
        }

        let mut examples = None;
        if category == SemanticCategory::Enum {
            let values = self
                .value_examples(table, field, None, ENUM_VALUE_CHARS)
                .await;
            // keep the sampled examples when the distinct query failed
            if !values.is_empty() {
                examples = Some(values);
            }
        }

        self.apply(table, field, FieldProperty::Category(category));
        self.apply(table, field, FieldProperty::Axis(axis));
        if let Some(g) = granularity {
            self.apply(table, field, FieldProperty::DateGranularity(g));
        }
        if let Some(values) = &examples {
            self.apply(table, field, FieldProperty::Examples(values.clone()));
        }

        let payload = FieldCheckpoint {
            raw_type,
            info,
            category: Some(category.label().to_string()),
            dim_or_meas: Some(axis.label().to_string()),
            date_min_gran: granularity.map(|g| g.label().to_string()),
            examples,
            extra: Map::new(),
        };
        match payload.to_value() {
            Ok(value) => self.checkpoint.save(table, field, value),
            Err(e) => warn!("Cannot checkpoint {}.{}: {}", table, field, e),
        }

        self.counters.fields_classified += 1;
        debug!(
            "Classified {}.{} as {} ({})",
            table,
            field,
            category,
            axis
        );
    }

    /// Re-apply a checkpointed classification.
    fn restore_field(&mut self, table: &str, field: &str) {
        let Some(value) = self.checkpoint.entry(table, field) else {
            return;
        };
        let saved = match FieldCheckpoint::from_value(value) {
            Ok(saved) => saved,
            Err(e) => {
                warn!("Unreadable checkpoint entry for {}.{}: {}", table, field, e);
                return;
            }
        };

        if let Some(c) = saved.category.as_deref().and_then(SemanticCategory::from_label) {
            self.apply(table, field, FieldProperty::Category(c));
        }
        if let Some(a) = saved.dim_or_meas.as_deref().and_then(Axis::from_label) {
            self.apply(table, field, FieldProperty::Axis(a));
        }
        if let Some(g) = saved
            .date_min_gran
            .as_deref()
            .and_then(DateGranularity::from_label)
        {
            self.apply(table, field, FieldProperty::DateGranularity(g));
        }
        if let Some(examples) = saved.examples {
            self.apply(table, field, FieldProperty::Examples(examples));
        }

        self.counters.fields_restored += 1;
        debug!("Restored {}.{} from checkpoint", table, field);
    }

    // set_field_property already logs a missing target
    fn apply(&mut self, table: &str, field: &str, property: FieldProperty) {
        let _ = self.model.set_field_property(table, field, property);
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use std::sync::Arc;

    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::orchestrator::testing::{users_source, CountingResponder};
    use crate::orchestrator::CrawlerOptions;

    fn options_in(dir: &TempDir) -> CrawlerOptions {
        CrawlerOptions {
            db_id: "shop".to_string(),
            schema_file: dir.path().join("schema.json"),
            checkpoint_file: dir.path().join("checkpoint.json"),
            ..Default::default()
        }
    }

    fn scripted() -> CountingResponder {
        CountingResponder::default()
            .answer(PromptKind::FieldCategory, "username", "Text")
            .answer(PromptKind::FieldCategory, "total", "Measure")
            .answer(PromptKind::FieldCategory, "user_id", "Enum")
            .answer_all(PromptKind::FieldCategory, "Code")
            .answer_all(PromptKind::DateGranularity, "DAY")
    }

    async fn classified(dir: &TempDir, responder: Arc<CountingResponder>) -> SchemaCrawler {
        let mut crawler =
            SchemaCrawler::new(Arc::new(users_source().await), responder, options_in(dir))
                .unwrap();
        crawler.introspect().await.unwrap();
        let progress = crawler
            .classify_fields(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(progress, Progress::Completed);
        crawler
    }

    #[tokio::test]
    async fn test_classify_sends_field_context() {
        let dir = TempDir::new().unwrap();
        let responder = Arc::new(scripted());
        let crawler = classified(&dir, responder.clone()).await;

        let calls = responder.calls();
        let (_, args) = calls
            .iter()
            .find(|(k, a)| *k == PromptKind::FieldCategory && a.get("field_name") == Some("total"))
            .unwrap();
        assert_eq!(args.get("table_name"), Some("orders"));
        assert_eq!(args.get("field_type"), Some("DECIMAL(10,2)"));
        assert_eq!(args.get("type_category"), Some("Number"));
        assert_eq!(args.get("admissible"), Some("DateTime, Enum, Measure"));
        assert!(args.get("field_info").unwrap().starts_with("【Field Info】\nField Name: total"));

        let model = crawler.model();
        let user_id = model.field("orders", "user_id").unwrap();
        assert_eq!(user_id.semantic_category, Some(SemanticCategory::Enum));
        assert_eq!(user_id.examples, vec!["1", "2"]);
        assert_eq!(
            model.field("users", "created_at").unwrap().date_min_granularity,
            Some(DateGranularity::Day)
        );
    }

    #[tokio::test]
    async fn test_inadmissible_answer_becomes_code() {
        let dir = TempDir::new().unwrap();
        let responder = Arc::new(
            CountingResponder::default()
                .answer(PromptKind::FieldCategory, "username", "Measure"),
        );
        let crawler = classified(&dir, responder).await;
        let username = crawler.model().field("users", "username").unwrap();
        assert_eq!(username.semantic_category, Some(SemanticCategory::Code));
        assert_eq!(username.dimension_or_measure, Some(Axis::Dimension));
    }

    #[tokio::test]
    async fn test_empty_answer_leaves_field_unclassified() {
        let dir = TempDir::new().unwrap();
        let responder = Arc::new(CountingResponder::default());
        let crawler = classified(&dir, responder.clone()).await;

        let model = crawler.model();
        let username = model.field("users", "username").unwrap();
        assert!(!username.is_classified());
        assert!(!crawler.checkpoint().is_processed("users", "username"));

        // rule-classified fields are still recorded
        assert!(crawler.checkpoint().is_processed("users", "active"));
        let created = model.field("users", "created_at").unwrap();
        assert_eq!(created.semantic_category, Some(SemanticCategory::DateTime));
        assert_eq!(created.date_min_granularity, None);
        assert_eq!(crawler.counters.fields_classified, 2);
    }

    #[tokio::test]
    async fn test_resume_restores_without_asking() {
        let dir = TempDir::new().unwrap();
        let first = Arc::new(scripted());
        let before = classified(&dir, first.clone()).await;
        assert_eq!(first.calls_for(PromptKind::FieldCategory), 6);

        let second = Arc::new(CountingResponder::default());
        let after = classified(&dir, second.clone()).await;
        assert_eq!(second.total_calls(), 0);
        assert_eq!(after.counters.fields_restored, 8);
        assert_eq!(after.counters.fields_classified, 0);

        for (name, table) in &before.model().tables {
            for (field, expected) in &table.fields {
                let restored = after.model().field(name, field).unwrap();
                assert_eq!(restored.semantic_category, expected.semantic_category, "{}", field);
                assert_eq!(restored.dimension_or_measure, expected.dimension_or_measure);
                assert_eq!(restored.date_min_granularity, expected.date_min_granularity);
                assert_eq!(restored.examples, expected.examples, "{}", field);
            }
        }
    }

    #[tokio::test]
    async fn test_same_answers_same_model() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        let one = classified(&a, Arc::new(scripted())).await;
        let two = classified(&b, Arc::new(scripted())).await;
        assert_eq!(one.model().to_json().unwrap(), two.model().to_json().unwrap());
    }

    #[tokio::test]
    async fn test_cancel_between_fields() {
        let dir = TempDir::new().unwrap();
        let mut crawler = SchemaCrawler::new(
            Arc::new(users_source().await),
            Arc::new(scripted()),
            options_in(&dir),
        )
        .unwrap();
        crawler.introspect().await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let progress = crawler.classify_fields(&cancel).await.unwrap();
        assert!(progress.is_interrupted());
        assert_eq!(crawler.checkpoint().progress(), (0, 0));
    }
}
