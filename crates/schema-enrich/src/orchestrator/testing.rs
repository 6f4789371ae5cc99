//! Test doubles for the crawler: a scriptable [`SchemaSource`] and a
//! [`Responder`] that records every call.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::core::traits::{ColumnMeta, ForeignKeyMeta, IndexMeta, QueryResult, SchemaSource};
#[cfg(feature = "sqlite")]
use crate::drivers::SqliteSource;
use crate::error::{CrawlError, Result};
use crate::responder::{PromptArgs, PromptKind, Responder};

/// Source that either serves an empty catalog or wraps a real source, and can
/// be told to fail selected statements.
pub(crate) struct MockSource {
    db_type: String,
    inner: Option<Arc<dyn SchemaSource>>,
    fail_on: Vec<String>,
    execute_delay: Option<Duration>,
    catalog_calls: AtomicUsize,
    executed: AtomicUsize,
}

impl MockSource {
    pub fn new(db_type: &str) -> Self {
        Self {
            db_type: db_type.to_string(),
            inner: None,
            fail_on: Vec::new(),
            execute_delay: None,
            catalog_calls: AtomicUsize::new(0),
            executed: AtomicUsize::new(0),
        }
    }

    pub fn wrap(inner: Arc<dyn SchemaSource>) -> Self {
        let mut mock = Self::new(inner.db_type());
        mock.inner = Some(inner);
        mock
    }

    /// Fail every statement starting with `prefix`.
    pub fn failing(mut self, prefix: &str) -> Self {
        self.fail_on.push(prefix.to_string());
        self
    }

    pub fn with_execute_delay(mut self, delay: Duration) -> Self {
        self.execute_delay = Some(delay);
        self
    }

    pub fn catalog_calls(&self) -> usize {
        self.catalog_calls.load(Ordering::SeqCst)
    }

    /// Statements that ran to completion through `execute`.
    pub fn executed(&self) -> usize {
        self.executed.load(Ordering::SeqCst)
    }

    fn check(&self, sql: &str) -> Result<()> {
        if self.fail_on.iter().any(|p| sql.starts_with(p.as_str())) || sql.starts_with("FAIL") {
            return Err(CrawlError::db("scripted failure", sql));
        }
        Ok(())
    }

    fn catalog(&self) -> Option<&Arc<dyn SchemaSource>> {
        self.catalog_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.as_ref()
    }
}

#[async_trait]
impl SchemaSource for MockSource {
    fn db_type(&self) -> &str {
        &self.db_type
    }

    fn default_schema(&self) -> &str {
        self.inner.as_ref().map(|i| i.default_schema()).unwrap_or("main")
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        match self.catalog() {
            Some(inner) => inner.list_tables().await,
            None => Ok(Vec::new()),
        }
    }

    async fn primary_key(&self, table: &str) -> Result<Vec<String>> {
        match self.catalog() {
            Some(inner) => inner.primary_key(table).await,
            None => Ok(Vec::new()),
        }
    }

    async fn unique_constraints(&self, table: &str) -> Result<Vec<Vec<String>>> {
        match self.catalog() {
            Some(inner) => inner.unique_constraints(table).await,
            None => Ok(Vec::new()),
        }
    }

    async fn indexes(&self, table: &str) -> Result<Vec<IndexMeta>> {
        match self.catalog() {
            Some(inner) => inner.indexes(table).await,
            None => Ok(Vec::new()),
        }
    }

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyMeta>> {
        match self.catalog() {
            Some(inner) => inner.foreign_keys(table).await,
            None => Ok(Vec::new()),
        }
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnMeta>> {
        match self.catalog() {
            Some(inner) => inner.columns(table).await,
            None => Ok(Vec::new()),
        }
    }

    async fn table_comment(&self, table: &str) -> Result<Option<String>> {
        match self.catalog() {
            Some(inner) => inner.table_comment(table).await,
            None => Ok(None),
        }
    }

    async fn query(&self, sql: &str) -> Result<QueryResult> {
        self.check(sql)?;
        match &self.inner {
            Some(inner) => inner.query(sql).await,
            None => Ok(QueryResult::default()),
        }
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        if let Some(delay) = self.execute_delay {
            tokio::time::sleep(delay).await;
        }
        self.check(sql)?;
        let result = match &self.inner {
            Some(inner) => inner.execute(sql).await,
            None => Ok(()),
        };
        self.executed.fetch_add(1, Ordering::SeqCst);
        result
    }

    async fn close(&self) {}
}

#[cfg(feature = "sqlite")]
/// In-memory SQLite database with a `users` and an `orders` table.
pub(crate) async fn shop_database() -> SqliteSource {
    let source = SqliteSource::connect("sqlite::memory:", 1).await.unwrap();
    source
        .execute(
            r#"
            CREATE TABLE users (
                id INTEGER PRIMARY KEY,
                username VARCHAR(32),
                email VARCHAR(64) NOT NULL UNIQUE,
                active BOOLEAN NOT NULL DEFAULT 1,
                created_at TIMESTAMP NOT NULL
            );
            CREATE TABLE orders (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(id),
                total DECIMAL(10,2)
            );
            INSERT INTO users VALUES
                (1, 'alice', 'a@x.io', 1, '2024-01-01 10:00:00'),
                (2, 'bob', 'b@x.io', 0, '2024-02-01 11:30:00'),
                (3, NULL, 'c@x.io', 1, '2024-03-01 09:15:00');
            INSERT INTO orders VALUES
                (10, 1, 9.5),
                (11, 1, 20),
                (12, 2, 3.25);
            "#,
        )
        .await
        .unwrap();
    source
}

/// [`shop_database`] behind a [`MockSource`].
#[cfg(feature = "sqlite")]
pub(crate) async fn users_source() -> MockSource {
    MockSource::wrap(Arc::new(shop_database().await))
}

type Scripted = (PromptKind, Option<String>, String);

/// Responder that answers from a script and records every call.
#[derive(Default)]
pub(crate) struct CountingResponder {
    script: Vec<Scripted>,
    fallback: String,
    calls: Mutex<Vec<(PromptKind, PromptArgs)>>,
    cancel_at: Option<(PromptKind, usize, CancellationToken)>,
}

impl CountingResponder {
    /// Answer `kind` with `answer` when the call's `field_name` is `field`.
    pub fn answer(mut self, kind: PromptKind, field: &str, answer: &str) -> Self {
        self.script
            .push((kind, Some(field.to_string()), answer.to_string()));
        self
    }

    /// Answer every call of `kind` with `answer`.
    pub fn answer_all(mut self, kind: PromptKind, answer: &str) -> Self {
        self.script.push((kind, None, answer.to_string()));
        self
    }

    /// Answer for calls without a scripted answer.
    pub fn fallback(mut self, answer: &str) -> Self {
        self.fallback = answer.to_string();
        self
    }

    /// Cancel `token` while answering the `n`th call of `kind`.
    pub fn cancel_at(mut self, kind: PromptKind, n: usize, token: CancellationToken) -> Self {
        self.cancel_at = Some((kind, n, token));
        self
    }

    pub fn calls(&self) -> Vec<(PromptKind, PromptArgs)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, kind: PromptKind) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Responder for CountingResponder {
    async fn respond(&self, kind: PromptKind, args: &PromptArgs) -> String {
        let seen = {
            let mut calls = self.calls.lock().unwrap();
            calls.push((kind, args.clone()));
            calls.iter().filter(|(k, _)| *k == kind).count()
        };
        if let Some((at_kind, n, token)) = &self.cancel_at {
            if *at_kind == kind && *n == seen {
                token.cancel();
            }
        }
        let field = args.get("field_name");
        let specific = self
            .script
            .iter()
            .find(|(k, f, _)| *k == kind && f.is_some() && f.as_deref() == field);
        let general = || self.script.iter().find(|(k, f, _)| *k == kind && f.is_none());
        specific
            .or_else(general)
            .map(|(_, _, a)| a.clone())
            .unwrap_or_else(|| self.fallback.clone())
    }

    fn responder_type(&self) -> &'static str {
        "counting"
    }
}
