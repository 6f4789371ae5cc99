//! Classifier and description collaborator.
//!
//! The crawler never builds prompt text itself. It names the step with a
//! [`PromptKind`], passes the step's inputs as [`PromptArgs`], and takes the
//! returned string as the answer. An empty answer means no answer was
//! available.

mod noop;

pub use noop::NoOpResponder;

use std::fmt;

use async_trait::async_trait;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Enrichment step a responder is asked to answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKind {
    /// Semantic category of one field.
    FieldCategory,
    /// Smallest time unit of a date/time field.
    DateGranularity,
    /// Summary of the whole database from its rendered schema.
    UnderstandDatabase,
    /// Domain knowledge derived from the database summary.
    DomainKnowledge,
    /// Joint understanding of one table's dimension or measure fields.
    UnderstandFieldsByAxis,
    /// Description of one column.
    ColumnDescription,
    /// Description of one table.
    TableDescription,
}

impl PromptKind {
    pub const ALL: [PromptKind; 7] = [
        PromptKind::FieldCategory,
        PromptKind::DateGranularity,
        PromptKind::UnderstandDatabase,
        PromptKind::DomainKnowledge,
        PromptKind::UnderstandFieldsByAxis,
        PromptKind::ColumnDescription,
        PromptKind::TableDescription,
    ];

    /// Stable snake_case name used on the wire.
    pub fn label(&self) -> &'static str {
        match self {
            PromptKind::FieldCategory => "field_category",
            PromptKind::DateGranularity => "date_granularity",
            PromptKind::UnderstandDatabase => "understand_database",
            PromptKind::DomainKnowledge => "domain_knowledge",
            PromptKind::UnderstandFieldsByAxis => "understand_fields_by_axis",
            PromptKind::ColumnDescription => "column_description",
            PromptKind::TableDescription => "table_description",
        }
    }
}

impl fmt::Display for PromptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for PromptKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// Ordered named string arguments of one responder call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptArgs {
    args: Vec<(String, String)>,
}

impl PromptArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an argument, replacing an earlier one of the same name.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.args.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.args.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.args
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.args.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }
}

impl Serialize for PromptArgs {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.args.len()))?;
        for (name, value) in &self.args {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Answers classification and description steps.
///
/// Implementations own their retry and rate-limit policy. Failures are
/// reported as the empty answer.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn respond(&self, kind: PromptKind, args: &PromptArgs) -> String;

    /// Get the responder type identifier (e.g., "noop", "command").
    fn responder_type(&self) -> &'static str;
}
