//! File-based checkpointing of classified fields and generated descriptions
//! for resume capability.
//!
//! The checkpoint is one pretty-printed JSON object keyed by table, then by
//! field. Each save rewrites the whole file atomically (temp file, then
//! rename). Checkpoint I/O never fails a crawl: read errors degrade to an
//! empty record and write errors are logged.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{CrawlError, Result};

/// Table name -> field name -> payload.
pub type CheckpointRecord = IndexMap<String, IndexMap<String, Value>>;

/// Payload stored for a classified field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldCheckpoint {
    /// Declared type of the field.
    #[serde(rename = "type")]
    pub raw_type: String,

    /// Context text the classifier saw.
    pub info: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dim_or_meas: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_min_gran: Option<String>,

    /// Full distinct-value list for enum fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub examples: Option<Vec<String>>,

    /// Keys written by other tools.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FieldCheckpoint {
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        Ok(serde_json::from_value(value.clone())?)
    }
}

/// Payload stored for a generated description.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DescriptionCheckpoint {
    pub description: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DescriptionCheckpoint {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            extra: Map::new(),
        }
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        Ok(serde_json::from_value(value.clone())?)
    }
}

/// Field key under which a table's own description is recorded. Field names
/// are never empty.
pub const TABLE_DESCRIPTION_KEY: &str = "";

/// Description checkpoint kept next to the classification checkpoint:
/// `checkpoints/analysis_checkpoint.json` pairs with
/// `checkpoints/analysis_checkpoint_descriptions.json`.
pub fn description_checkpoint_path<P: AsRef<Path>>(checkpoint_file: P) -> PathBuf {
    let path = checkpoint_file.as_ref();
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "checkpoint".to_string());
    path.with_file_name(format!("{}_descriptions.json", stem))
}

/// Durable record of processed (table, field) units.
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    record: CheckpointRecord,
}

impl CheckpointStore {
    /// Open the store at `path`, reading any existing record.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let mut store = Self {
            path: path.as_ref().to_path_buf(),
            record: CheckpointRecord::new(),
        };
        store.load();
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the record from disk. A missing or unreadable file yields an
    /// empty record.
    pub fn load(&mut self) -> &CheckpointRecord {
        self.record = match Self::read(&self.path) {
            Ok(Some(record)) => record,
            Ok(None) => CheckpointRecord::new(),
            Err(e) => {
                warn!("Ignoring unreadable checkpoint {:?}: {}", self.path, e);
                CheckpointRecord::new()
            }
        };
        &self.record
    }

    fn read(path: &Path) -> Result<Option<CheckpointRecord>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Record `payload` for `table.field` and persist immediately.
    ///
    /// The in-memory record is updated even when the write fails.
    pub fn save(&mut self, table: &str, field: &str, payload: Value) {
        // read-modify-write: entries saved by another store survive
        if let Ok(Some(on_disk)) = Self::read(&self.path) {
            for (t, fields) in on_disk {
                let entry = self.record.entry(t).or_default();
                for (f, v) in fields {
                    entry.entry(f).or_insert(v);
                }
            }
        }

        self.record
            .entry(table.to_string())
            .or_default()
            .insert(field.to_string(), payload);

        match self.write() {
            Ok(()) => debug!("Checkpointed {}.{}", table, field),
            Err(e) => warn!("Failed to write checkpoint {:?}: {}", self.path, e),
        }
    }

    fn write(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.record)
            .map_err(|e| CrawlError::Checkpoint(format!("Failed to serialize checkpoint: {}", e)))?;

        let temp_path = self.path.with_extension("tmp");
        std::fs::write(&temp_path, &content)?;
        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    pub fn is_processed(&self, table: &str, field: &str) -> bool {
        self.record
            .get(table)
            .is_some_and(|fields| fields.contains_key(field))
    }

    /// Stored payload for `table.field`.
    pub fn entry(&self, table: &str, field: &str) -> Option<&Value> {
        self.record.get(table).and_then(|fields| fields.get(field))
    }

    /// (tables with at least one entry, total fields).
    pub fn progress(&self) -> (usize, usize) {
        let tables = self.record.values().filter(|f| !f.is_empty()).count();
        let fields = self.record.values().map(|f| f.len()).sum();
        (tables, fields)
    }

    pub fn record(&self) -> &CheckpointRecord {
        &self.record
    }

    /// Forget everything and remove the file.
    pub fn clear(&mut self) {
        self.record.clear();
        if self.path.exists() {
            if let Err(e) = std::fs::remove_file(&self.path) {
                warn!("Failed to remove checkpoint {:?}: {}", self.path, e);
            }
        }
    }
}
