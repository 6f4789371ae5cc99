//! Schema model: a database owns tables, a table owns fields.
//!
//! The model is created once by introspection and then mutated in place by
//! classification and description enrichment. Tables and fields keep their
//! insertion order, which is also the order used for rendering and for the
//! persisted JSON form.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, warn};

use crate::error::Result;
use crate::typemap::{
    classify_structural, Axis, DatabaseKind, DateGranularity, Label, SemanticCategory,
    StructuralCategory,
};

/// A setter addressed a table or field that is not in the model.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotFound {
    #[error("table '{0}' does not exist in the schema model")]
    Table(String),
    #[error("field '{table}.{field}' does not exist in the schema model")]
    Field { table: String, field: String },
}

/// Root of the schema model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Database {
    /// Identifier shown in the rendered header.
    #[serde(default = "default_db_id")]
    pub db_id: String,

    /// Namespace the tables were crawled from.
    #[serde(default)]
    pub schema: Option<String>,

    /// Engine the model was crawled from; drives structural classification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialect: Option<String>,

    #[serde(default)]
    pub tables: IndexMap<String, Table>,

    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,

    /// Summary produced by the database-understanding step of enrichment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_info: Option<String>,
}

/// Table metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Table {
    /// Table name (the key in `Database::tables`).
    #[serde(skip)]
    pub name: String,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub comment: String,

    #[serde(default)]
    pub fields: IndexMap<String, Field>,

    /// Column sets of the table's unique constraints.
    #[serde(default)]
    pub unique_keys: Vec<Vec<String>>,

    /// Column sets of the table's indexes.
    #[serde(default)]
    pub keys: Vec<Vec<String>>,
}

/// Column metadata plus everything enrichment learns about it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Field {
    /// Field name (the key in `Table::fields`).
    #[serde(skip)]
    pub name: String,

    /// Declared type as reported by the engine, e.g. `VARCHAR(32)`.
    #[serde(rename = "type")]
    pub raw_type: String,

    #[serde(default)]
    pub primary_key: bool,

    #[serde(default = "default_true")]
    pub nullable: bool,

    #[serde(default)]
    pub default: Option<String>,

    #[serde(default)]
    pub autoincrement: bool,

    /// True for the sole primary-key column or a single-column unique constraint.
    #[serde(default)]
    pub unique: bool,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub comment: String,

    /// Distinct non-empty sample values.
    #[serde(default, deserialize_with = "examples_from_values")]
    pub examples: Vec<String>,

    /// Derived from `raw_type`; recomputed whenever the model is loaded.
    #[serde(
        rename = "type_category",
        serialize_with = "serialize_label",
        skip_deserializing,
        default = "default_structural"
    )]
    pub structural_category: StructuralCategory,

    #[serde(rename = "category", default, with = "opt_label")]
    pub semantic_category: Option<SemanticCategory>,

    #[serde(rename = "dim_or_meas", default, with = "opt_label")]
    pub dimension_or_measure: Option<Axis>,

    #[serde(
        rename = "date_min_gran",
        default,
        with = "opt_label",
        skip_serializing_if = "Option::is_none"
    )]
    pub date_min_granularity: Option<DateGranularity>,
}

/// One column pair of a foreign-key constraint.
///
/// Composite constraints are stored as several entries sharing a table pair.
/// Persisted as `[table, column, ref_schema, ref_table, ref_column]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ForeignKeyTuple", into = "ForeignKeyTuple")]
pub struct ForeignKey {
    pub table: String,
    pub column: String,
    pub ref_schema: Option<String>,
    pub ref_table: String,
    pub ref_column: String,
}

type ForeignKeyTuple = (String, String, Option<String>, String, String);

impl From<ForeignKeyTuple> for ForeignKey {
    fn from((table, column, ref_schema, ref_table, ref_column): ForeignKeyTuple) -> Self {
        Self {
            table,
            column,
            ref_schema,
            ref_table,
            ref_column,
        }
    }
}

impl From<ForeignKey> for ForeignKeyTuple {
    fn from(fk: ForeignKey) -> Self {
        (fk.table, fk.column, fk.ref_schema, fk.ref_table, fk.ref_column)
    }
}

/// A single property write addressed by [`Database::set_field_property`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldProperty {
    Comment(String),
    Examples(Vec<String>),
    Category(SemanticCategory),
    Axis(Axis),
    DateGranularity(DateGranularity),
}

impl Field {
    /// Create a nullable, non-key field with no enrichment.
    pub fn new(name: impl Into<String>, raw_type: impl Into<String>) -> Self {
        let raw_type = raw_type.into();
        let structural_category = classify_structural(None, &raw_type);
        Self {
            name: name.into(),
            raw_type,
            primary_key: false,
            nullable: true,
            default: None,
            autoincrement: false,
            unique: false,
            comment: String::new(),
            examples: Vec::new(),
            structural_category,
            semantic_category: None,
            dimension_or_measure: None,
            date_min_granularity: None,
        }
    }

    /// Whether classification has assigned a category.
    pub fn is_classified(&self) -> bool {
        self.semantic_category.is_some()
    }
}

impl Table {
    pub fn new(name: impl Into<String>, comment: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            comment: comment.into(),
            ..Default::default()
        }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    /// Names of the primary-key columns, in declaration order.
    pub fn primary_key(&self) -> Vec<&str> {
        self.fields
            .values()
            .filter(|f| f.primary_key)
            .map(|f| f.name.as_str())
            .collect()
    }
}

impl Database {
    /// Create an empty model.
    pub fn new(db_id: impl Into<String>, schema: Option<String>, dialect: Option<DatabaseKind>) -> Self {
        Self {
            db_id: db_id.into(),
            schema: schema.filter(|s| !s.is_empty()),
            dialect: dialect.map(|d| d.name().to_string()),
            tables: IndexMap::new(),
            foreign_keys: Vec::new(),
            db_info: None,
        }
    }

    /// Engine the model was crawled from, if recognized.
    pub fn kind(&self) -> Option<DatabaseKind> {
        self.dialect.as_deref().and_then(DatabaseKind::parse)
    }

    /// Add a table, replacing any existing table of the same name.
    pub fn add_table(&mut self, table: Table) -> &mut Table {
        let name = table.name.clone();
        self.tables.insert(name.clone(), table);
        &mut self.tables[name.as_str()]
    }

    /// Add or overwrite a field of an existing table.
    ///
    /// The structural category is derived here from the declared type and
    /// the model's dialect. Examples are cleaned of empties and duplicates.
    pub fn add_field(&mut self, table: &str, mut field: Field) -> std::result::Result<(), NotFound> {
        let kind = self.kind();
        let Some(t) = self.tables.get_mut(table) else {
            return Err(not_found_table(table));
        };
        field.structural_category = classify_structural(kind, &field.raw_type);
        field.examples = clean_examples(std::mem::take(&mut field.examples));
        t.fields.insert(field.name.clone(), field);
        Ok(())
    }

    pub fn add_foreign_key(&mut self, fk: ForeignKey) {
        self.foreign_keys.push(fk);
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn has_field(&self, table: &str, field: &str) -> bool {
        self.tables
            .get(table)
            .is_some_and(|t| t.fields.contains_key(field))
    }

    pub fn table(&self, table: &str) -> Option<&Table> {
        self.tables.get(table)
    }

    pub fn field(&self, table: &str, field: &str) -> Option<&Field> {
        self.tables.get(table).and_then(|t| t.fields.get(field))
    }

    pub fn field_mut(&mut self, table: &str, field: &str) -> Option<&mut Field> {
        self.tables.get_mut(table).and_then(|t| t.fields.get_mut(field))
    }

    /// Number of fields across all tables.
    pub fn field_count(&self) -> usize {
        self.tables.values().map(|t| t.fields.len()).sum()
    }

    /// Best-effort table comment write. A missing table is logged and reported.
    pub fn set_table_comment(
        &mut self,
        table: &str,
        comment: impl Into<String>,
    ) -> std::result::Result<(), NotFound> {
        match self.tables.get_mut(table) {
            Some(t) => {
                t.comment = comment.into();
                Ok(())
            }
            None => Err(not_found_table(table)),
        }
    }

    /// Best-effort field property write. A missing target is logged and reported.
    pub fn set_field_property(
        &mut self,
        table: &str,
        field: &str,
        property: FieldProperty,
    ) -> std::result::Result<(), NotFound> {
        let Some(f) = self.field_mut(table, field) else {
            warn!("Field {}.{} does not exist in the schema model", table, field);
            return Err(NotFound::Field {
                table: table.to_string(),
                field: field.to_string(),
            });
        };

        match property {
            FieldProperty::Comment(c) => f.comment = c,
            FieldProperty::Examples(e) => f.examples = clean_examples(e),
            FieldProperty::Category(c) => f.semantic_category = Some(c),
            FieldProperty::Axis(a) => f.dimension_or_measure = Some(a),
            FieldProperty::DateGranularity(g) => f.date_min_granularity = Some(g),
        }
        Ok(())
    }

    /// Field names of `table` with the given semantic category.
    pub fn fields_by_category(&self, category: SemanticCategory, table: &str) -> Vec<String> {
        self.tables
            .get(table)
            .map(|t| {
                t.fields
                    .values()
                    .filter(|f| f.semantic_category == Some(category))
                    .map(|f| f.name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Field names of `table` on the given dimension/measure axis.
    pub fn fields_by_axis(&self, axis: Axis, table: &str) -> Vec<String> {
        self.tables
            .get(table)
            .map(|t| {
                t.fields
                    .values()
                    .filter(|f| f.dimension_or_measure == Some(axis))
                    .map(|f| f.name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Clear every table and field comment.
    pub fn erase_all_comments(&mut self) {
        for table in self.tables.values_mut() {
            table.comment.clear();
            for field in table.fields.values_mut() {
                field.comment.clear();
            }
        }
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse the persisted JSON form and restore derived state.
    pub fn from_json(json: &str) -> Result<Self> {
        let mut db: Database = serde_json::from_str(json)?;
        db.restore_derived();
        Ok(db)
    }

    /// Save to a file (atomic write: temp file, then rename).
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let content = self.to_json()?;
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, &content)?;
        std::fs::rename(&temp_path, path)?;

        debug!("Saved schema model to {:?}", path);
        Ok(())
    }

    /// Load a model saved with [`Database::save`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Names live in the map keys only; structural categories are derived.
    fn restore_derived(&mut self) {
        let kind = self.kind();
        for (table_name, table) in self.tables.iter_mut() {
            table.name = table_name.clone();
            for (field_name, field) in table.fields.iter_mut() {
                field.name = field_name.clone();
                field.structural_category = classify_structural(kind, &field.raw_type);
            }
        }
    }
}

fn not_found_table(table: &str) -> NotFound {
    warn!("Table {} does not exist in the schema model", table);
    NotFound::Table(table.to_string())
}

/// Drop empty values and duplicates, keeping first occurrences.
pub fn clean_examples(examples: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(examples.len());
    for e in examples {
        if !e.is_empty() && !out.contains(&e) {
            out.push(e);
        }
    }
    out
}

fn default_db_id() -> String {
    "Anonymous".to_string()
}

fn default_true() -> bool {
    true
}

fn default_structural() -> StructuralCategory {
    StructuralCategory::Other
}

fn null_as_empty<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}

/// Examples may have been persisted as raw JSON scalars.
fn examples_from_values<'de, D: Deserializer<'de>>(
    d: D,
) -> std::result::Result<Vec<String>, D::Error> {
    let values: Option<Vec<serde_json::Value>> = Option::deserialize(d)?;
    Ok(values
        .unwrap_or_default()
        .into_iter()
        .filter_map(|v| match v {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s),
            other => Some(other.to_string()),
        })
        .collect())
}

fn serialize_label<S: Serializer, T: Label>(value: &T, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(value.label())
}

/// Optional labels persist as `""` when unset; unknown labels load as unset.
mod opt_label {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::typemap::Label;

    pub fn serialize<S: Serializer, T: Label>(
        value: &Option<T>,
        s: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(value.map(|v| v.label()).unwrap_or(""))
    }

    pub fn deserialize<'de, D: Deserializer<'de>, T: Label>(
        d: D,
    ) -> std::result::Result<Option<T>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        Ok(raw.as_deref().and_then(T::from_label))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn sample_db() -> Database {
        let mut db = Database::new("shop", None, Some(DatabaseKind::Mysql));
        db.add_table(Table::new("users", "registered users"));

        let mut id = Field::new("id", "INT(11)");
        id.primary_key = true;
        id.unique = true;
        id.nullable = false;
        id.autoincrement = true;
        id.examples = vec!["1".into(), "2".into(), "2".into(), "".into()];
        db.add_field("users", id).unwrap();

        let mut name = Field::new("name", "VARCHAR(64)");
        name.comment = "display name".into();
        db.add_field("users", name).unwrap();

        db.add_table(Table::new("orders", ""));
        db.add_field("orders", Field::new("user_id", "INT")).unwrap();
        db.add_foreign_key(ForeignKey {
            table: "orders".into(),
            column: "user_id".into(),
            ref_schema: None,
            ref_table: "users".into(),
            ref_column: "id".into(),
        });
        db
    }

    #[test]
    fn test_add_field_derives_category_and_cleans_examples() {
        let db = sample_db();
        let id = db.field("users", "id").unwrap();
        assert_eq!(id.structural_category, StructuralCategory::Number);
        assert_eq!(id.examples, vec!["1".to_string(), "2".to_string()]);
        assert_eq!(
            db.field("users", "name").unwrap().structural_category,
            StructuralCategory::String
        );
    }

    #[test]
    fn test_add_field_to_missing_table() {
        let mut db = sample_db();
        let err = db.add_field("ghost", Field::new("x", "INT")).unwrap_err();
        assert_eq!(err, NotFound::Table("ghost".into()));
    }

    #[test]
    fn test_add_field_overwrites_by_name() {
        let mut db = sample_db();
        db.add_field("users", Field::new("name", "TEXT")).unwrap();
        let table = db.table("users").unwrap();
        assert_eq!(table.fields.len(), 2);
        assert_eq!(table.field("name").unwrap().raw_type, "TEXT");
        // insertion position is kept
        assert_eq!(table.fields.get_index(1).unwrap().0, "name");
    }

    #[test]
    fn test_setters_report_not_found() {
        let mut db = sample_db();
        assert!(db.set_table_comment("users", "people").is_ok());
        assert_eq!(db.table("users").unwrap().comment, "people");
        assert_eq!(
            db.set_table_comment("nope", "x"),
            Err(NotFound::Table("nope".into()))
        );
        assert_eq!(
            db.set_field_property("users", "nope", FieldProperty::Comment("x".into())),
            Err(NotFound::Field {
                table: "users".into(),
                field: "nope".into()
            })
        );
    }

    #[test]
    fn test_fields_by_category_and_axis() {
        let mut db = sample_db();
        db.set_field_property("users", "id", FieldProperty::Category(SemanticCategory::Code))
            .unwrap();
        db.set_field_property("users", "id", FieldProperty::Axis(Axis::Dimension))
            .unwrap();
        db.set_field_property("users", "name", FieldProperty::Category(SemanticCategory::Text))
            .unwrap();

        assert_eq!(db.fields_by_category(SemanticCategory::Code, "users"), vec!["id"]);
        assert_eq!(db.fields_by_axis(Axis::Dimension, "users"), vec!["id"]);
        assert!(db.fields_by_axis(Axis::Measure, "users").is_empty());
        assert!(db.fields_by_category(SemanticCategory::Code, "ghost").is_empty());
    }

    #[test]
    fn test_erase_all_comments() {
        let mut db = sample_db();
        db.erase_all_comments();
        assert!(db.table("users").unwrap().comment.is_empty());
        assert!(db.field("users", "name").unwrap().comment.is_empty());
    }

    #[test]
    fn test_json_round_trip_preserves_everything() {
        let mut db = sample_db();
        db.db_info = Some("A small shop".into());
        db.set_field_property("users", "id", FieldProperty::Category(SemanticCategory::Code))
            .unwrap();
        db.set_field_property(
            "users",
            "name",
            FieldProperty::DateGranularity(DateGranularity::Day),
        )
        .unwrap();

        let json = db.to_json().unwrap();
        let loaded = Database::from_json(&json).unwrap();

        assert_eq!(loaded.db_id, "shop");
        assert_eq!(loaded.db_info.as_deref(), Some("A small shop"));
        assert_eq!(loaded.foreign_keys, db.foreign_keys);
        let names: Vec<_> = loaded.tables.keys().cloned().collect();
        assert_eq!(names, vec!["users", "orders"]);

        let id = loaded.field("users", "id").unwrap();
        assert_eq!(id.name, "id");
        assert!(id.primary_key && id.unique && !id.nullable && id.autoincrement);
        assert_eq!(id.semantic_category, Some(SemanticCategory::Code));
        assert_eq!(id.structural_category, StructuralCategory::Number);
        assert_eq!(
            loaded.field("users", "name").unwrap().date_min_granularity,
            Some(DateGranularity::Day)
        );
        assert_eq!(loaded.table("users").unwrap().name, "users");
    }

    #[test]
    fn test_persisted_shape() {
        let db = sample_db();
        let value: serde_json::Value = serde_json::from_str(&db.to_json().unwrap()).unwrap();

        assert_eq!(
            value["foreign_keys"][0],
            serde_json::json!(["orders", "user_id", null, "users", "id"])
        );
        let id = &value["tables"]["users"]["fields"]["id"];
        assert_eq!(id["type"], "INT(11)");
        assert_eq!(id["type_category"], "Number");
        assert_eq!(id["category"], "");
        assert_eq!(id["dim_or_meas"], "");
        assert!(id.get("date_min_gran").is_none());
    }

    #[test]
    fn test_lenient_load() {
        let json = r#"{
            "db_id": "legacy",
            "schema": null,
            "tables": {
                "t": {
                    "comment": null,
                    "examples": [],
                    "fields": {
                        "a": {"type": "INTEGER", "comment": null, "examples": [1, null, "x"],
                              "category": "Mystery", "dim_or_meas": "Measure"}
                    }
                }
            },
            "foreign_keys": []
        }"#;
        let db = Database::from_json(json).unwrap();
        let a = db.field("t", "a").unwrap();
        assert_eq!(a.examples, vec!["1".to_string(), "x".to_string()]);
        assert_eq!(a.semantic_category, None);
        assert_eq!(a.dimension_or_measure, Some(Axis::Measure));
        assert!(a.nullable);
        assert_eq!(db.table("t").unwrap().comment, "");
    }

    #[test]
    fn test_save_load_file() {
        let db = sample_db();
        let file = NamedTempFile::new().unwrap();
        db.save(file.path()).unwrap();

        let loaded = Database::load(file.path()).unwrap();
        assert_eq!(loaded.field_count(), 3);
        assert!(loaded.has_field("orders", "user_id"));
        assert!(!loaded.has_field("orders", "id"));
    }
}
