//! Column type taxonomy.
//!
//! Maps dialect-specific declared column types onto a small closed set of
//! structural categories, and defines the semantic vocabulary (category,
//! dimension/measure axis, date granularity) that classification writes back
//! into the schema model. Everything here is pure.

use std::fmt;

/// Database engines with a dedicated code path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseKind {
    Mysql,
    Postgres,
    Sqlite,
}

impl DatabaseKind {
    pub const ALL: [DatabaseKind; 3] = [
        DatabaseKind::Mysql,
        DatabaseKind::Postgres,
        DatabaseKind::Sqlite,
    ];

    /// Parse an engine name. Returns `None` for engines without support.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "mysql" | "mariadb" => Some(DatabaseKind::Mysql),
            "postgres" | "postgresql" | "pg" => Some(DatabaseKind::Postgres),
            "sqlite" | "sqlite3" => Some(DatabaseKind::Sqlite),
            _ => None,
        }
    }

    /// Canonical dialect name.
    pub fn name(&self) -> &'static str {
        match self {
            DatabaseKind::Mysql => "mysql",
            DatabaseKind::Postgres => "postgresql",
            DatabaseKind::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A closed vocabulary whose string labels are persisted.
pub trait Label: Sized + Copy + 'static {
    const VARIANTS: &'static [Self];

    fn label(&self) -> &'static str;

    /// Exact-label lookup.
    fn from_label(label: &str) -> Option<Self> {
        Self::VARIANTS.iter().copied().find(|v| v.label() == label)
    }
}

/// Coarse type class derived from the declared column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StructuralCategory {
    Number,
    String,
    DateTime,
    Bool,
    Other,
}

impl Label for StructuralCategory {
    const VARIANTS: &'static [Self] = &[
        StructuralCategory::Number,
        StructuralCategory::String,
        StructuralCategory::DateTime,
        StructuralCategory::Bool,
        StructuralCategory::Other,
    ];

    fn label(&self) -> &'static str {
        match self {
            StructuralCategory::Number => "Number",
            StructuralCategory::String => "String",
            StructuralCategory::DateTime => "DateTime",
            StructuralCategory::Bool => "Bool",
            StructuralCategory::Other => "Other",
        }
    }
}

/// Business-meaning classification of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SemanticCategory {
    Code,
    Enum,
    DateTime,
    Text,
    Measure,
}

impl Label for SemanticCategory {
    const VARIANTS: &'static [Self] = &[
        SemanticCategory::Code,
        SemanticCategory::Enum,
        SemanticCategory::DateTime,
        SemanticCategory::Text,
        SemanticCategory::Measure,
    ];

    fn label(&self) -> &'static str {
        match self {
            SemanticCategory::Code => "Code",
            SemanticCategory::Enum => "Enum",
            SemanticCategory::DateTime => "DateTime",
            SemanticCategory::Text => "Text",
            SemanticCategory::Measure => "Measure",
        }
    }
}

impl SemanticCategory {
    /// Measures aggregate; everything else groups or filters.
    pub fn axis(&self) -> Axis {
        match self {
            SemanticCategory::Measure => Axis::Measure,
            _ => Axis::Dimension,
        }
    }

    /// Answers a classifier may give for a field of the given structural
    /// category. Anything else falls back to `Code`.
    pub fn admissible(structural: StructuralCategory) -> &'static [SemanticCategory] {
        match structural {
            StructuralCategory::String => &[
                SemanticCategory::DateTime,
                SemanticCategory::Enum,
                SemanticCategory::Text,
            ],
            StructuralCategory::Number => &[
                SemanticCategory::DateTime,
                SemanticCategory::Enum,
                SemanticCategory::Measure,
            ],
            StructuralCategory::Other => &[
                SemanticCategory::DateTime,
                SemanticCategory::Enum,
                SemanticCategory::Measure,
                SemanticCategory::Text,
            ],
            StructuralCategory::DateTime => &[SemanticCategory::DateTime],
            StructuralCategory::Bool => &[SemanticCategory::Enum],
        }
    }

    /// Interpret a free-text classifier answer.
    ///
    /// An empty answer means no judgement was available and yields `None`.
    pub fn from_answer(structural: StructuralCategory, answer: &str) -> Option<SemanticCategory> {
        let normalized = answer
            .trim()
            .trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == '.' || c == '*')
            .trim()
            .to_lowercase();
        if normalized.is_empty() {
            return None;
        }

        let picked = Self::admissible(structural)
            .iter()
            .copied()
            .find(|c| c.label().to_lowercase() == normalized);
        Some(picked.unwrap_or(SemanticCategory::Code))
    }
}

/// Whether a field is used for grouping/filtering or for aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Dimension,
    Measure,
}

impl Label for Axis {
    const VARIANTS: &'static [Self] = &[Axis::Dimension, Axis::Measure];

    fn label(&self) -> &'static str {
        match self {
            Axis::Dimension => "Dimension",
            Axis::Measure => "Measure",
        }
    }
}

/// Smallest time unit a date/time field resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateGranularity {
    Year,
    Month,
    Day,
    Quarter,
    Week,
    Hour,
    Minute,
    Second,
    Millisecond,
    Microsecond,
    Other,
}

impl Label for DateGranularity {
    const VARIANTS: &'static [Self] = &[
        DateGranularity::Year,
        DateGranularity::Month,
        DateGranularity::Day,
        DateGranularity::Quarter,
        DateGranularity::Week,
        DateGranularity::Hour,
        DateGranularity::Minute,
        DateGranularity::Second,
        DateGranularity::Millisecond,
        DateGranularity::Microsecond,
        DateGranularity::Other,
    ];

    fn label(&self) -> &'static str {
        match self {
            DateGranularity::Year => "YEAR",
            DateGranularity::Month => "MONTH",
            DateGranularity::Day => "DAY",
            DateGranularity::Quarter => "QUARTER",
            DateGranularity::Week => "WEEK",
            DateGranularity::Hour => "HOUR",
            DateGranularity::Minute => "MINUTE",
            DateGranularity::Second => "SECOND",
            DateGranularity::Millisecond => "MILLISECOND",
            DateGranularity::Microsecond => "MICROSECOND",
            DateGranularity::Other => "OTHER",
        }
    }
}

impl DateGranularity {
    /// Interpret a free-text answer; only exact labels (case-insensitive) count.
    pub fn from_answer(answer: &str) -> Option<Self> {
        Self::from_label(answer.trim().to_uppercase().as_str())
    }
}

macro_rules! label_display {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        })*
    };
}

label_display!(StructuralCategory, SemanticCategory, Axis, DateGranularity);

// Type sets per dialect. Entries are upper-case, without parameters.

const MYSQL_NUMBER: &[&str] = &[
    "TINYINT", "SMALLINT", "MEDIUMINT", "INT", "INTEGER", "BIGINT", "FLOAT", "DOUBLE", "DECIMAL",
];
const MYSQL_STRING: &[&str] = &[
    "BLOB", "TINYBLOB", "MEDIUMBLOB", "LONGBLOB", "CHAR", "VARCHAR", "TEXT", "TINYTEXT",
    "MEDIUMTEXT", "LONGTEXT",
];
const MYSQL_DATE: &[&str] = &["DATE", "TIME", "DATETIME", "TIMESTAMP", "YEAR"];
const MYSQL_OTHER: &[&str] = &["ENUM", "SET"];

const PG_NUMBER: &[&str] = &[
    "SMALLINT",
    "INTEGER",
    "BIGINT",
    "DECIMAL",
    "NUMERIC",
    "REAL",
    "DOUBLE PRECISION",
    "SMALLSERIAL",
    "SERIAL",
    "BIGSERIAL",
];
const PG_STRING: &[&str] = &["CHARACTER VARYING", "VARCHAR", "CHAR", "CHARACTER", "TEXT"];
const PG_DATE: &[&str] = &[
    "DATE",
    "TIME",
    "TIMESTAMP",
    "TIMESTAMP WITHOUT TIME ZONE",
    "TIMESTAMP WITH TIME ZONE",
    "TIME WITHOUT TIME ZONE",
    "TIME WITH TIME ZONE",
];

const SQLITE_NUMBER: &[&str] = &[
    "INTEGER", "INT", "BIGINT", "SMALLINT", "TINYINT", "REAL", "FLOAT", "DOUBLE", "NUMERIC",
    "DECIMAL",
];
const SQLITE_STRING: &[&str] = &["TEXT", "VARCHAR", "CHAR", "CLOB", "BLOB"];
const SQLITE_DATE: &[&str] = &["DATE", "TIME", "DATETIME", "TIMESTAMP"];

const BOOL_TYPES: &[&str] = &["BOOL", "BOOLEAN"];

/// Categories in lookup order.
const LOOKUP_ORDER: [StructuralCategory; 4] = [
    StructuralCategory::Number,
    StructuralCategory::String,
    StructuralCategory::DateTime,
    StructuralCategory::Bool,
];

/// The declared types a dialect maps onto `category`.
///
/// `Other` lists the types known to be deliberately unclassified; every type
/// absent from all sets also lands there.
pub fn type_set(kind: DatabaseKind, category: StructuralCategory) -> &'static [&'static str] {
    match (kind, category) {
        (DatabaseKind::Mysql, StructuralCategory::Number) => MYSQL_NUMBER,
        (DatabaseKind::Mysql, StructuralCategory::String) => MYSQL_STRING,
        (DatabaseKind::Mysql, StructuralCategory::DateTime) => MYSQL_DATE,
        (DatabaseKind::Mysql, StructuralCategory::Other) => MYSQL_OTHER,
        (DatabaseKind::Postgres, StructuralCategory::Number) => PG_NUMBER,
        (DatabaseKind::Postgres, StructuralCategory::String) => PG_STRING,
        (DatabaseKind::Postgres, StructuralCategory::DateTime) => PG_DATE,
        (DatabaseKind::Sqlite, StructuralCategory::Number) => SQLITE_NUMBER,
        (DatabaseKind::Sqlite, StructuralCategory::String) => SQLITE_STRING,
        (DatabaseKind::Sqlite, StructuralCategory::DateTime) => SQLITE_DATE,
        (_, StructuralCategory::Bool) => BOOL_TYPES,
        (_, StructuralCategory::Other) => &[],
    }
}

/// Text before the first `(`: `VARCHAR(32)` becomes `VARCHAR`.
pub fn abbreviate(raw_type: &str) -> &str {
    match raw_type.find('(') {
        Some(idx) => &raw_type[..idx],
        None => raw_type,
    }
}

/// Lookup key for a declared type: abbreviated, trimmed, upper-cased.
fn normalize(kind: Option<DatabaseKind>, raw_type: &str) -> String {
    let mut key = abbreviate(raw_type).trim().to_uppercase();
    if kind == Some(DatabaseKind::Mysql) {
        // MySQL 8 reports display modifiers without a width: `int unsigned`
        for modifier in [" UNSIGNED", " SIGNED", " ZEROFILL"] {
            if let Some(stripped) = key.strip_suffix(modifier) {
                key = stripped.trim_end().to_string();
            }
        }
    }
    key
}

/// Classify a declared column type.
///
/// With `kind == None` the union of every dialect's sets is consulted, so
/// types from an unrecognized engine still classify.
pub fn classify_structural(kind: Option<DatabaseKind>, raw_type: &str) -> StructuralCategory {
    let key = normalize(kind, raw_type);
    let kinds: &[DatabaseKind] = match kind {
        Some(ref k) => std::slice::from_ref(k),
        None => &DatabaseKind::ALL,
    };

    for category in LOOKUP_ORDER {
        if kinds
            .iter()
            .any(|k| type_set(*k, category).contains(&key.as_str()))
        {
            return category;
        }
    }
    StructuralCategory::Other
}

/// Classify by dialect name; unknown names fall back to the union of all sets.
pub fn classify_structural_by_name(dialect: &str, raw_type: &str) -> StructuralCategory {
    classify_structural(DatabaseKind::parse(dialect), raw_type)
}
