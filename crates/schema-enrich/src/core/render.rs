//! M-Schema text notation.
//!
//! A compact, line-oriented rendering of the schema model meant to be pasted
//! into prompts. Output is fully determined by the model and the options.

use crate::core::schema::{Database, Field, Table};
use crate::typemap::abbreviate;

/// Declared types whose examples collapse to a single value.
const DATE_TYPES: [&str; 4] = ["DATE", "TIME", "DATETIME", "TIMESTAMP"];

/// What to render and how much detail to include.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Table allow-list; `None` renders every table.
    pub selected_tables: Option<Vec<String>>,

    /// Column allow-list as `table.column`. Replaces `selected_tables` with
    /// exactly the tables it mentions.
    pub selected_columns: Option<Vec<String>>,

    /// Maximum examples per field; 0 disables examples.
    pub example_num: usize,

    /// Render the full declared type instead of its abbreviation.
    pub show_type_detail: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            selected_tables: None,
            selected_columns: None,
            example_num: 3,
            show_type_detail: false,
        }
    }
}

impl RenderOptions {
    /// Lower-cased table allow-list after applying the column override.
    fn effective_tables(&self) -> Option<Vec<String>> {
        match (&self.selected_columns, &self.selected_tables) {
            (Some(columns), _) => Some(
                columns
                    .iter()
                    .map(|c| c.split('.').next().unwrap_or_default().to_lowercase())
                    .collect(),
            ),
            (None, Some(tables)) => Some(tables.iter().map(|t| t.to_lowercase()).collect()),
            (None, None) => None,
        }
    }

    fn effective_columns(&self) -> Option<Vec<String>> {
        self.selected_columns
            .as_ref()
            .map(|cols| cols.iter().map(|c| c.to_lowercase()).collect())
    }
}

/// Render one table block. `columns` holds lower-cased field names to keep.
pub fn render_table(
    db: &Database,
    table: &Table,
    columns: Option<&[String]>,
    example_num: usize,
    show_type_detail: bool,
) -> String {
    let mut output = Vec::new();

    let qualified = match db.schema.as_deref() {
        Some(schema) if !schema.is_empty() => format!("{}.{}", schema, table.name),
        _ => table.name.clone(),
    };
    if table.comment.is_empty() || table.comment == "None" {
        output.push(format!("# Table: {}", qualified));
    } else {
        output.push(format!("# Table: {}, {}", qualified, table.comment));
    }

    let field_lines: Vec<String> = table
        .fields
        .values()
        .filter(|f| columns.map_or(true, |cols| cols.contains(&f.name.to_lowercase())))
        .map(|f| render_field(f, example_num, show_type_detail))
        .collect();

    output.push("[".to_string());
    output.push(field_lines.join(",\n"));
    output.push("]".to_string());
    output.join("\n")
}

fn render_field(field: &Field, example_num: usize, show_type_detail: bool) -> String {
    let rendered_type = if show_type_detail {
        field.raw_type.to_uppercase()
    } else {
        abbreviate(&field.raw_type).to_uppercase()
    };

    let mut line = format!("({}:{}", field.name, rendered_type);
    if !field.comment.is_empty() {
        line.push_str(", ");
        line.push_str(field.comment.trim());
    }
    if field.primary_key {
        line.push_str(", Primary Key");
    }

    if !field.examples.is_empty() && example_num > 0 {
        let examples = select_examples(&field.examples, &rendered_type, example_num);
        if !examples.is_empty() {
            line.push_str(", Examples: [");
            line.push_str(&examples.join(", "));
            line.push(']');
        }
    }

    line.push(')');
    line
}

/// Example truncation policy; lengths are counted in characters.
pub fn select_examples<'a>(examples: &'a [String], rendered_type: &str, example_num: usize) -> Vec<&'a str> {
    let truncated: Vec<&str> = examples
        .iter()
        .take(example_num)
        .map(String::as_str)
        .collect();
    if truncated.is_empty() {
        return truncated;
    }

    if DATE_TYPES.contains(&rendered_type) {
        return truncated[..1].to_vec();
    }

    let longest = truncated
        .iter()
        .map(|s| s.chars().count())
        .max()
        .unwrap_or(0);
    if longest > 50 {
        Vec::new()
    } else if longest > 20 {
        truncated[..1].to_vec()
    } else {
        truncated
    }
}

/// Render the whole model.
pub fn render_database(db: &Database, options: &RenderOptions) -> String {
    let selected_tables = options.effective_tables();
    let selected_columns = options.effective_columns();
    let is_selected = |name: &str| {
        selected_tables
            .as_ref()
            .map_or(true, |tables| tables.contains(&name.to_lowercase()))
    };

    let mut output = vec![format!("【DB_ID】 {}", db.db_id), "【Schema】".to_string()];

    for table in db.tables.values().filter(|t| is_selected(&t.name)) {
        let columns: Option<Vec<String>> = selected_columns.as_ref().map(|cols| {
            table
                .fields
                .values()
                .filter(|f| cols.contains(&format!("{}.{}", table.name, f.name).to_lowercase()))
                .map(|f| f.name.to_lowercase())
                .collect()
        });
        output.push(render_table(
            db,
            table,
            columns.as_deref(),
            options.example_num,
            options.show_type_detail,
        ));
    }

    if !db.foreign_keys.is_empty() {
        output.push("【Foreign keys】".to_string());
        for fk in &db.foreign_keys {
            if is_selected(&fk.table) && is_selected(&fk.ref_table) && fk.ref_schema == db.schema {
                output.push(format!(
                    "{}.{}={}.{}",
                    fk.table, fk.column, fk.ref_table, fk.ref_column
                ));
            }
        }
    }

    output.join("\n")
}

impl Database {
    /// Render the model with the given options.
    pub fn render(&self, options: &RenderOptions) -> String {
        render_database(self, options)
    }

    /// Render a single table with every field; `None` if the table is absent.
    pub fn render_table(&self, table: &str, example_num: usize, show_type_detail: bool) -> Option<String> {
        self.tables
            .get(table)
            .map(|t| render_table(self, t, None, example_num, show_type_detail))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::ForeignKey;
    use crate::typemap::DatabaseKind;

    fn users_db() -> Database {
        let mut db = Database::new("shop", None, Some(DatabaseKind::Mysql));
        db.add_table(Table::new("users", ""));
        let mut id = Field::new("id", "INT");
        id.primary_key = true;
        id.unique = true;
        id.examples = vec!["1".into(), "2".into(), "3".into(), "4".into()];
        db.add_field("users", id).unwrap();

        let mut name = Field::new("name", "varchar(32)");
        name.comment = "  user name ".into();
        name.examples = vec!["alice".into(), "bob".into()];
        db.add_field("users", name).unwrap();

        let mut created = Field::new("created_at", "datetime");
        created.examples = vec!["2024-01-01 00:00:00".into(), "2024-01-02 00:00:00".into()];
        db.add_field("users", created).unwrap();
        db
    }

    #[test]
    fn test_render_users_table() {
        let db = users_db();
        let text = db.render(&RenderOptions::default());
        let expected = "【DB_ID】 shop\n【Schema】\n# Table: users\n[\n\
(id:INT, Primary Key, Examples: [1, 2, 3]),\n\
(name:VARCHAR, user name, Examples: [alice, bob]),\n\
(created_at:DATETIME, Examples: [2024-01-01 00:00:00])\n]";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_render_is_idempotent() {
        let db = users_db();
        let opts = RenderOptions::default();
        assert_eq!(db.render(&opts), db.render(&opts));
    }

    #[test]
    fn test_header_with_schema_and_comment() {
        let mut db = users_db();
        db.schema = Some("public".into());
        db.set_table_comment("users", "People").unwrap();
        let block = db.render_table("users", 0, false).unwrap();
        assert!(block.starts_with("# Table: public.users, People\n["));
        assert!(block.contains("(id:INT, Primary Key)"));
    }

    #[test]
    fn test_literal_none_comment_is_hidden() {
        let mut db = users_db();
        db.set_table_comment("users", "None").unwrap();
        assert!(db.render_table("users", 3, false).unwrap().starts_with("# Table: users\n"));
    }

    #[test]
    fn test_show_type_detail() {
        let db = users_db();
        let block = db.render_table("users", 0, true).unwrap();
        assert!(block.contains("(name:VARCHAR(32), user name)"));
    }

    #[test]
    fn test_example_truncation_policy() {
        let long21 = "a".repeat(21);
        let long51 = "b".repeat(51);

        let examples = vec!["x".to_string(), long21.clone(), "y".to_string()];
        assert_eq!(select_examples(&examples, "VARCHAR", 3), vec!["x"]);

        let examples = vec!["x".to_string(), long51];
        assert!(select_examples(&examples, "VARCHAR", 3).is_empty());

        let examples = vec!["x".to_string(), "y".to_string(), "z".to_string(), "w".to_string()];
        assert_eq!(select_examples(&examples, "TEXT", 2), vec!["x", "y"]);
        assert_eq!(select_examples(&examples, "DATE", 3), vec!["x"]);

        // the long value is beyond example_num and does not count
        let examples = vec!["x".to_string(), "y".to_string(), long21];
        assert_eq!(select_examples(&examples, "TEXT", 2), vec!["x", "y"]);
    }

    #[test]
    fn test_example_length_counts_characters() {
        let wide = "数".repeat(20);
        let examples = vec![wide.clone(), "y".to_string()];
        assert_eq!(select_examples(&examples, "TEXT", 3), vec![wide.as_str(), "y"]);
    }

    #[test]
    fn test_column_selection_is_case_insensitive() {
        let db = users_db();
        let opts = RenderOptions {
            selected_columns: Some(vec!["USERS.Name".into()]),
            example_num: 0,
            ..Default::default()
        };
        let text = db.render(&opts);
        assert!(text.ends_with("# Table: users\n[\n(name:VARCHAR, user name)\n]"));
    }

    #[test]
    fn test_foreign_keys_respect_selection_and_schema() {
        let mut db = users_db();
        db.add_table(Table::new("orders", "purchases"));
        db.add_field("orders", Field::new("user_id", "INT")).unwrap();
        db.add_foreign_key(ForeignKey {
            table: "orders".into(),
            column: "user_id".into(),
            ref_schema: None,
            ref_table: "users".into(),
            ref_column: "id".into(),
        });
        db.add_foreign_key(ForeignKey {
            table: "orders".into(),
            column: "user_id".into(),
            ref_schema: Some("other".into()),
            ref_table: "accounts".into(),
            ref_column: "id".into(),
        });

        let all = db.render(&RenderOptions::default());
        assert!(all.ends_with("【Foreign keys】\norders.user_id=users.id"));

        let only_orders = db.render(&RenderOptions {
            selected_tables: Some(vec!["Orders".into()]),
            ..Default::default()
        });
        assert!(!only_orders.contains("# Table: users"));
        assert!(only_orders.ends_with("【Foreign keys】"));
    }
}
