//! Text rendering of discovery results for agents.

use gateway_core::{ColumnSchema, Row, Table};
use serde::Serialize;

/// Column view shown to agents. PII flags stay server-side.
#[derive(Debug, Serialize)]
struct PromptColumn<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    column_type: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    primary_key: bool,
}

impl<'a> From<&'a ColumnSchema> for PromptColumn<'a> {
    fn from(column: &'a ColumnSchema) -> Self {
        Self {
            name: &column.name,
            column_type: column.column_type.to_string(),
            primary_key: column.primary_key,
        }
    }
}

/// Render any serializable value as YAML, falling back to its JSON form.
pub fn yamlify<T: Serialize + ?Sized>(value: &T) -> String {
    serde_yaml::to_string(value)
        .or_else(|_| serde_json::to_string_pretty(value))
        .unwrap_or_default()
}

/// Render column lists as YAML.
pub fn columns_yaml(columns: &[ColumnSchema]) -> String {
    let view: Vec<PromptColumn<'_>> = columns.iter().map(PromptColumn::from).collect();
    yamlify(&view)
}

/// Table view shown to agents by `list_tables`.
#[derive(Debug, Serialize)]
struct PromptTable<'a> {
    name: String,
    columns: Vec<PromptColumn<'a>>,
    row_count: i64,
}

/// Prefix `name` with `schema` unless it is already qualified.
pub fn qualified_name(name: &str, schema: &str) -> String {
    if name.contains('.') || schema.is_empty() {
        name.to_string()
    } else {
        format!("{schema}.{name}")
    }
}

/// Render one table record (qualified name, columns, row count) as YAML.
pub fn table_yaml(table: &Table, schema: &str) -> String {
    yamlify(&PromptTable {
        name: qualified_name(&table.name, schema),
        columns: table.columns.iter().map(PromptColumn::from).collect(),
        row_count: table.row_count,
    })
}

/// Describe tables with their schema and a data sample. Unqualified table
/// names are prefixed with `schema` when one is given.
pub fn tables_prompt(tables: &[(Table, Vec<Row>)], schema: &str) -> String {
    let mut out = String::new();
    for (table, sample) in tables {
        let name = qualified_name(&table.name, schema);
        out.push_str(&format!(
            "\n<{name} number_columns={} number_rows={}>\nschema:\n{}---\ndata_sample:\n{}</{name}>\n\n",
            table.columns.len(),
            table.row_count,
            columns_yaml(&table.columns),
            yamlify(sample),
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::ColumnType;
    use serde_json::json;

    #[test]
    fn test_tables_prompt_hides_pii_and_qualifies_names() {
        let mut email = ColumnSchema::new("email", ColumnType::String);
        email.pii = true;
        let mut id = ColumnSchema::new("id", ColumnType::Integer);
        id.primary_key = true;
        let table = Table {
            name: "users".into(),
            columns: vec![id, email],
            row_count: 12,
        };
        let sample = vec![json!({ "id": 1, "email": "a@b.c" }).as_object().unwrap().clone()];

        let prompt = tables_prompt(&[(table, sample)], "public");
        assert!(prompt.contains("<public.users number_columns=2 number_rows=12>"));
        assert!(prompt.contains("primary_key: true"));
        assert!(!prompt.contains("pii"));
        assert!(prompt.contains("</public.users>"));
    }

    #[test]
    fn test_table_yaml_keeps_the_whole_record() {
        let table = Table {
            name: "users".into(),
            columns: vec![
                ColumnSchema::new("id", ColumnType::Integer),
                ColumnSchema::new("email", ColumnType::String),
            ],
            row_count: 12,
        };

        let yaml = table_yaml(&table, "public");
        assert!(yaml.contains("name: public.users"), "{yaml}");
        assert!(yaml.contains("row_count: 12"));
        assert!(yaml.contains("- name: email"));

        assert_eq!(qualified_name("crm.users", "public"), "crm.users");
        assert_eq!(qualified_name("users", ""), "users");
    }
}
