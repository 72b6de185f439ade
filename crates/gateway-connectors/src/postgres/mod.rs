//! Built-in PostgreSQL connector.
//!
//! Rows are produced by the server as JSON (`to_jsonb`) so every column type
//! decodes uniformly. Endpoint queries use `:name` placeholders which are
//! rewritten to positional binds before execution.

mod config;

pub use config::PostgresConfig;

use crate::connector::{Connector, ConnectorConfig};
use crate::error::ConnectorError;
use crate::params::{cast_params, guess_column_type, NamedQuery};
use async_trait::async_trait;
use gateway_core::{ColumnSchema, Endpoint, Params, RequestContext, Row, Table};
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::{Arguments, Column as _, Executor as _, Row as _, Statement as _, TypeInfo as _};

const SAMPLE_LIMIT: usize = 5;

pub struct PostgresConnector {
    config: PostgresConfig,
    pool: sqlx::PgPool,
}

impl PostgresConnector {
    /// Create a connector with a lazily connected pool. Must be called from
    /// within a Tokio runtime.
    pub fn new(config: PostgresConfig) -> anyhow::Result<Self> {
        let options = config.connect_options()?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect_lazy_with(options);
        Ok(Self { config, pool })
    }

    async fn fetch_rows(&self, sql: &str, args: PgArguments) -> Result<Vec<Row>, ConnectorError> {
        let statement = sql.trim().trim_end_matches(';').trim_end();

        match StatementKind::of(statement) {
            StatementKind::Rows => {
                let wrapped = format!("WITH q AS ({statement}) SELECT to_jsonb(q) AS row FROM q");
                let records = sqlx::query_with(&wrapped, args)
                    .fetch_all(&self.pool)
                    .await?;
                records.iter().map(json_row).collect()
            }
            StatementKind::Command => {
                let result = sqlx::query_with(statement, args)
                    .execute(&self.pool)
                    .await?;
                tracing::debug!(rows_affected = result.rows_affected(), "Statement executed");
                Ok(Vec::new())
            }
        }
    }

    async fn load_columns(&self, table: &str) -> Result<Vec<ColumnSchema>, ConnectorError> {
        let rows = sqlx::query(
            r#"
            select c.column_name::text as column_name,
                   c.data_type::text as data_type,
                   exists (
                     select 1
                     from information_schema.table_constraints tc
                     join information_schema.key_column_usage kcu
                       on tc.constraint_name = kcu.constraint_name
                      and tc.table_schema = kcu.table_schema
                     where tc.constraint_type = 'PRIMARY KEY'
                       and tc.table_schema = c.table_schema
                       and tc.table_name = c.table_name
                       and kcu.column_name = c.column_name
                   ) as primary_key
            from information_schema.columns c
            where c.table_schema = $1 and c.table_name = $2
            order by c.ordinal_position
            "#,
        )
        .bind(&self.config.schema)
        .bind(table)
        .fetch_all(&self.pool)
        .await?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("column_name")?;
            let data_type: String = row.try_get("data_type")?;
            let mut column = ColumnSchema::new(name, guess_column_type(&data_type));
            column.primary_key = row.try_get("primary_key")?;
            columns.push(column);
        }
        Ok(columns)
    }

    async fn estimate_rows(&self, table: &str) -> Result<i64, ConnectorError> {
        let estimate: Option<(i64,)> = sqlx::query_as(
            r#"
            select greatest(c.reltuples, 0)::bigint
            from pg_class c
            join pg_namespace n on n.oid = c.relnamespace
            where n.nspname = $1 and c.relname = $2
            "#,
        )
        .bind(&self.config.schema)
        .bind(table)
        .fetch_optional(&self.pool)
        .await?;
        Ok(estimate.map(|(n,)| n).unwrap_or_default())
    }
}

#[async_trait]
impl Connector for PostgresConnector {
    async fn ping(&self) -> Result<(), ConnectorError> {
        sqlx::query("select 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn query(
        &self,
        _ctx: &RequestContext,
        endpoint: &Endpoint,
        params: &Params,
    ) -> Result<Vec<Row>, ConnectorError> {
        let params = cast_params(endpoint, params)?;
        let named = NamedQuery::parse(&endpoint.query);

        let mut args = PgArguments::default();
        for value in named.values(&params)? {
            bind_value(&mut args, value)?;
        }

        self.fetch_rows(&named.sql, args).await
    }

    async fn discovery(
        &self,
        _ctx: &RequestContext,
        table_filter: &[String],
    ) -> Result<Vec<Table>, ConnectorError> {
        let names: Vec<(String,)> = sqlx::query_as(
            r#"
            select table_name::text
            from information_schema.tables
            where table_schema = $1 and table_type = 'BASE TABLE'
            order by table_name
            "#,
        )
        .bind(&self.config.schema)
        .fetch_all(&self.pool)
        .await?;

        let mut tables = Vec::new();
        for (name,) in names {
            if !table_filter.is_empty() && !table_filter.iter().any(|t| t == &name) {
                continue;
            }
            let columns = self.load_columns(&name).await?;
            let row_count = self.estimate_rows(&name).await?;
            tables.push(Table {
                name,
                columns,
                row_count,
            });
        }

        tracing::debug!(tables = tables.len(), "Discovery finished");
        Ok(tables)
    }

    async fn sample(
        &self,
        _ctx: &RequestContext,
        table: &Table,
    ) -> Result<Vec<Row>, ConnectorError> {
        let ident = qualified_ident(&table.name);
        let sql = format!("SELECT * FROM {ident} LIMIT {SAMPLE_LIMIT}");
        self.fetch_rows(&sql, PgArguments::default()).await
    }

    async fn infer_query(
        &self,
        _ctx: &RequestContext,
        query: &str,
    ) -> Result<Vec<ColumnSchema>, ConnectorError> {
        let named = NamedQuery::parse(query);
        let statement = self.pool.prepare(named.sql.as_str()).await?;
        Ok(statement
            .columns()
            .iter()
            .map(|column| ColumnSchema::new(column.name(), guess_column_type(column.type_info().name())))
            .collect())
    }

    fn config(&self) -> ConnectorConfig {
        ConnectorConfig {
            type_name: "postgres".to_string(),
            doc: PostgresConfig::DOC.to_string(),
            readonly: false,
            schema: PostgresConfig::schema_doc(),
            extra_prompt: "Use PostgreSQL syntax. Reference parameters as :name. \
                Quote identifiers with double quotes when they contain upper case letters."
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatementKind {
    /// Produces rows and can be wrapped in a CTE.
    Rows,
    /// Executed for its side effects only.
    Command,
}

impl StatementKind {
    fn of(statement: &str) -> Self {
        let lowered = statement.to_ascii_lowercase();
        let first = lowered.split_whitespace().next().unwrap_or_default();
        match first {
            "select" | "with" | "values" | "table" => StatementKind::Rows,
            "insert" | "update" | "delete" if lowered.contains("returning") => StatementKind::Rows,
            _ => StatementKind::Command,
        }
    }
}

fn json_row(record: &PgRow) -> Result<Row, ConnectorError> {
    match record.try_get::<Value, _>("row")? {
        Value::Object(map) => Ok(map),
        other => Err(ConnectorError::Other(anyhow::anyhow!(
            "expected a JSON object row, got {other}"
        ))),
    }
}

fn args_add<T>(args: &mut PgArguments, value: T) -> Result<(), ConnectorError>
where
    T: Send + Sync + 'static,
    for<'q> T: sqlx::Encode<'q, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    args.add(value)
        .map_err(|e| ConnectorError::Other(anyhow::anyhow!(e)))
}

fn bind_value(args: &mut PgArguments, value: &Value) -> Result<(), ConnectorError> {
    match value {
        Value::Null => args_add(args, Option::<String>::None),
        Value::Bool(b) => args_add(args, *b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => args_add(args, i),
            None => args_add(args, n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => args_add(args, s.clone()),
        other => args_add(args, sqlx::types::Json(other.clone())),
    }
}

/// Quote a possibly schema-qualified table name.
fn qualified_ident(name: &str) -> String {
    name.split('.')
        .map(|part| format!("\"{}\"", part.trim_matches('"').replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_kind() {
        assert_eq!(StatementKind::of("SELECT 1"), StatementKind::Rows);
        assert_eq!(StatementKind::of("  with a as (select 1) select * from a"), StatementKind::Rows);
        assert_eq!(
            StatementKind::of("INSERT INTO t (a) VALUES ($1) RETURNING id"),
            StatementKind::Rows
        );
        assert_eq!(StatementKind::of("DELETE FROM t WHERE id = $1"), StatementKind::Command);
    }

    #[test]
    fn test_qualified_ident() {
        assert_eq!(qualified_ident("users"), "\"users\"");
        assert_eq!(qualified_ident("sales.orders"), "\"sales\".\"orders\"");
        assert_eq!(qualified_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[tokio::test]
    async fn test_connector_config() {
        let connector =
            PostgresConnector::new(PostgresConfig::from_value("postgres://localhost/app".into()).unwrap())
                .unwrap();
        let config = connector.config();
        assert_eq!(config.type_name, "postgres");
        assert!(!config.readonly);
        assert!(config.extra_prompt.contains(":name"));
    }
}
