use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{Column, Row, TypeInfo};
use std::time::Duration;

use crate::db::RecordStore;
use crate::error::StoreError;
use crate::models::{
    ColumnDescriptor, DataKind, DbConfig, QueryPage, Record, RecordFilter, RecordQuery,
    TableDescriptor, PRIMARY_KEY,
};

/// Tables of one schema. Every other statement is qualified with the same schema.
const INTROSPECT_TABLES_SQL: &str = "SELECT n.nspname AS schema_name, c.relname AS table_name \
     FROM pg_catalog.pg_class c \
     JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace \
     WHERE c.relkind IN ('r', 'p') AND n.nspname = $1 \
     ORDER BY c.relname";

pub struct PostgresDriver {
    pool: Option<sqlx::PgPool>,
    schema: String,
}

impl PostgresDriver {
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            pool: None,
            schema: schema.into(),
        }
    }

    pub async fn connect(&mut self, config: &DbConfig) -> Result<(), StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&config.connection_string())
            .await?;

        tracing::info!(host = %config.host, db = %config.dbname, "connected to postgres");
        self.pool = Some(pool);
        Ok(())
    }

    fn pool(&self) -> Result<&sqlx::PgPool, StoreError> {
        self.pool.as_ref().ok_or(StoreError::NotConnected)
    }

    fn qualified(&self, table: &str) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(table))
    }
}

#[async_trait]
impl RecordStore for PostgresDriver {
    async fn introspect_tables(&self) -> Result<Vec<TableDescriptor>, StoreError> {
        let rows = sqlx::query(INTROSPECT_TABLES_SQL)
            .bind(&self.schema)
            .fetch_all(self.pool()?)
            .await?;

        Ok(rows
            .iter()
            .map(|row| TableDescriptor::new(row.get::<String, _>("schema_name"), row.get::<String, _>("table_name")))
            .collect())
    }

    async fn list_table_names(&self) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = $1 AND table_type = 'BASE TABLE' ORDER BY table_name",
        )
        .bind(&self.schema)
        .fetch_all(self.pool()?)
        .await?;

        Ok(rows.iter().map(|row| row.get("table_name")).collect())
    }

    async fn introspect_columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>, StoreError> {
        let sql = r#"
            SELECT
                a.attname AS column_name,
                format_type(a.atttypid, a.atttypmod) AS data_type,
                a.attnotnull AS not_null,
                pg_get_expr(d.adbin, d.adrelid) AS default_value
            FROM pg_attribute a
            JOIN pg_class c ON a.attrelid = c.oid
            JOIN pg_namespace n ON c.relnamespace = n.oid
            LEFT JOIN pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
            WHERE n.nspname = $1 AND c.relname = $2
              AND a.attnum > 0 AND NOT a.attisdropped
            ORDER BY a.attnum
        "#;

        let rows = sqlx::query(sql)
            .bind(&self.schema)
            .bind(table)
            .fetch_all(self.pool()?)
            .await?;

        if rows.is_empty() {
            return Err(StoreError::TableNotFound(table.to_string()));
        }

        Ok(rows
            .iter()
            .map(|row| {
                let name: String = row.get("column_name");
                let data_type: String = row.get("data_type");
                let not_null: bool = row.get("not_null");
                let mut column =
                    ColumnDescriptor::new(table, &name, DataKind::from_pg_type(&data_type), !not_null);
                column.default_value_expression = row.try_get("default_value").ok().flatten();
                column
            })
            .collect())
    }

    async fn query(&self, table: &str, query: &RecordQuery) -> Result<QueryPage, StoreError> {
        let pool = self.pool()?;
        let qualified = self.qualified(table);
        let pattern = query.filter.as_ref().map(|f| like_pattern(&f.term));

        let select_sql = build_select_sql(&qualified, query);
        tracing::debug!(table, sql = %select_sql, "querying records");
        let mut select = sqlx::query(&select_sql);
        if let Some(p) = &pattern {
            select = select.bind(p);
        }
        let rows = select.fetch_all(pool).await?;

        let count_sql = build_count_sql(&qualified, query.filter.as_ref());
        let mut count = sqlx::query(&count_sql);
        if let Some(p) = &pattern {
            count = count.bind(p);
        }
        let total: i64 = count.fetch_one(pool).await?.get(0);

        Ok(QueryPage {
            records: rows.iter().map(row_to_record).collect(),
            total_count: u64::try_from(total).unwrap_or(0),
        })
    }

    async fn insert(&self, table: &str, record: Record) -> Result<Record, StoreError> {
        let qualified = self.qualified(table);
        let sql = build_insert_sql(&qualified, &record);
        let mut insert = sqlx::query(&sql);
        if !record.is_empty() {
            insert = insert.bind(Json(Value::Object(record)));
        }
        let row = insert.fetch_one(self.pool()?).await?;
        Ok(row_to_record(&row))
    }

    async fn update(&self, table: &str, key: &Value, record: Record) -> Result<Record, StoreError> {
        let qualified = self.qualified(table);
        let key_text = key_to_text(key);
        let row = if record.is_empty() {
            sqlx::query(&format!(
                "SELECT * FROM {} WHERE {}::text = $1",
                qualified,
                quote_ident(PRIMARY_KEY)
            ))
            .bind(&key_text)
            .fetch_optional(self.pool()?)
            .await?
        } else {
            let sql = build_update_sql(&qualified, &record);
            sqlx::query(&sql)
                .bind(Json(Value::Object(record)))
                .bind(&key_text)
                .fetch_optional(self.pool()?)
                .await?
        };

        row.map(|r| row_to_record(&r))
            .ok_or_else(|| StoreError::Rejected(format!("No row with id {} in {}", key_text, table)))
    }

    async fn delete(&self, table: &str, key: &Value) -> Result<(), StoreError> {
        let key_text = key_to_text(key);
        let sql = format!(
            "DELETE FROM {} WHERE {}::text = $1",
            self.qualified(table),
            quote_ident(PRIMARY_KEY)
        );
        let result = sqlx::query(&sql).bind(&key_text).execute(self.pool()?).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Rejected(format!("No row with id {} in {}", key_text, table)));
        }
        Ok(())
    }

    async fn export_all(&self, table: &str) -> Result<Vec<Record>, StoreError> {
        let rows = sqlx::query(&format!("SELECT * FROM {}", self.qualified(table)))
            .fetch_all(self.pool()?)
            .await?;
        Ok(rows.iter().map(row_to_record).collect())
    }
}

pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `%term%` with LIKE wildcards in the term escaped.
pub(crate) fn like_pattern(term: &str) -> String {
    let mut pattern = String::from("%");
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn where_clause(filter: Option<&RecordFilter>) -> String {
    match filter {
        Some(f) if !f.columns.is_empty() => {
            let parts: Vec<String> = f
                .columns
                .iter()
                .map(|c| format!("{}::text ILIKE $1", quote_ident(c)))
                .collect();
            format!(" WHERE {}", parts.join(" OR "))
        }
        _ => String::new(),
    }
}

pub(crate) fn build_select_sql(qualified: &str, query: &RecordQuery) -> String {
    let order = query
        .order_by
        .as_ref()
        .map(|o| {
            format!(
                " ORDER BY {} {}",
                quote_ident(&o.column),
                if o.descending { "DESC" } else { "ASC" }
            )
        })
        .unwrap_or_default();
    format!(
        "SELECT * FROM {}{}{} LIMIT {} OFFSET {}",
        qualified,
        where_clause(query.filter.as_ref()),
        order,
        query.limit(),
        query.range_start
    )
}

pub(crate) fn build_count_sql(qualified: &str, filter: Option<&RecordFilter>) -> String {
    format!("SELECT COUNT(*) FROM {}{}", qualified, where_clause(filter))
}

fn column_list(record: &Record) -> String {
    record.keys().map(|k| quote_ident(k)).collect::<Vec<_>>().join(", ")
}

pub(crate) fn build_insert_sql(qualified: &str, record: &Record) -> String {
    if record.is_empty() {
        return format!("INSERT INTO {} DEFAULT VALUES RETURNING *", qualified);
    }
    let columns = column_list(record);
    format!(
        "INSERT INTO {q} ({c}) SELECT {c} FROM jsonb_populate_record(NULL::{q}, $1) RETURNING *",
        q = qualified,
        c = columns
    )
}

pub(crate) fn build_update_sql(qualified: &str, record: &Record) -> String {
    let columns = column_list(record);
    format!(
        "UPDATE {q} SET ({c}) = (SELECT {c} FROM jsonb_populate_record(NULL::{q}, $1)) \
         WHERE {pk}::text = $2 RETURNING *",
        q = qualified,
        c = columns,
        pk = quote_ident(PRIMARY_KEY)
    )
}

fn key_to_text(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn row_to_record(row: &PgRow) -> Record {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, c)| (c.name().to_string(), map_postgres_value(row, i)))
        .collect()
}

/// How a column's wire value is turned into JSON, picked from the sqlx type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decoder {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Text,
    Uuid,
    TimestampTz,
    Timestamp,
    Date,
    Numeric,
    Money,
    TextArray,
    Int2Array,
    Int4Array,
    Int8Array,
    Float4Array,
    Float8Array,
    BoolArray,
    JsonArray,
    Json,
    Other,
}

fn decoder_for(type_name: &str) -> Decoder {
    match type_name {
        "BOOL" => Decoder::Bool,
        "INT2" => Decoder::Int2,
        "INT4" => Decoder::Int4,
        "INT8" => Decoder::Int8,
        "FLOAT4" => Decoder::Float4,
        "FLOAT8" => Decoder::Float8,
        "TEXT" | "VARCHAR" | "CHAR" | "NAME" | "BPCHAR" => Decoder::Text,
        "UUID" => Decoder::Uuid,
        "TIMESTAMPTZ" => Decoder::TimestampTz,
        "TIMESTAMP" => Decoder::Timestamp,
        "DATE" => Decoder::Date,
        "NUMERIC" => Decoder::Numeric,
        "MONEY" => Decoder::Money,
        "VARCHAR[]" | "TEXT[]" | "CHAR[]" | "NAME[]" | "BPCHAR[]" | "_varchar" | "_text" | "_char"
        | "_name" | "_bpchar" => Decoder::TextArray,
        "INT2[]" | "_int2" => Decoder::Int2Array,
        "INT4[]" | "_int4" => Decoder::Int4Array,
        "INT8[]" | "_int8" => Decoder::Int8Array,
        "FLOAT4[]" | "_float4" => Decoder::Float4Array,
        "FLOAT8[]" | "_float8" => Decoder::Float8Array,
        "BOOL[]" | "_bool" => Decoder::BoolArray,
        "JSON[]" | "JSONB[]" | "_json" | "_jsonb" => Decoder::JsonArray,
        "JSON" | "JSONB" => Decoder::Json,
        _ => Decoder::Other,
    }
}

/// MONEY travels as big-endian 64-bit cents.
fn money_from_bytes(bytes: &[u8]) -> Option<Value> {
    let cents = i64::from_be_bytes(bytes.try_into().ok()?);
    serde_json::Number::from_f64(cents as f64 / 100.0).map(Value::Number)
}

/// Goes through the shortest decimal form so `1.1f32` stays `1.1`.
fn f32_to_json(v: f32) -> Value {
    v.to_string()
        .parse::<serde_json::Number>()
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn decimal_to_json(d: sqlx::types::BigDecimal) -> Value {
    let text = d.normalized().to_string();
    text.parse::<serde_json::Number>()
        .map(Value::Number)
        .unwrap_or(Value::String(text))
}

fn decode<'r, T>(row: &'r PgRow, index: usize) -> Value
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres> + serde::Serialize,
{
    row.try_get::<Option<T>, _>(index)
        .ok()
        .flatten()
        .and_then(|v| serde_json::to_value(v).ok())
        .unwrap_or(Value::Null)
}

fn map_postgres_value(row: &PgRow, index: usize) -> Value {
    use sqlx::ValueRef;
    let value_ref = match row.try_get_raw(index) {
        Ok(v) => v,
        Err(_) => return Value::Null,
    };

    if value_ref.is_null() {
        return Value::Null;
    }

    let type_info = value_ref.type_info();
    let type_name = type_info.name();

    match decoder_for(type_name) {
        Decoder::Bool => decode::<bool>(row, index),
        Decoder::Int2 => decode::<i16>(row, index),
        Decoder::Int4 => decode::<i32>(row, index),
        Decoder::Int8 => decode::<i64>(row, index),
        Decoder::Float4 => {
            let v: Option<f32> = row.try_get(index).ok().flatten();
            v.map(f32_to_json).unwrap_or(Value::Null)
        }
        Decoder::Float8 => decode::<f64>(row, index),
        Decoder::Text => decode::<String>(row, index),
        Decoder::Uuid => {
            let v: Option<uuid::Uuid> = row.try_get(index).ok().flatten();
            v.map(|u| Value::String(u.to_string())).unwrap_or(Value::Null)
        }
        Decoder::TimestampTz => {
            let v: Option<DateTime<Utc>> = row.try_get(index).ok();
            v.map(|t| Value::String(t.to_rfc3339())).unwrap_or(Value::Null)
        }
        Decoder::Timestamp => {
            let v: Option<NaiveDateTime> = row.try_get(index).ok();
            v.map(|t| Value::String(t.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
                .unwrap_or(Value::Null)
        }
        Decoder::Date => {
            let v: Option<NaiveDate> = row.try_get(index).ok();
            v.map(|d| Value::String(d.to_string())).unwrap_or(Value::Null)
        }
        Decoder::Numeric => {
            let v: Option<sqlx::types::BigDecimal> = row.try_get(index).ok();
            v.map(decimal_to_json).unwrap_or(Value::Null)
        }
        // sqlx has no Rust type for MONEY, so read the raw cents.
        Decoder::Money => value_ref
            .as_bytes()
            .ok()
            .and_then(money_from_bytes)
            .unwrap_or_else(|| Value::String(format!("<{}>", type_name))),
        Decoder::TextArray => decode::<Vec<String>>(row, index),
        Decoder::Int2Array => decode::<Vec<i16>>(row, index),
        Decoder::Int4Array => decode::<Vec<i32>>(row, index),
        Decoder::Int8Array => decode::<Vec<i64>>(row, index),
        Decoder::Float4Array => {
            let v: Option<Vec<f32>> = row.try_get(index).ok().flatten();
            v.map(|items| Value::Array(items.into_iter().map(f32_to_json).collect()))
                .unwrap_or(Value::Null)
        }
        Decoder::Float8Array => decode::<Vec<f64>>(row, index),
        Decoder::BoolArray => decode::<Vec<bool>>(row, index),
        Decoder::JsonArray => decode::<Vec<Value>>(row, index),
        Decoder::Json => {
            let v: Option<Value> = row.try_get(index).ok();
            v.unwrap_or(Value::Null)
        }
        Decoder::Other => {
            if let Ok(Some(s)) = row.try_get::<Option<String>, _>(index) {
                return Value::String(s);
            }
            // Other arrays are binary on the wire.
            if type_name.ends_with("[]") || type_name.starts_with('_') {
                return Value::String(format!("<{}>", type_name));
            }
            // Bypass sqlx type checks and read the raw text form.
            match value_ref.as_bytes().map(std::str::from_utf8) {
                Ok(Ok(s)) => Value::String(s.to_string()),
                _ => Value::String(format!("<{}>", type_name)),
            }
        }
    }
}
