use serde_json::Value;

use crate::models::{ColumnDescriptor, DataKind, Record, TableSchema};

/// Interpretation of a column's default expression.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    Literal(Value),
    /// Computed by the database (`now()`, `nextval(...)`, ...).
    Server,
}

/// Parses a Postgres-style default expression such as `'draft'::text`, `0`,
/// `true` or `'{}'::jsonb`. Anything that is not a literal is server-generated.
pub fn parse_default(expression: &str, kind: DataKind) -> DefaultValue {
    let expr = expression.trim();

    if let Some(text) = quoted_literal(expr) {
        let value = match kind {
            DataKind::Json => serde_json::from_str(&text).unwrap_or(Value::String(text)),
            DataKind::Boolean => match text.as_str() {
                "t" | "true" => Value::Bool(true),
                "f" | "false" => Value::Bool(false),
                _ => Value::String(text),
            },
            DataKind::Integer | DataKind::Numeric => number_literal(&text).unwrap_or(Value::String(text)),
            DataKind::Text | DataKind::Timestamp => Value::String(text),
        };
        return DefaultValue::Literal(value);
    }

    let bare = strip_cast(expr).trim_start_matches('(').trim_end_matches(')');
    match bare.to_ascii_lowercase().as_str() {
        "null" => DefaultValue::Literal(Value::Null),
        "true" => DefaultValue::Literal(Value::Bool(true)),
        "false" => DefaultValue::Literal(Value::Bool(false)),
        _ => number_literal(bare).map_or(DefaultValue::Server, DefaultValue::Literal),
    }
}

/// Contents of a leading `'...'` literal, with `''` unescaped, if the rest of
/// the expression is only a cast.
fn quoted_literal(expr: &str) -> Option<String> {
    let body = expr.strip_prefix('\'')?;
    let mut out = String::new();
    let mut chars = body.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c == '\'' {
            if matches!(chars.peek(), Some((_, '\''))) {
                out.push('\'');
                chars.next();
                continue;
            }
            let rest = body[i + 1..].trim();
            return (rest.is_empty() || rest.starts_with("::")).then_some(out);
        }
        out.push(c);
    }
    None
}

fn strip_cast(expr: &str) -> &str {
    expr.split("::").next().unwrap_or(expr).trim()
}

fn number_literal(text: &str) -> Option<Value> {
    let text = text.trim();
    if let Ok(i) = text.parse::<i64>() {
        return Some(Value::from(i));
    }
    text.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
}

fn zero_value(column: &ColumnDescriptor) -> Value {
    match column.data_kind {
        DataKind::Text => Value::String(String::new()),
        _ if column.nullable => Value::Null,
        DataKind::Integer | DataKind::Numeric => Value::from(0),
        DataKind::Boolean => Value::Bool(false),
        DataKind::Json => Value::Object(Record::new()),
        DataKind::Timestamp => Value::Null,
    }
}

/// Initial value of `column` in a new record.
pub fn initial_value(column: &ColumnDescriptor) -> Value {
    if column.is_primary_key {
        return Value::Null;
    }
    match &column.default_value_expression {
        Some(expr) => match parse_default(expr, column.data_kind) {
            DefaultValue::Literal(v) => v,
            DefaultValue::Server => Value::Null,
        },
        None => zero_value(column),
    }
}

pub fn new_record(schema: &TableSchema) -> Record {
    schema
        .columns
        .iter()
        .map(|c| (c.column_name.clone(), initial_value(c)))
        .collect()
}
