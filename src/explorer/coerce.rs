//! Converts edited form values back into column-typed values before a save.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::{Number, Value};

use crate::config::CoercionPolicy;
use crate::error::{ExplorerError, ExplorerResult};
use crate::models::{ColumnDescriptor, DataKind, Record, TableSchema};

/// A field whose value was submitted as-is because it could not be converted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoercionWarning {
    pub column: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Coerced {
    pub record: Record,
    pub warnings: Vec<CoercionWarning>,
}

/// Coerces every field of `edited` that has a column descriptor. Keys without a
/// descriptor are dropped.
pub fn coerce_record(schema: &TableSchema, edited: &Record, policy: CoercionPolicy) -> ExplorerResult<Coerced> {
    let mut coerced = Coerced::default();
    for (key, value) in edited {
        let Some(column) = schema.column(key) else {
            tracing::debug!(table = %schema.table_name, column = %key, "dropping field without column metadata");
            continue;
        };
        let value = coerce_value(column, value, policy, &mut coerced.warnings)?;
        coerced.record.insert(key.clone(), value);
    }
    Ok(coerced)
}

pub fn coerce_value(
    column: &ColumnDescriptor,
    value: &Value,
    policy: CoercionPolicy,
    warnings: &mut Vec<CoercionWarning>,
) -> ExplorerResult<Value> {
    let Value::String(raw) = value else {
        return Ok(value.clone());
    };

    // Whitespace is content for text columns and blank for every other kind.
    let blank = raw.is_empty() || (column.data_kind != DataKind::Text && raw.trim().is_empty());
    if blank {
        if column.nullable {
            return Ok(Value::Null);
        }
        return match column.data_kind {
            DataKind::Text => Ok(value.clone()),
            _ => Err(ExplorerError::Coercion {
                column: column.column_name.clone(),
                reason: "a value is required".to_string(),
            }),
        };
    }

    let parsed = match column.data_kind {
        DataKind::Text => return Ok(value.clone()),
        DataKind::Json => serde_json::from_str::<Value>(raw).map_err(|e| format!("invalid JSON: {}", e)),
        DataKind::Boolean => parse_bool(raw),
        DataKind::Integer => raw
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| format!("{:?} is not a whole number", raw)),
        DataKind::Numeric => parse_number(raw),
        DataKind::Timestamp => parse_timestamp(raw)
            .map(Value::String)
            .ok_or_else(|| format!("{:?} is not a date/time", raw)),
    };

    match parsed {
        Ok(v) => Ok(v),
        Err(reason) => match policy {
            CoercionPolicy::Strict => Err(ExplorerError::Coercion {
                column: column.column_name.clone(),
                reason,
            }),
            CoercionPolicy::Lenient => {
                tracing::warn!(column = %column.column_name, %reason, "submitting raw value");
                warnings.push(CoercionWarning {
                    column: column.column_name.clone(),
                    message: reason,
                });
                Ok(value.clone())
            }
        },
    }
}

fn parse_bool(raw: &str) -> Result<Value, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(Value::Bool(true)),
        "false" => Ok(Value::Bool(false)),
        other => Err(format!("{:?} is not true or false", other)),
    }
}

fn parse_number(raw: &str) -> Result<Value, String> {
    let raw = raw.trim();
    if let Ok(i) = raw.parse::<i64>() {
        return Ok(Value::from(i));
    }
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| format!("{:?} is not a number", raw))
}

/// Accepts RFC 3339, `YYYY-MM-DDTHH:MM[:SS[.f]]` and plain dates.
pub fn parse_timestamp(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.to_rfc3339());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.format("%Y-%m-%dT%H:%M:%S").to_string());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .map(|d| d.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> TableSchema {
        TableSchema {
            table_name: "posts".into(),
            columns: vec![
                ColumnDescriptor::new("posts", "id", DataKind::Integer, false),
                ColumnDescriptor::new("posts", "title", DataKind::Text, false),
                ColumnDescriptor::new("posts", "subtitle", DataKind::Text, true),
                ColumnDescriptor::new("posts", "featured", DataKind::Boolean, true),
                ColumnDescriptor::new("posts", "views", DataKind::Integer, true),
                ColumnDescriptor::new("posts", "rank", DataKind::Integer, false),
                ColumnDescriptor::new("posts", "price", DataKind::Numeric, true),
                ColumnDescriptor::new("posts", "meta", DataKind::Json, true),
                ColumnDescriptor::new("posts", "published_at", DataKind::Timestamp, true),
            ],
        }
    }

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn empty_strings_become_null_when_nullable() {
        let edited = record(json!({"subtitle": "", "featured": "", "views": "", "price": " ", "published_at": ""}));
        let out = coerce_record(&schema(), &edited, CoercionPolicy::Lenient).unwrap();
        assert!(out.record.values().all(Value::is_null));
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn whitespace_in_text_columns_is_kept() {
        let out = coerce_record(&schema(), &record(json!({"subtitle": "   "})), CoercionPolicy::Strict).unwrap();
        assert_eq!(out.record["subtitle"], json!("   "));
    }

    #[test]
    fn empty_required_text_stays_empty() {
        let out = coerce_record(&schema(), &record(json!({"title": ""})), CoercionPolicy::Strict).unwrap();
        assert_eq!(out.record["title"], json!(""));
    }

    #[test]
    fn empty_required_number_is_rejected_not_zeroed() {
        let err = coerce_record(&schema(), &record(json!({"rank": ""})), CoercionPolicy::Lenient).unwrap_err();
        assert_eq!(
            err,
            ExplorerError::Coercion {
                column: "rank".into(),
                reason: "a value is required".into()
            }
        );
    }

    #[test]
    fn typed_strings_are_parsed() {
        let edited = record(json!({
            "featured": "false",
            "views": "42",
            "price": "19.95",
            "meta": "{\"tags\": [\"tile\"]}",
            "published_at": "2024-03-05T14:07"
        }));
        let out = coerce_record(&schema(), &edited, CoercionPolicy::Strict).unwrap();
        assert_eq!(
            Value::Object(out.record),
            json!({
                "featured": false,
                "views": 42,
                "price": 19.95,
                "meta": {"tags": ["tile"]},
                "published_at": "2024-03-05T14:07:00"
            })
        );
    }

    #[test]
    fn invalid_json_is_kept_under_lenient_policy() {
        let edited = record(json!({"meta": "{oops"}));
        let out = coerce_record(&schema(), &edited, CoercionPolicy::Lenient).unwrap();
        assert_eq!(out.record["meta"], json!("{oops"));
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.warnings[0].column, "meta");
    }

    #[test]
    fn invalid_json_fails_under_strict_policy() {
        let err = coerce_record(&schema(), &record(json!({"meta": "{oops"})), CoercionPolicy::Strict).unwrap_err();
        assert!(matches!(err, ExplorerError::Coercion { ref column, .. } if column == "meta"));
    }

    #[test]
    fn already_typed_values_pass_through_and_unknown_keys_drop() {
        let edited = record(json!({"views": 5, "meta": {"a": 1}, "legacy": "x"}));
        let out = coerce_record(&schema(), &edited, CoercionPolicy::Strict).unwrap();
        assert_eq!(Value::Object(out.record), json!({"views": 5, "meta": {"a": 1}}));
    }

    #[test]
    fn timestamps_normalise() {
        assert_eq!(
            parse_timestamp("2024-03-05T14:07:33+02:00").as_deref(),
            Some("2024-03-05T14:07:33+02:00")
        );
        assert_eq!(parse_timestamp("2024-03-05 14:07").as_deref(), Some("2024-03-05T14:07:00"));
        assert_eq!(parse_timestamp("2024-03-05").as_deref(), Some("2024-03-05"));
        assert_eq!(parse_timestamp("next tuesday"), None);
    }
}
