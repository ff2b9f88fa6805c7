//! Column-kind to editor mapping.
//!
//! Rendering is a pure function of the column and its current value.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::Value;

use crate::models::{ColumnDescriptor, DataKind};

pub const JSON_EDITOR_ROWS: u32 = 6;
pub const LONG_TEXT_EDITOR_ROWS: u32 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberStep {
    Whole,
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Control {
    /// unset / true / false; unset submits an empty string.
    TriStateSelect { options: Vec<SelectOption> },
    TextArea { rows: u32 },
    DateTimeInput,
    NumberInput { step: NumberStep },
    TextInput,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditorSpec {
    pub column: String,
    pub control: Control,
    /// The current value as the control shows it.
    pub display: String,
    pub read_only: bool,
    pub required: bool,
}

pub fn tri_state_options() -> Vec<SelectOption> {
    [("", "(unset)"), ("true", "true"), ("false", "false")]
        .into_iter()
        .map(|(value, label)| SelectOption {
            value: value.to_string(),
            label: label.to_string(),
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct FieldRenderer {
    long_text_markers: Vec<String>,
}

impl Default for FieldRenderer {
    fn default() -> Self {
        Self::new(vec!["content".to_string()])
    }
}

impl FieldRenderer {
    pub fn new(long_text_markers: Vec<String>) -> Self {
        Self {
            long_text_markers: long_text_markers
                .into_iter()
                .map(|m| m.to_ascii_lowercase())
                .collect(),
        }
    }

    fn is_long_text(&self, column_name: &str) -> bool {
        let name = column_name.to_ascii_lowercase();
        self.long_text_markers.iter().any(|m| name.contains(m.as_str()))
    }

    pub fn render(&self, column: &ColumnDescriptor, value: &Value) -> EditorSpec {
        let (control, display) = match column.data_kind {
            DataKind::Boolean => (
                Control::TriStateSelect {
                    options: tri_state_options(),
                },
                boolean_display(value),
            ),
            DataKind::Json => (
                Control::TextArea {
                    rows: JSON_EDITOR_ROWS,
                },
                json_display(value),
            ),
            DataKind::Timestamp => (Control::DateTimeInput, timestamp_display(value)),
            DataKind::Integer => (
                Control::NumberInput {
                    step: NumberStep::Whole,
                },
                plain_display(value),
            ),
            DataKind::Numeric => (
                Control::NumberInput {
                    step: NumberStep::Any,
                },
                plain_display(value),
            ),
            DataKind::Text if self.is_long_text(&column.column_name) => (
                Control::TextArea {
                    rows: LONG_TEXT_EDITOR_ROWS,
                },
                plain_display(value),
            ),
            DataKind::Text => (Control::TextInput, plain_display(value)),
        };

        EditorSpec {
            column: column.column_name.clone(),
            control,
            display,
            read_only: column.is_primary_key,
            required: !column.nullable && !column.is_primary_key,
        }
    }
}

/// Renders with the default long-text heuristic (name contains "content").
pub fn render_editor(column: &ColumnDescriptor, value: &Value) -> EditorSpec {
    FieldRenderer::default().render(column, value)
}

fn plain_display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn boolean_display(value: &Value) -> String {
    match value {
        Value::Bool(true) => "true".to_string(),
        Value::Bool(false) => "false".to_string(),
        Value::String(s) if s == "true" || s == "false" => s.clone(),
        _ => String::new(),
    }
}

/// Strings that would re-parse as some other JSON value are shown quoted.
fn json_display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(raw) if serde_json::from_str::<Value>(raw).is_ok() => value.to_string(),
        Value::String(raw) => raw.clone(),
        structured => serde_json::to_string_pretty(structured).unwrap_or_else(|_| structured.to_string()),
    }
}

/// `YYYY-MM-DDTHH:MM`, the precision of a datetime-local input.
const INPUT_FORMAT: &str = "%Y-%m-%dT%H:%M";

fn timestamp_display(value: &Value) -> String {
    match value {
        Value::String(s) => format_for_input(s),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

pub(crate) fn format_for_input(raw: &str) -> String {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.format(INPUT_FORMAT).to_string();
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return dt.format(INPUT_FORMAT).to_string();
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return format!("{}T00:00", date);
    }
    // Unknown layout: cut to the input's width.
    let mut truncated: String = raw.chars().take(16).collect();
    if truncated.len() > 10 && truncated.as_bytes()[10] == b' ' {
        truncated.replace_range(10..11, "T");
    }
    truncated
}
