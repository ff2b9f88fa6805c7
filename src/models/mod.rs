use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A row as an ordered column-name to value mapping.
pub type Record = serde_json::Map<String, Value>;

/// Primary key column name assumed for every table.
pub const PRIMARY_KEY: &str = "id";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub dbname: String,
}

impl DbConfig {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user,
            self.password.as_deref().unwrap_or(""),
            self.host,
            self.port,
            self.dbname
        )
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SavedConnection {
    pub id: String,
    pub name: String,
    pub config: DbConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
pub struct TableDescriptor {
    pub schema_name: String,
    pub table_name: String,
}

impl TableDescriptor {
    pub fn new(schema_name: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            schema_name: schema_name.into(),
            table_name: table_name.into(),
        }
    }
}

/// Semantic kind of a column, driving both editor selection and write-back coercion.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    Text,
    Integer,
    Numeric,
    Boolean,
    Timestamp,
    Json,
}

impl DataKind {
    /// Maps a Postgres type name (as printed by `format_type` or `udt_name`) to a kind.
    pub fn from_pg_type(type_name: &str) -> Self {
        let lower = type_name.trim().to_ascii_lowercase();
        // Arrays are edited as JSON text.
        if lower.ends_with("[]") || lower.starts_with('_') {
            return DataKind::Json;
        }
        let base = lower.split('(').next().unwrap_or("").trim();
        match base {
            "bool" | "boolean" => DataKind::Boolean,
            "int2" | "int4" | "int8" | "smallint" | "integer" | "bigint" | "serial"
            | "bigserial" | "smallserial" => DataKind::Integer,
            "numeric" | "decimal" | "real" | "double precision" | "float4" | "float8"
            | "money" => DataKind::Numeric,
            "json" | "jsonb" => DataKind::Json,
            "date" | "timestamptz" => DataKind::Timestamp,
            b if b.starts_with("timestamp") || b.starts_with("time") => DataKind::Timestamp,
            _ => DataKind::Text,
        }
    }

    /// Fallback inference from a sampled value when no column metadata is available.
    ///
    /// Numbers become `Integer` (or `Numeric` when fractional), booleans `Boolean`,
    /// objects and arrays `Json`, everything else `Text`.
    pub fn infer_from_value(value: &Value) -> Self {
        match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => DataKind::Integer,
            Value::Number(_) => DataKind::Numeric,
            Value::Bool(_) => DataKind::Boolean,
            Value::Object(_) | Value::Array(_) => DataKind::Json,
            _ => DataKind::Text,
        }
    }

}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ColumnDescriptor {
    pub table_name: String,
    pub column_name: String,
    pub data_kind: DataKind,
    pub nullable: bool,
    pub default_value_expression: Option<String>,
    pub is_primary_key: bool,
}

impl ColumnDescriptor {
    pub fn new(table_name: &str, column_name: &str, data_kind: DataKind, nullable: bool) -> Self {
        Self {
            table_name: table_name.to_string(),
            column_name: column_name.to_string(),
            data_kind,
            nullable,
            default_value_expression: None,
            is_primary_key: column_name == PRIMARY_KEY,
        }
    }

    pub fn with_default(mut self, expression: impl Into<String>) -> Self {
        self.default_value_expression = Some(expression.into());
        self
    }
}

/// Column metadata for one table, in display order.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TableSchema {
    pub table_name: String,
    pub columns: Vec<ColumnDescriptor>,
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.column_name == name)
    }

    pub fn text_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.data_kind == DataKind::Text)
            .map(|c| c.column_name.clone())
            .collect()
    }

    pub fn has_primary_key(&self) -> bool {
        self.columns.iter().any(|c| c.is_primary_key)
    }

    /// Keys of `record` that have a descriptor and may be edited. Unknown keys and
    /// the primary key are left out.
    pub fn editable_fields<'a>(&'a self, record: &'a Record) -> Vec<&'a ColumnDescriptor> {
        record
            .keys()
            .filter_map(|key| self.column(key))
            .filter(|c| !c.is_primary_key)
            .collect()
    }
}

/// Which slice of the table is requested. `page_index` is 1-based.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PageWindow {
    pub page_index: u64,
    pub page_size: u64,
    pub total_count: u64,
    pub search_term: String,
}

impl PageWindow {
    pub fn new(page_size: u64) -> Self {
        Self {
            page_index: 1,
            page_size: page_size.max(1),
            total_count: 0,
            search_term: String::new(),
        }
    }

    /// Inclusive row range `[(n-1)*p, n*p - 1]`, saturating at `u64::MAX`.
    pub fn row_range(&self) -> (u64, u64) {
        let start = self.page_index.saturating_sub(1).saturating_mul(self.page_size);
        (start, start.saturating_add(self.page_size - 1))
    }

    pub fn page_count(&self) -> u64 {
        self.total_count.div_ceil(self.page_size).max(1)
    }

    pub fn has_next(&self) -> bool {
        self.page_index < self.page_count()
    }

    pub fn has_previous(&self) -> bool {
        self.page_index > 1
    }

    pub fn go_to(&mut self, page_index: u64) {
        self.page_index = page_index.max(1);
    }

    pub fn set_page_size(&mut self, page_size: u64) {
        self.page_size = page_size.max(1);
        self.page_index = 1;
    }

    pub fn set_search_term(&mut self, term: impl Into<String>) {
        self.search_term = term.into();
        self.page_index = 1;
    }
}

/// Case-insensitive substring match on any of `columns`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RecordFilter {
    pub columns: Vec<String>,
    pub term: String,
}

impl RecordFilter {
    pub fn matches(&self, record: &Record) -> bool {
        let needle = self.term.to_lowercase();
        self.columns.iter().any(|column| match record.get(column) {
            Some(Value::String(s)) => s.to_lowercase().contains(&needle),
            _ => false,
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub descending: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RecordQuery {
    pub filter: Option<RecordFilter>,
    pub order_by: Option<OrderBy>,
    pub range_start: u64,
    /// Inclusive.
    pub range_end: u64,
}

impl RecordQuery {
    pub fn limit(&self) -> u64 {
        self.range_end.saturating_sub(self.range_start).saturating_add(1)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct QueryPage {
    pub records: Vec<Record>,
    pub total_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pg_types_map_to_kinds() {
        assert_eq!(DataKind::from_pg_type("boolean"), DataKind::Boolean);
        assert_eq!(DataKind::from_pg_type("bigint"), DataKind::Integer);
        assert_eq!(DataKind::from_pg_type("numeric(10,2)"), DataKind::Numeric);
        assert_eq!(DataKind::from_pg_type("double precision"), DataKind::Numeric);
        assert_eq!(
            DataKind::from_pg_type("timestamp with time zone"),
            DataKind::Timestamp
        );
        assert_eq!(DataKind::from_pg_type("date"), DataKind::Timestamp);
        assert_eq!(DataKind::from_pg_type("jsonb"), DataKind::Json);
        assert_eq!(DataKind::from_pg_type("text[]"), DataKind::Json);
        assert_eq!(DataKind::from_pg_type("character varying(255)"), DataKind::Text);
        assert_eq!(DataKind::from_pg_type("uuid"), DataKind::Text);
    }

    #[test]
    fn sampled_values_infer_kinds() {
        assert_eq!(DataKind::infer_from_value(&json!(3)), DataKind::Integer);
        assert_eq!(DataKind::infer_from_value(&json!(3.5)), DataKind::Numeric);
        assert_eq!(DataKind::infer_from_value(&json!(true)), DataKind::Boolean);
        assert_eq!(DataKind::infer_from_value(&json!({"a": 1})), DataKind::Json);
        assert_eq!(DataKind::infer_from_value(&json!("x")), DataKind::Text);
        assert_eq!(DataKind::infer_from_value(&Value::Null), DataKind::Text);
    }

    #[test]
    fn page_window_row_range() {
        let mut page = PageWindow::new(10);
        assert_eq!(page.row_range(), (0, 9));
        page.go_to(3);
        assert_eq!(page.row_range(), (20, 29));
        page.set_page_size(25);
        assert_eq!(page.page_index, 1);
        assert_eq!(page.row_range(), (0, 24));
    }

    #[test]
    fn huge_page_index_saturates_instead_of_overflowing() {
        let mut page = PageWindow::new(10);
        page.go_to(u64::MAX);
        assert_eq!(page.row_range(), (u64::MAX, u64::MAX));
        let query = RecordQuery {
            filter: None,
            order_by: None,
            range_start: u64::MAX,
            range_end: u64::MAX,
        };
        assert_eq!(query.limit(), 1);
    }

    #[test]
    fn page_window_navigation_bounds() {
        let mut page = PageWindow::new(10);
        page.total_count = 21;
        assert_eq!(page.page_count(), 3);
        assert!(page.has_next());
        assert!(!page.has_previous());
        page.go_to(3);
        assert!(!page.has_next());
        page.set_search_term("tile");
        assert_eq!(page.page_index, 1);
    }

    #[test]
    fn editable_fields_skip_unknown_and_primary_key() {
        let schema = TableSchema {
            table_name: "jobs".into(),
            columns: vec![
                ColumnDescriptor::new("jobs", "id", DataKind::Integer, false),
                ColumnDescriptor::new("jobs", "title", DataKind::Text, true),
            ],
        };
        let record = json!({"id": 1, "title": "Tiler", "legacy": "x"});
        let record = record.as_object().unwrap();
        let names: Vec<_> = schema
            .editable_fields(record)
            .iter()
            .map(|c| c.column_name.as_str())
            .collect();
        assert_eq!(names, vec!["title"]);
    }

    #[test]
    fn filter_matches_only_listed_string_columns() {
        let filter = RecordFilter {
            columns: vec!["name".into()],
            term: "TILE".into(),
        };
        let hit = json!({"name": "Floor tiles", "price": 10});
        let miss = json!({"name": "Paint", "price": "tile"});
        assert!(filter.matches(hit.as_object().unwrap()));
        assert!(!filter.matches(miss.as_object().unwrap()));
    }
}
