//! In-memory [`RecordStore`] used by tests and offline demos.
//!
//! Tables may be registered with or without column metadata. Individual
//! operations can be made to fail, and every data call is recorded so callers
//! can assert on what reached the store.

use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use crate::db::RecordStore;
use crate::error::StoreError;
use crate::models::{ColumnDescriptor, QueryPage, Record, RecordQuery, TableDescriptor, PRIMARY_KEY};

/// Operations that can be forced to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    IntrospectTables,
    ListTableNames,
    IntrospectColumns,
    /// Any query carrying an `order_by`.
    Ordering,
    Query,
    Write,
}

/// A data call as received by the store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    Query { table: String, query: RecordQuery },
    Insert { table: String, record: Record },
    Update { table: String, key: Value, record: Record },
    Delete { table: String, key: Value },
    ExportAll { table: String },
}

#[derive(Default)]
struct MemTable {
    columns: Option<Vec<ColumnDescriptor>>,
    rows: Vec<Record>,
    next_id: i64,
}

#[derive(Default)]
struct Inner {
    tables: BTreeMap<String, MemTable>,
    failures: HashSet<FailPoint>,
    calls: Vec<StoreCall>,
}

#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a table with column metadata.
    pub fn with_table(self, name: &str, columns: Vec<ColumnDescriptor>, rows: Vec<Record>) -> Self {
        self.insert_table(name, Some(columns), rows);
        self
    }

    /// Registers a table whose columns can only be learned by sampling rows.
    pub fn with_untyped_table(self, name: &str, rows: Vec<Record>) -> Self {
        self.insert_table(name, None, rows);
        self
    }

    pub fn failing(self, point: FailPoint) -> Self {
        self.set_failure(point, true);
        self
    }

    pub fn set_failure(&self, point: FailPoint, failing: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            if failing {
                inner.failures.insert(point);
            } else {
                inner.failures.remove(&point);
            }
        }
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.inner.lock().map(|i| i.calls.clone()).unwrap_or_default()
    }

    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.inner
            .lock()
            .ok()
            .and_then(|i| i.tables.get(table).map(|t| t.rows.clone()))
            .unwrap_or_default()
    }

    fn insert_table(&self, name: &str, columns: Option<Vec<ColumnDescriptor>>, rows: Vec<Record>) {
        let next_id = rows
            .iter()
            .filter_map(|r| r.get(PRIMARY_KEY).and_then(Value::as_i64))
            .max()
            .unwrap_or(0)
            + 1;
        if let Ok(mut inner) = self.inner.lock() {
            inner.tables.insert(
                name.to_string(),
                MemTable {
                    columns,
                    rows,
                    next_id,
                },
            );
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Database("store lock poisoned".to_string()))
    }
}

impl Inner {
    fn check(&self, point: FailPoint) -> Result<(), StoreError> {
        if self.failures.contains(&point) {
            return Err(match point {
                FailPoint::IntrospectTables | FailPoint::IntrospectColumns => {
                    StoreError::Rejected("permission denied for schema pg_catalog".to_string())
                }
                FailPoint::Ordering => {
                    StoreError::Database("column \"id\" does not exist".to_string())
                }
                FailPoint::Write => {
                    StoreError::Rejected("new row violates row-level security policy".to_string())
                }
                FailPoint::ListTableNames | FailPoint::Query => {
                    StoreError::Database("connection reset by peer".to_string())
                }
            });
        }
        Ok(())
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut MemTable, StoreError> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| StoreError::TableNotFound(name.to_string()))
    }
}

impl MemTable {
    fn has_column(&self, name: &str) -> bool {
        match &self.columns {
            Some(columns) => columns.iter().any(|c| c.column_name == name),
            None => self.rows.first().map_or(true, |r| r.contains_key(name)),
        }
    }

    fn position(&self, key: &Value) -> Option<usize> {
        self.rows.iter().position(|r| r.get(PRIMARY_KEY) == Some(key))
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Null) | None, Some(Value::Null) | None) => Ordering::Equal,
        (Some(Value::Null) | None, _) => Ordering::Less,
        (_, Some(Value::Null) | None) => Ordering::Greater,
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn introspect_tables(&self) -> Result<Vec<TableDescriptor>, StoreError> {
        let inner = self.lock()?;
        inner.check(FailPoint::IntrospectTables)?;
        Ok(inner
            .tables
            .keys()
            .map(|name| TableDescriptor::new("public", name.as_str()))
            .collect())
    }

    async fn list_table_names(&self) -> Result<Vec<String>, StoreError> {
        let inner = self.lock()?;
        inner.check(FailPoint::ListTableNames)?;
        Ok(inner.tables.keys().cloned().collect())
    }

    async fn introspect_columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>, StoreError> {
        let mut inner = self.lock()?;
        inner.check(FailPoint::IntrospectColumns)?;
        inner.table_mut(table)?.columns.clone().ok_or_else(|| {
            StoreError::Rejected(format!("permission denied for column metadata of {}", table))
        })
    }

    async fn query(&self, table: &str, query: &RecordQuery) -> Result<QueryPage, StoreError> {
        let mut inner = self.lock()?;
        inner.calls.push(StoreCall::Query {
            table: table.to_string(),
            query: query.clone(),
        });
        inner.check(FailPoint::Query)?;
        if query.order_by.is_some() {
            inner.check(FailPoint::Ordering)?;
        }
        let mem = inner.table_mut(table)?;
        if let Some(order) = &query.order_by {
            if !mem.has_column(&order.column) {
                return Err(StoreError::Database(format!(
                    "column \"{}\" does not exist",
                    order.column
                )));
            }
        }

        let mut matching: Vec<Record> = mem
            .rows
            .iter()
            .filter(|r| query.filter.as_ref().map_or(true, |f| f.matches(r)))
            .cloned()
            .collect();
        if let Some(order) = &query.order_by {
            matching.sort_by(|a, b| {
                let ord = compare_values(a.get(&order.column), b.get(&order.column));
                if order.descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }

        let total_count = matching.len() as u64;
        let records = matching
            .into_iter()
            .skip(usize::try_from(query.range_start).unwrap_or(usize::MAX))
            .take(usize::try_from(query.limit()).unwrap_or(usize::MAX))
            .collect();
        Ok(QueryPage {
            records,
            total_count,
        })
    }

    async fn insert(&self, table: &str, record: Record) -> Result<Record, StoreError> {
        let mut inner = self.lock()?;
        inner.calls.push(StoreCall::Insert {
            table: table.to_string(),
            record: record.clone(),
        });
        inner.check(FailPoint::Write)?;
        let mem = inner.table_mut(table)?;

        let mut row = Record::new();
        row.insert(PRIMARY_KEY.to_string(), Value::from(mem.next_id));
        mem.next_id += 1;
        if let Some(columns) = &mem.columns {
            for column in columns.iter().filter(|c| !c.is_primary_key) {
                if !column.nullable && !record.contains_key(&column.column_name) {
                    return Err(StoreError::Rejected(format!(
                        "null value in column \"{}\" violates not-null constraint",
                        column.column_name
                    )));
                }
                row.insert(column.column_name.clone(), Value::Null);
            }
        }
        for (key, value) in record {
            if key != PRIMARY_KEY {
                row.insert(key, value);
            }
        }
        mem.rows.push(row.clone());
        Ok(row)
    }

    async fn update(&self, table: &str, key: &Value, record: Record) -> Result<Record, StoreError> {
        let mut inner = self.lock()?;
        inner.calls.push(StoreCall::Update {
            table: table.to_string(),
            key: key.clone(),
            record: record.clone(),
        });
        inner.check(FailPoint::Write)?;
        let mem = inner.table_mut(table)?;
        let index = mem
            .position(key)
            .ok_or_else(|| StoreError::Rejected(format!("No row with id {} in {}", key, table)))?;
        let row = &mut mem.rows[index];
        for (column, value) in record {
            row.insert(column, value);
        }
        Ok(row.clone())
    }

    async fn delete(&self, table: &str, key: &Value) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.calls.push(StoreCall::Delete {
            table: table.to_string(),
            key: key.clone(),
        });
        inner.check(FailPoint::Write)?;
        let mem = inner.table_mut(table)?;
        let index = mem
            .position(key)
            .ok_or_else(|| StoreError::Rejected(format!("No row with id {} in {}", key, table)))?;
        mem.rows.remove(index);
        Ok(())
    }

    async fn export_all(&self, table: &str) -> Result<Vec<Record>, StoreError> {
        let mut inner = self.lock()?;
        inner.calls.push(StoreCall::ExportAll {
            table: table.to_string(),
        });
        inner.check(FailPoint::Query)?;
        Ok(inner.table_mut(table)?.rows.clone())
    }
}
