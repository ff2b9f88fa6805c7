//! Table and column discovery.
//!
//! Both lookups are ordered lists of sources tried in turn; the first source
//! that answers wins. Each failed source is logged before moving on.

use serde_json::Value;

use crate::config::ExplorerConfig;
use crate::db::RecordStore;
use crate::error::{ExplorerError, ExplorerResult, StoreError};
use crate::models::{ColumnDescriptor, DataKind, RecordQuery, TableDescriptor, TableSchema, PRIMARY_KEY};

#[derive(Debug, Clone, PartialEq)]
pub enum TableSource {
    Introspection,
    TableNames { schema: String },
    /// Known tables of this deployment, used in degraded mode.
    Fixed { schema: String, tables: Vec<String> },
}

impl TableSource {
    pub fn name(&self) -> &'static str {
        match self {
            TableSource::Introspection => "introspection",
            TableSource::TableNames { .. } => "table_names",
            TableSource::Fixed { .. } => "fixed",
        }
    }

    pub async fn attempt(&self, store: &dyn RecordStore) -> Result<Vec<TableDescriptor>, StoreError> {
        match self {
            TableSource::Introspection => store.introspect_tables().await,
            TableSource::TableNames { schema } => Ok(store
                .list_table_names()
                .await?
                .into_iter()
                .map(|name| TableDescriptor::new(schema.as_str(), name))
                .collect()),
            TableSource::Fixed { schema, tables } => {
                if tables.is_empty() {
                    return Err(StoreError::TableNotFound("no fallback tables configured".to_string()));
                }
                Ok(tables
                    .iter()
                    .map(|name| TableDescriptor::new(schema.as_str(), name.as_str()))
                    .collect())
            }
        }
    }
}

pub fn table_sources(config: &ExplorerConfig) -> Vec<TableSource> {
    vec![
        TableSource::Introspection,
        TableSource::TableNames {
            schema: config.schema.clone(),
        },
        TableSource::Fixed {
            schema: config.schema.clone(),
            tables: config.fallback_tables.clone(),
        },
    ]
}

pub async fn list_tables(
    store: &dyn RecordStore,
    sources: &[TableSource],
) -> ExplorerResult<Vec<TableDescriptor>> {
    let mut last_error = StoreError::TableNotFound("no table sources".to_string());
    for source in sources {
        match source.attempt(store).await {
            Ok(tables) => {
                tracing::debug!(source = source.name(), count = tables.len(), "tables listed");
                return Ok(tables);
            }
            Err(e) => {
                tracing::warn!(source = source.name(), error = %e, "table listing failed, trying next source");
                last_error = e;
            }
        }
    }
    Err(ExplorerError::Discovery {
        table: "*".to_string(),
        reason: last_error.to_string(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnSource {
    Introspection,
    /// Infer from one sampled row; nullability is unknown and assumed true.
    SampleRow,
}

impl ColumnSource {
    pub fn name(self) -> &'static str {
        match self {
            ColumnSource::Introspection => "introspection",
            ColumnSource::SampleRow => "sample_row",
        }
    }

    pub async fn attempt(self, store: &dyn RecordStore, table: &str) -> Result<Vec<ColumnDescriptor>, StoreError> {
        match self {
            ColumnSource::Introspection => store.introspect_columns(table).await,
            ColumnSource::SampleRow => {
                let sample = store
                    .query(
                        table,
                        &RecordQuery {
                            filter: None,
                            order_by: None,
                            range_start: 0,
                            range_end: 0,
                        },
                    )
                    .await?;
                Ok(match sample.records.first() {
                    Some(row) => infer_columns(table, row.iter()),
                    None => vec![ColumnDescriptor::new(table, PRIMARY_KEY, DataKind::Integer, false)],
                })
            }
        }
    }
}

pub const COLUMN_SOURCES: &[ColumnSource] = &[ColumnSource::Introspection, ColumnSource::SampleRow];

fn infer_columns<'a>(table: &str, row: impl Iterator<Item = (&'a String, &'a Value)>) -> Vec<ColumnDescriptor> {
    row.map(|(name, value)| ColumnDescriptor::new(table, name, DataKind::infer_from_value(value), true))
        .collect()
}

pub async fn describe_columns(
    store: &dyn RecordStore,
    table: &str,
    sources: &[ColumnSource],
) -> ExplorerResult<TableSchema> {
    let mut last_error = StoreError::TableNotFound(table.to_string());
    for source in sources {
        match source.attempt(store, table).await {
            Ok(columns) => {
                tracing::debug!(table, source = source.name(), count = columns.len(), "columns described");
                return Ok(TableSchema {
                    table_name: table.to_string(),
                    columns,
                });
            }
            Err(e) => {
                tracing::warn!(table, source = source.name(), error = %e, "column lookup failed, trying next source");
                last_error = e;
            }
        }
    }
    Err(ExplorerError::Discovery {
        table: table.to_string(),
        reason: last_error.to_string(),
    })
}
