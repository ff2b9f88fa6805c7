use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;
use crate::models::{ColumnDescriptor, QueryPage, Record, RecordQuery, TableDescriptor};

pub mod memory;
pub mod postgres;

/// Generic record-store client every explorer operation goes through.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Privileged catalog introspection.
    async fn introspect_tables(&self) -> Result<Vec<TableDescriptor>, StoreError>;
    /// Plain list of table names, used when introspection is unavailable.
    async fn list_table_names(&self) -> Result<Vec<String>, StoreError>;
    async fn introspect_columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>, StoreError>;
    /// Rows in `query`'s range plus the exact count for the same filter.
    async fn query(&self, table: &str, query: &RecordQuery) -> Result<QueryPage, StoreError>;
    async fn insert(&self, table: &str, record: Record) -> Result<Record, StoreError>;
    async fn update(&self, table: &str, key: &Value, record: Record) -> Result<Record, StoreError>;
    async fn delete(&self, table: &str, key: &Value) -> Result<(), StoreError>;
    async fn export_all(&self, table: &str) -> Result<Vec<Record>, StoreError>;
}
