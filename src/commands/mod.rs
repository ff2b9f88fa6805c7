//! Operation boundary for the admin UI. Every failure is turned into the
//! message shown to the operator; nothing here panics or retries.

use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::postgres::PostgresDriver;
use crate::db::RecordStore;
use crate::explorer::{self, EditorSpec, FieldRenderer, SaveMode, SaveOutcome, TableExport};
use crate::models::{
    ColumnDescriptor, DbConfig, PageWindow, QueryPage, Record, SavedConnection, TableDescriptor,
    TableSchema,
};
use crate::state::AppState;
use crate::storage::{self, Session};

pub async fn connect_db(state: &AppState, config: DbConfig) -> Result<String, String> {
    let mut driver = PostgresDriver::new(state.config.schema.clone());
    driver.connect(&config).await.map_err(|e| e.to_string())?;
    register_store(state, Arc::new(driver))
}

/// Registers an already-built store (e.g. an in-memory one) and returns its id.
pub fn register_store(state: &AppState, store: Arc<dyn RecordStore>) -> Result<String, String> {
    let connection_id = Uuid::new_v4().to_string();

    let mut registry = state.registry.connections.lock().map_err(|e| e.to_string())?;
    registry.insert(connection_id.clone(), store);

    Ok(connection_id)
}

pub fn disconnect_db(state: &AppState, connection_id: &str) -> Result<(), String> {
    let mut registry = state.registry.connections.lock().map_err(|e| e.to_string())?;
    registry.remove(connection_id);
    Ok(())
}

pub async fn list_tables(state: &AppState, connection_id: &str) -> Result<Vec<TableDescriptor>, String> {
    let store = state.registry.get(connection_id)?;
    let sources = explorer::table_sources(&state.config);
    explorer::list_tables(store.as_ref(), &sources)
        .await
        .map_err(|e| e.to_string())
}

pub async fn describe_columns(
    state: &AppState,
    connection_id: &str,
    table: &str,
) -> Result<TableSchema, String> {
    let store = state.registry.get(connection_id)?;
    explorer::describe_columns(store.as_ref(), table, explorer::COLUMN_SOURCES)
        .await
        .map_err(|e| e.to_string())
}

pub async fn query_records(
    state: &AppState,
    connection_id: &str,
    schema: &TableSchema,
    page: &PageWindow,
) -> Result<QueryPage, String> {
    let store = state.registry.get(connection_id)?;
    explorer::query_records(store.as_ref(), schema, page)
        .await
        .map_err(|e| e.to_string())
}

pub fn render_editor(state: &AppState, column: &ColumnDescriptor, value: &Value) -> EditorSpec {
    FieldRenderer::new(state.config.long_text_markers.clone()).render(column, value)
}

/// Inserts when `original` is `None`, otherwise updates the row `original` was loaded from.
pub async fn save_record(
    state: &AppState,
    connection_id: &str,
    schema: &TableSchema,
    original: Option<&Record>,
    edited: &Record,
) -> Result<SaveOutcome, String> {
    let store = state.registry.get(connection_id)?;
    let mode = match original {
        Some(original) => SaveMode::Update { original },
        None => SaveMode::Create,
    };
    explorer::save_record(store.as_ref(), schema, mode, edited, state.config.json_policy)
        .await
        .map_err(|e| e.to_string())
}

pub async fn delete_record(
    state: &AppState,
    connection_id: &str,
    table: &str,
    key: &Value,
    confirmed: bool,
) -> Result<(), String> {
    let store = state.registry.get(connection_id)?;
    explorer::delete_record(store.as_ref(), table, key, confirmed)
        .await
        .map_err(|e| e.to_string())
}

pub async fn export_table(state: &AppState, connection_id: &str, table: &str) -> Result<TableExport, String> {
    let store = state.registry.get(connection_id)?;
    explorer::export_table(store.as_ref(), table)
        .await
        .map_err(|e| e.to_string())
}

pub fn save_connection(data_dir: &Path, connection: SavedConnection) -> Result<(), String> {
    storage::add_connection(data_dir, connection)
}

pub fn load_connections(data_dir: &Path) -> Result<Vec<SavedConnection>, String> {
    storage::load_connections(data_dir)
}

pub fn delete_connection(data_dir: &Path, id: &str) -> Result<(), String> {
    storage::delete_connection(data_dir, id)
}

pub fn save_session(data_dir: &Path, session: &Session) -> Result<(), String> {
    storage::save_session(data_dir, session)
}

pub fn load_session(data_dir: &Path) -> Result<Session, String> {
    storage::load_session(data_dir)
}
