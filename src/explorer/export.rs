use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::db::RecordStore;
use crate::error::{ExplorerError, ExplorerResult};

/// A downloadable JSON snapshot of a whole table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableExport {
    pub table: String,
    pub file_name: String,
    pub row_count: usize,
    pub json: String,
}

pub fn export_file_name(table: &str, date: NaiveDate) -> String {
    format!("{}-export-{}.json", table, date.format("%Y-%m-%d"))
}

pub async fn export_table(store: &dyn RecordStore, table: &str) -> ExplorerResult<TableExport> {
    let rows = store.export_all(table).await.map_err(|e| ExplorerError::Query {
        table: table.to_string(),
        reason: e.to_string(),
    })?;
    let json = serde_json::to_string_pretty(&rows).map_err(|e| ExplorerError::Io(e.to_string()))?;
    tracing::info!(table, rows = rows.len(), "table exported");
    Ok(TableExport {
        table: table.to_string(),
        file_name: export_file_name(table, Utc::now().date_naive()),
        row_count: rows.len(),
        json,
    })
}

pub fn write_export(export: &TableExport, dir: &Path) -> ExplorerResult<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(&export.file_name);
    fs::write(&path, &export.json)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::InMemoryStore;
    use serde_json::{json, Value};

    #[test]
    fn file_name_carries_table_and_date() {
        let date = NaiveDate::from_ymd_opt(2024, 7, 9).unwrap();
        assert_eq!(export_file_name("bookings", date), "bookings-export-2024-07-09.json");
    }

    #[tokio::test]
    async fn export_writes_every_row() {
        let rows = (1..=3)
            .map(|i| json!({"id": i, "name": format!("Client {i}")}).as_object().cloned().unwrap())
            .collect();
        let store = InMemoryStore::new().with_untyped_table("clients", rows);
        let export = export_table(&store, "clients").await.unwrap();
        assert_eq!(export.row_count, 3);
        assert!(export.file_name.starts_with("clients-export-"));

        let dir = tempfile::tempdir().unwrap();
        let path = write_export(&export, dir.path()).unwrap();
        let written: Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(written.as_array().unwrap().len(), 3);
        assert_eq!(written[2]["name"], json!("Client 3"));
    }

    #[tokio::test]
    async fn unknown_table_fails() {
        let store = InMemoryStore::new();
        assert!(export_table(&store, "nope").await.is_err());
    }
}
