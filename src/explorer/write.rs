use serde::Serialize;
use serde_json::Value;

use crate::config::CoercionPolicy;
use crate::db::RecordStore;
use crate::error::{ExplorerError, ExplorerResult};
use crate::explorer::coerce::{coerce_record, CoercionWarning};
use crate::models::{Record, TableSchema, PRIMARY_KEY};

#[derive(Debug, Clone, Copy)]
pub enum SaveMode<'a> {
    Create,
    /// `original` is the record as loaded, before any edits.
    Update { original: &'a Record },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveOutcome {
    /// The row as returned by the store.
    pub record: Record,
    pub warnings: Vec<CoercionWarning>,
}

/// Builds the insert payload: coerced values without the primary key, and
/// without null fields the database fills from its own default.
pub fn insert_payload(schema: &TableSchema, mut coerced: Record) -> Record {
    coerced.retain(|key, value| match schema.column(key) {
        Some(column) if column.is_primary_key => false,
        Some(column) => !(value.is_null() && column.default_value_expression.is_some()),
        None => false,
    });
    coerced
}

pub async fn save_record(
    store: &dyn RecordStore,
    schema: &TableSchema,
    mode: SaveMode<'_>,
    edited: &Record,
    policy: CoercionPolicy,
) -> ExplorerResult<SaveOutcome> {
    let table = schema.table_name.as_str();
    let coerced = coerce_record(schema, edited, policy)?;

    let record = match mode {
        SaveMode::Create => {
            let payload = insert_payload(schema, coerced.record);
            store
                .insert(table, payload)
                .await
                .map_err(|e| ExplorerError::write(table, e))?
        }
        SaveMode::Update { original } => {
            let key = original
                .get(PRIMARY_KEY)
                .filter(|k| !k.is_null())
                .ok_or_else(|| ExplorerError::Write {
                    table: table.to_string(),
                    reason: "record has no id".to_string(),
                })?;
            let mut payload = coerced.record;
            payload.shift_remove(PRIMARY_KEY);
            store
                .update(table, key, payload)
                .await
                .map_err(|e| ExplorerError::write(table, e))?
        }
    };

    tracing::info!(
        table,
        id = ?record.get(PRIMARY_KEY),
        warnings = coerced.warnings.len(),
        "record saved"
    );
    Ok(SaveOutcome {
        record,
        warnings: coerced.warnings,
    })
}

/// Deletes by primary key. Nothing reaches the store unless `confirmed` is set.
pub async fn delete_record(
    store: &dyn RecordStore,
    table: &str,
    key: &Value,
    confirmed: bool,
) -> ExplorerResult<()> {
    if !confirmed {
        return Err(ExplorerError::ConfirmationRequired);
    }
    store
        .delete(table, key)
        .await
        .map_err(|e| ExplorerError::write(table, e))?;
    tracing::info!(table, id = %key, "record deleted");
    Ok(())
}
