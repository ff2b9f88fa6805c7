use thiserror::Error;

/// Failure reported by a [`crate::db::RecordStore`] implementation.
///
/// The message text is carried verbatim from the backend so it can be shown to
/// the operator unmodified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Not connected")]
    NotConnected,

    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// Constraint, permission or other rejection of a write.
    #[error("{0}")]
    Rejected(String),

    #[error("{0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::Database(db) => StoreError::Rejected(db.message().to_string()),
            other => StoreError::Database(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        StoreError::Serialization(error.to_string())
    }
}

/// Errors surfaced by the explorer operations (discovery, query, save, delete).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExplorerError {
    #[error("Could not load schema for {table}: {reason}")]
    Discovery { table: String, reason: String },

    #[error("Could not load records from {table}: {reason}")]
    Query { table: String, reason: String },

    #[error("Invalid value for {column}: {reason}")]
    Coercion { column: String, reason: String },

    /// `reason` is the store's message, unmodified.
    #[error("{reason}")]
    Write { table: String, reason: String },

    #[error("Delete requires explicit confirmation")]
    ConfirmationRequired,

    #[error("No table selected")]
    NoTableSelected,

    #[error("No record is being edited")]
    NoDraft,

    #[error("{0}")]
    Io(String),
}

impl ExplorerError {
    pub(crate) fn write(table: &str, error: StoreError) -> Self {
        ExplorerError::Write {
            table: table.to_string(),
            reason: error.to_string(),
        }
    }
}

impl From<std::io::Error> for ExplorerError {
    fn from(error: std::io::Error) -> Self {
        ExplorerError::Io(error.to_string())
    }
}

pub type ExplorerResult<T> = Result<T, ExplorerError>;
