//! Schema-driven record explorer: discovery, paged query, typed editors and
//! write-back for arbitrary tables.

pub mod coerce;
pub mod discovery;
pub mod draft;
pub mod export;
pub mod query;
pub mod render;
pub mod session;
pub mod write;

pub use coerce::{coerce_record, CoercionWarning};
pub use discovery::{describe_columns, list_tables, table_sources, ColumnSource, TableSource, COLUMN_SOURCES};
pub use export::{export_table, write_export, TableExport};
pub use query::{build_query, query_records};
pub use render::{render_editor, Control, EditorSpec, FieldRenderer, NumberStep};
pub use session::{Draft, DraftMode, ExplorerSession, FetchTicket};
pub use write::{delete_record, save_record, SaveMode, SaveOutcome};
