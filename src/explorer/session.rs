//! UI-side state of the explorer: the selected table, the current page of
//! records and the record being edited.
//!
//! Every fetch is tagged with a [`FetchTicket`]. Results are applied only if
//! the ticket is still the latest one for the same table and page, so a slow
//! response can never overwrite what the user navigated to since.

use serde_json::Value;
use std::sync::Arc;

use crate::config::ExplorerConfig;
use crate::db::RecordStore;
use crate::error::{ExplorerError, ExplorerResult};
use crate::explorer::discovery::{self, COLUMN_SOURCES};
use crate::explorer::draft::new_record;
use crate::explorer::export::{export_table, TableExport};
use crate::explorer::query::query_records;
use crate::explorer::render::{EditorSpec, FieldRenderer};
use crate::explorer::write::{delete_record, save_record, SaveMode, SaveOutcome};
use crate::models::{PageWindow, QueryPage, Record, TableDescriptor, TableSchema, PRIMARY_KEY};

#[derive(Debug, Clone, PartialEq)]
pub enum DraftMode {
    New,
    Existing { original: Record },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Draft {
    pub mode: DraftMode,
    pub values: Record,
}

/// Snapshot of the context a fetch was issued for.
#[derive(Debug, Clone)]
pub struct FetchTicket {
    generation: u64,
    schema: TableSchema,
    page: PageWindow,
}

impl FetchTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub async fn execute(&self, store: &dyn RecordStore) -> ExplorerResult<QueryPage> {
        query_records(store, &self.schema, &self.page).await
    }
}

pub struct ExplorerSession {
    store: Arc<dyn RecordStore>,
    config: ExplorerConfig,
    renderer: FieldRenderer,
    tables: Vec<TableDescriptor>,
    schema: Option<TableSchema>,
    page: PageWindow,
    records: Vec<Record>,
    draft: Option<Draft>,
    generation: u64,
}

impl ExplorerSession {
    pub fn new(store: Arc<dyn RecordStore>, config: ExplorerConfig) -> Self {
        Self {
            renderer: FieldRenderer::new(config.long_text_markers.clone()),
            page: PageWindow::new(config.page_size),
            store,
            config,
            tables: Vec::new(),
            schema: None,
            records: Vec::new(),
            draft: None,
            generation: 0,
        }
    }

    pub fn tables(&self) -> &[TableDescriptor] {
        &self.tables
    }

    pub fn schema(&self) -> Option<&TableSchema> {
        self.schema.as_ref()
    }

    pub fn page(&self) -> &PageWindow {
        &self.page
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn draft(&self) -> Option<&Draft> {
        self.draft.as_ref()
    }

    pub async fn load_tables(&mut self) -> ExplorerResult<&[TableDescriptor]> {
        let sources = discovery::table_sources(&self.config);
        self.tables = discovery::list_tables(self.store.as_ref(), &sources).await?;
        Ok(&self.tables)
    }

    /// Switches to `table`: loads its columns and the first page. On a
    /// discovery failure no schema is kept, so nothing can be written.
    pub async fn select_table(&mut self, table: &str) -> ExplorerResult<()> {
        self.generation += 1;
        self.schema = None;
        self.records.clear();
        self.draft = None;
        self.page = PageWindow::new(self.page.page_size);

        let schema = discovery::describe_columns(self.store.as_ref(), table, COLUMN_SOURCES).await?;
        self.schema = Some(schema);
        self.refresh().await
    }

    pub fn begin_fetch(&mut self) -> ExplorerResult<FetchTicket> {
        let schema = self.schema.clone().ok_or(ExplorerError::NoTableSelected)?;
        self.generation += 1;
        Ok(FetchTicket {
            generation: self.generation,
            schema,
            page: self.page.clone(),
        })
    }

    fn is_current(&self, ticket: &FetchTicket) -> bool {
        ticket.generation == self.generation
            && self
                .schema
                .as_ref()
                .is_some_and(|s| s.table_name == ticket.schema.table_name)
            && ticket.page.page_index == self.page.page_index
            && ticket.page.page_size == self.page.page_size
            && ticket.page.search_term == self.page.search_term
    }

    /// Applies a fetch result. Returns `Ok(false)` when the ticket is stale and
    /// the result was discarded. A failed fetch clears the record list.
    pub fn apply_fetch(&mut self, ticket: &FetchTicket, result: ExplorerResult<QueryPage>) -> ExplorerResult<bool> {
        if !self.is_current(ticket) {
            tracing::warn!(
                table = %ticket.schema.table_name,
                ticket = ticket.generation,
                current = self.generation,
                "discarding stale fetch result"
            );
            return Ok(false);
        }
        match result {
            Ok(page) => {
                self.records = page.records;
                self.page.total_count = page.total_count;
                Ok(true)
            }
            Err(e) => {
                self.records.clear();
                Err(e)
            }
        }
    }

    pub async fn refresh(&mut self) -> ExplorerResult<()> {
        let ticket = self.begin_fetch()?;
        let result = ticket.execute(self.store.as_ref()).await;
        self.apply_fetch(&ticket, result).map(|_| ())
    }

    pub async fn search(&mut self, term: &str) -> ExplorerResult<()> {
        self.page.set_search_term(term);
        self.refresh().await
    }

    /// Moves to `page_index`, clamped to the pages the last count reported.
    pub async fn go_to_page(&mut self, page_index: u64) -> ExplorerResult<()> {
        self.page.go_to(page_index.min(self.page.page_count()));
        self.refresh().await
    }

    pub async fn set_page_size(&mut self, page_size: u64) -> ExplorerResult<()> {
        self.page.set_page_size(page_size);
        self.refresh().await
    }

    pub fn new_draft(&mut self) -> ExplorerResult<&Draft> {
        let schema = self.schema.as_ref().ok_or(ExplorerError::NoTableSelected)?;
        Ok(self.draft.insert(Draft {
            mode: DraftMode::New,
            values: new_record(schema),
        }))
    }

    /// Starts editing the record at `index` of the current page.
    pub fn edit(&mut self, index: usize) -> ExplorerResult<&Draft> {
        let original = self.records.get(index).cloned().ok_or(ExplorerError::NoDraft)?;
        Ok(self.draft.insert(Draft {
            values: original.clone(),
            mode: DraftMode::Existing { original },
        }))
    }

    pub fn set_field(&mut self, column: &str, value: impl Into<Value>) -> ExplorerResult<()> {
        let schema = self.schema.as_ref().ok_or(ExplorerError::NoTableSelected)?;
        if schema.column(column).is_none() {
            return Err(ExplorerError::Coercion {
                column: column.to_string(),
                reason: "unknown column".to_string(),
            });
        }
        let draft = self.draft.as_mut().ok_or(ExplorerError::NoDraft)?;
        draft.values.insert(column.to_string(), value.into());
        Ok(())
    }

    /// Editors for the draft's fields in column order. Fields without a
    /// descriptor are not offered.
    pub fn editors(&self) -> ExplorerResult<Vec<EditorSpec>> {
        let schema = self.schema.as_ref().ok_or(ExplorerError::NoTableSelected)?;
        let draft = self.draft.as_ref().ok_or(ExplorerError::NoDraft)?;
        Ok(schema
            .columns
            .iter()
            .filter_map(|c| draft.values.get(&c.column_name).map(|v| self.renderer.render(c, v)))
            .collect())
    }

    pub fn cancel(&mut self) {
        self.draft = None;
    }

    /// Saves the draft and refetches the page. On failure the draft and the
    /// record list are left as they were.
    pub async fn save(&mut self) -> ExplorerResult<SaveOutcome> {
        let schema = self.schema.clone().ok_or(ExplorerError::NoTableSelected)?;
        let draft = self.draft.as_ref().ok_or(ExplorerError::NoDraft)?;
        let mode = match &draft.mode {
            DraftMode::New => SaveMode::Create,
            DraftMode::Existing { original } => SaveMode::Update { original },
        };
        let outcome = save_record(
            self.store.as_ref(),
            &schema,
            mode,
            &draft.values,
            self.config.json_policy,
        )
        .await?;

        if let DraftMode::Existing { original } = &draft.mode {
            let key = original.get(PRIMARY_KEY);
            if let Some(slot) = self.records.iter_mut().find(|r| r.get(PRIMARY_KEY) == key) {
                *slot = outcome.record.clone();
            }
        }
        self.draft = None;

        if let Err(e) = self.refresh().await {
            tracing::warn!(table = %schema.table_name, error = %e, "refetch after save failed");
        }
        Ok(outcome)
    }

    pub async fn delete(&mut self, key: &Value, confirmed: bool) -> ExplorerResult<()> {
        let table = self
            .schema
            .as_ref()
            .map(|s| s.table_name.clone())
            .ok_or(ExplorerError::NoTableSelected)?;
        delete_record(self.store.as_ref(), &table, key, confirmed).await?;
        if let Err(e) = self.refresh().await {
            tracing::warn!(table = %table, error = %e, "refetch after delete failed");
        }
        Ok(())
    }

    pub async fn export(&self) -> ExplorerResult<TableExport> {
        let schema = self.schema.as_ref().ok_or(ExplorerError::NoTableSelected)?;
        export_table(self.store.as_ref(), &schema.table_name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::{FailPoint, InMemoryStore};
    use crate::models::{ColumnDescriptor, DataKind};
    use serde_json::json;

    fn store() -> Arc<InMemoryStore> {
        let rows = (1..=12)
            .map(|i| json!({"id": i, "name": format!("Client {i}"), "notes": null}).as_object().cloned().unwrap())
            .collect();
        Arc::new(InMemoryStore::new().with_table(
            "clients",
            vec![
                ColumnDescriptor::new("clients", "id", DataKind::Integer, false),
                ColumnDescriptor::new("clients", "name", DataKind::Text, false),
                ColumnDescriptor::new("clients", "notes", DataKind::Text, true),
            ],
            rows,
        ))
    }

    async fn session(store: Arc<InMemoryStore>) -> ExplorerSession {
        let mut session = ExplorerSession::new(store, ExplorerConfig::default());
        session.select_table("clients").await.unwrap();
        session
    }

    #[tokio::test]
    async fn selecting_a_table_loads_first_page() {
        let session = session(store()).await;
        assert_eq!(session.records().len(), 10);
        assert_eq!(session.page().total_count, 12);
        assert_eq!(session.records()[0]["id"], json!(12));
    }

    #[tokio::test]
    async fn page_size_change_resets_to_first_page() {
        let mut session = session(store()).await;
        session.go_to_page(2).await.unwrap();
        assert_eq!(session.records().len(), 2);
        session.set_page_size(5).await.unwrap();
        assert_eq!(session.page().page_index, 1);
        assert_eq!(session.records().len(), 5);
    }

    #[tokio::test]
    async fn out_of_range_page_clamps_to_last_page() {
        let mut session = session(store()).await;
        session.go_to_page(u64::MAX / 2).await.unwrap();
        assert_eq!(session.page().page_index, 2);
        assert_eq!(session.records().len(), 2);
    }

    #[tokio::test]
    async fn stale_results_are_discarded() {
        let mut session = session(store()).await;
        let stale = session.begin_fetch().unwrap();
        let stale_result = stale.execute(session.store.as_ref()).await;
        session.go_to_page(2).await.unwrap();

        let applied = session.apply_fetch(&stale, stale_result).unwrap();
        assert!(!applied);
        assert_eq!(session.page().page_index, 2);
        assert_eq!(session.records().len(), 2);
    }

    #[tokio::test]
    async fn failed_fetch_clears_records_and_keeps_page() {
        let store = store();
        let mut session = session(store.clone()).await;
        session.search("client 1").await.unwrap();
        store.set_failure(FailPoint::Query, true);
        let err = session.refresh().await.unwrap_err();
        assert!(matches!(err, ExplorerError::Query { .. }));
        assert!(session.records().is_empty());
        assert_eq!(session.page().search_term, "client 1");
    }

    #[tokio::test]
    async fn editors_follow_column_order() {
        let mut session = session(store()).await;
        session.edit(0).unwrap();
        let editors = session.editors().unwrap();
        let columns: Vec<_> = editors.iter().map(|e| e.column.as_str()).collect();
        assert_eq!(columns, vec!["id", "name", "notes"]);
        assert!(editors[0].read_only);
    }

    #[tokio::test]
    async fn unknown_fields_cannot_be_set() {
        let mut session = session(store()).await;
        session.new_draft().unwrap();
        assert!(session.set_field("legacy", "x").is_err());
        session.cancel();
        assert!(session.draft().is_none());
    }

    #[tokio::test]
    async fn failed_save_keeps_draft() {
        let store = store();
        let mut session = session(store.clone()).await;
        session.edit(0).unwrap();
        session.set_field("name", "Renamed").unwrap();
        store.set_failure(FailPoint::Write, true);
        assert!(session.save().await.is_err());
        assert_eq!(session.draft().unwrap().values["name"], json!("Renamed"));
        assert_eq!(session.records()[0]["name"], json!("Client 12"));
    }

    #[tokio::test]
    async fn discovery_failure_leaves_no_schema() {
        let store = Arc::new(
            InMemoryStore::new()
                .failing(FailPoint::IntrospectColumns)
                .failing(FailPoint::Query),
        );
        let mut session = ExplorerSession::new(store, ExplorerConfig::default());
        assert!(matches!(
            session.select_table("clients").await,
            Err(ExplorerError::Discovery { .. })
        ));
        assert!(session.schema().is_none());
        assert_eq!(session.new_draft().unwrap_err(), ExplorerError::NoTableSelected);
    }
}
