use crate::db::RecordStore;
use crate::error::{ExplorerError, ExplorerResult};
use crate::models::{OrderBy, PageWindow, QueryPage, RecordFilter, RecordQuery, TableSchema, PRIMARY_KEY};

/// Builds the store query for `page`: text-column search, newest first.
///
/// Only `Text` columns take part in the search. A table without any text
/// column ignores the search term.
pub fn build_query(schema: &TableSchema, page: &PageWindow) -> RecordQuery {
    let term = page.search_term.trim();
    let text_columns = schema.text_columns();
    let filter = if term.is_empty() || text_columns.is_empty() {
        None
    } else {
        Some(RecordFilter {
            columns: text_columns,
            term: term.to_string(),
        })
    };
    let order_by = schema.has_primary_key().then(|| OrderBy {
        column: PRIMARY_KEY.to_string(),
        descending: true,
    });
    let (range_start, range_end) = page.row_range();

    RecordQuery {
        filter,
        order_by,
        range_start,
        range_end,
    }
}

/// Fetches one page. A failed ordered query is retried once without ordering;
/// any other failure is a query failure.
pub async fn query_records(
    store: &dyn RecordStore,
    schema: &TableSchema,
    page: &PageWindow,
) -> ExplorerResult<QueryPage> {
    let table = schema.table_name.as_str();
    let query = build_query(schema, page);
    tracing::debug!(
        table,
        start = query.range_start,
        end = query.range_end,
        search = query.filter.is_some(),
        "querying records"
    );

    let first = store.query(table, &query).await;
    let result = match first {
        Err(e) if query.order_by.is_some() => {
            tracing::warn!(table, error = %e, "ordered query failed, retrying unordered");
            let unordered = RecordQuery {
                order_by: None,
                ..query
            };
            store.query(table, &unordered).await
        }
        other => other,
    };

    result.map_err(|e| ExplorerError::Query {
        table: table.to_string(),
        reason: e.to_string(),
    })
}
