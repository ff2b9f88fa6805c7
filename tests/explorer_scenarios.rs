use serde_json::{json, Value};
use std::sync::Arc;

use site_explorer::db::memory::{FailPoint, InMemoryStore, StoreCall};
use site_explorer::explorer::{self, Control};
use site_explorer::models::{ColumnDescriptor, DataKind, Record};
use site_explorer::{ExplorerConfig, ExplorerError, ExplorerSession};

fn record(value: Value) -> Record {
    value.as_object().cloned().unwrap()
}

fn jobs_store(rows: Vec<Record>) -> Arc<InMemoryStore> {
    Arc::new(InMemoryStore::new().with_table(
        "jobs",
        vec![
            ColumnDescriptor::new("jobs", "id", DataKind::Integer, false),
            ColumnDescriptor::new("jobs", "title", DataKind::Text, true),
            ColumnDescriptor::new("jobs", "featured", DataKind::Boolean, true),
        ],
        rows,
    ))
}

fn inserts(store: &InMemoryStore) -> Vec<Record> {
    store
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            StoreCall::Insert { record, .. } => Some(record),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn new_job_with_unset_flag_is_saved_as_null_and_listed() {
    let existing = (1..=6)
        .map(|i| record(json!({"id": i, "title": format!("Job {i}"), "featured": false})))
        .collect();
    let store = jobs_store(existing);
    let mut session = ExplorerSession::new(store.clone(), ExplorerConfig::default());
    session.select_table("jobs").await.unwrap();

    session.new_draft().unwrap();
    session.set_field("title", "Drywall Installer").unwrap();
    session.set_field("featured", "").unwrap();
    let outcome = session.save().await.unwrap();

    assert_eq!(
        inserts(&store),
        vec![record(json!({"title": "Drywall Installer", "featured": null}))]
    );
    assert_eq!(outcome.record["id"], json!(7));
    assert!(session.draft().is_none());
    assert_eq!(session.records()[0]["id"], json!(7));
    assert_eq!(session.records()[0]["featured"], Value::Null);
}

#[tokio::test]
async fn update_targets_original_key_with_full_draft() {
    let store = jobs_store(vec![
        record(json!({"id": 3, "title": "Tiler", "featured": true})),
        record(json!({"id": 2, "title": "Painter", "featured": false})),
    ]);
    let mut session = ExplorerSession::new(store.clone(), ExplorerConfig::default());
    session.select_table("jobs").await.unwrap();

    session.edit(0).unwrap();
    session.set_field("title", "Senior Tiler").unwrap();
    session.set_field("id", 42).unwrap();
    session.save().await.unwrap();

    let updates: Vec<_> = store
        .calls()
        .into_iter()
        .filter(|c| matches!(c, StoreCall::Update { .. }))
        .collect();
    assert_eq!(
        updates,
        vec![StoreCall::Update {
            table: "jobs".into(),
            key: json!(3),
            record: record(json!({"title": "Senior Tiler", "featured": true})),
        }]
    );
    assert_eq!(session.records()[0]["title"], json!("Senior Tiler"));
    assert_eq!(session.records()[0]["id"], json!(3));
}

#[tokio::test]
async fn search_never_touches_numeric_columns() {
    let store = Arc::new(InMemoryStore::new().with_table(
        "services",
        vec![
            ColumnDescriptor::new("services", "name", DataKind::Text, false),
            ColumnDescriptor::new("services", "price", DataKind::Numeric, true),
        ],
        vec![
            record(json!({"name": "Tile repair", "price": 120})),
            record(json!({"name": "Painting", "price": 80})),
        ],
    ));
    let mut session = ExplorerSession::new(store.clone(), ExplorerConfig::default());
    session.select_table("services").await.unwrap();
    session.search("tile").await.unwrap();

    assert_eq!(session.records().len(), 1);
    let last = store.calls().pop().unwrap();
    match last {
        StoreCall::Query { query, .. } => {
            let filter = query.filter.unwrap();
            assert_eq!(filter.columns, vec!["name".to_string()]);
            assert_eq!(filter.term, "tile");
        }
        other => panic!("unexpected call {other:?}"),
    }
}

#[tokio::test]
async fn unconfirmed_delete_never_reaches_store() {
    let store = jobs_store(vec![record(json!({"id": 1, "title": "Roofer", "featured": null}))]);
    let mut session = ExplorerSession::new(store.clone(), ExplorerConfig::default());
    session.select_table("jobs").await.unwrap();

    let err = session.delete(&json!(1), false).await.unwrap_err();
    assert_eq!(err, ExplorerError::ConfirmationRequired);
    assert!(!store
        .calls()
        .iter()
        .any(|c| matches!(c, StoreCall::Delete { .. })));
    assert_eq!(store.rows("jobs").len(), 1);

    session.delete(&json!(1), true).await.unwrap();
    assert!(session.records().is_empty());
}

#[tokio::test]
async fn table_list_degrades_to_known_tables() {
    let store = Arc::new(
        InMemoryStore::new()
            .failing(FailPoint::IntrospectTables)
            .failing(FailPoint::ListTableNames),
    );
    let mut session = ExplorerSession::new(store, ExplorerConfig::default());
    let names: Vec<_> = session
        .load_tables()
        .await
        .unwrap()
        .iter()
        .map(|t| t.table_name.clone())
        .collect();
    assert!(names.contains(&"jobs".to_string()));
    assert!(names.contains(&"testimonials".to_string()));
}

#[tokio::test]
async fn pages_request_exact_row_ranges() {
    let rows = (1..=30)
        .map(|i| record(json!({"id": i, "title": format!("Job {i}"), "featured": null})))
        .collect();
    let store = jobs_store(rows);
    let mut session = ExplorerSession::new(store.clone(), ExplorerConfig::default());
    session.select_table("jobs").await.unwrap();
    session.set_page_size(7).await.unwrap();
    session.go_to_page(3).await.unwrap();

    let ranges: Vec<_> = store
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            StoreCall::Query { query, .. } if query.range_end > 0 => Some((query.range_start, query.range_end)),
            _ => None,
        })
        .collect();
    assert_eq!(ranges, vec![(0, 9), (0, 6), (14, 20)]);
    assert_eq!(session.records()[0]["id"], json!(16));
}

#[tokio::test]
async fn boolean_editor_and_nullable_round_trip() {
    let store = jobs_store(vec![]);
    let schema = explorer::describe_columns(store.as_ref(), "jobs", explorer::COLUMN_SOURCES)
        .await
        .unwrap();
    let featured = schema.column("featured").unwrap();

    for value in [json!(true), json!(false), Value::Null] {
        let spec = explorer::render_editor(featured, &value);
        let Control::TriStateSelect { options } = spec.control else {
            panic!("boolean columns use a tri-state select");
        };
        let values: Vec<_> = options.into_iter().map(|o| o.value).collect();
        assert_eq!(values, vec!["", "true", "false"]);
    }

    let saved = explorer::save_record(
        store.as_ref(),
        &schema,
        explorer::SaveMode::Create,
        &record(json!({"title": "", "featured": ""})),
        site_explorer::CoercionPolicy::Strict,
    )
    .await
    .unwrap();
    assert_eq!(saved.record["title"], Value::Null);
    assert_eq!(saved.record["featured"], Value::Null);
}
