//! Schema edits and introspection through `SqlClient` on in-memory SQLite.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use revschema_core::{
    ColumnSnapshot, DialectKind, IndexSpec, ReferentialAction, TableSpec, ViewSnapshot,
};
use revschema_migrate::{
    execute_raw_query, execute_statements, Error, LocalTransport, MemoryAuditSink, RawQueryResult,
    SqlClient, Transport,
};

async fn client() -> SqlClient {
    let transport = LocalTransport::connect("sqlite::memory:", 1)
        .await
        .expect("Failed to create in-memory SQLite pool");
    SqlClient::with_transport(Arc::new(transport), DialectKind::Sqlite, None)
}

fn books() -> TableSpec {
    TableSpec::new("books")
        .column(ColumnSnapshot::new("", "id", "integer").primary_key().auto_increment())
        .column(ColumnSnapshot::new("", "title", "string").char_length(120).not_null())
        .column(ColumnSnapshot::new("", "status", "string").default_value("draft"))
}

fn column_names(columns: &[ColumnSnapshot]) -> Vec<&str> {
    columns.iter().map(|c| c.column_name.as_str()).collect()
}

type Shape<'a> = (&'a str, &'a str, Option<u32>, bool, bool, Option<&'a str>);

fn shape(columns: &[ColumnSnapshot]) -> Vec<Shape<'_>> {
    columns
        .iter()
        .map(|c| {
            (
                c.column_name.as_str(),
                c.logical_type.as_str(),
                c.char_length,
                c.is_primary_key,
                c.is_nullable,
                c.default_value.as_deref(),
            )
        })
        .collect()
}

#[tokio::test]
async fn test_create_then_introspect() {
    let client = client().await;
    client.create_table(&books()).await.unwrap();

    let columns = client.list_columns("books").await.into_result().unwrap();
    assert_eq!(column_names(&columns), vec!["id", "title", "status"]);

    let id = &columns[0];
    assert!(id.is_primary_key);
    assert!(id.is_auto_increment);
    assert!(!id.is_nullable);

    let title = &columns[1];
    assert_eq!(title.logical_type, "varchar");
    assert_eq!(title.char_length, Some(120));
    assert!(!title.is_nullable);

    assert_eq!(columns[2].default_value.as_deref(), Some("draft"));
    assert_eq!(client.list_tables().await.into_result().unwrap(), vec!["books"]);
}

#[tokio::test]
async fn test_add_column_and_apply_reverse() {
    let client = client().await;
    client.create_table(&books()).await.unwrap();

    let current = client.list_columns("books").await.into_result().unwrap();
    let mut new: Vec<ColumnSnapshot> = current.iter().cloned().map(ColumnSnapshot::existing).collect();
    new.push(ColumnSnapshot::new("books", "description", "text"));

    let set = client
        .alter_table("books", &new, None)
        .await
        .unwrap()
        .into_result()
        .unwrap();
    assert_eq!(set.up.len(), 1);
    assert_eq!(set.up[0].sql, r#"ALTER TABLE "books" ADD COLUMN "description" TEXT"#);
    assert_eq!(set.down[0].sql, r#"ALTER TABLE "books" DROP COLUMN "description""#);
    assert!(client.has_column("books", "description").await.unwrap());

    execute_statements(client.transport().await.as_ref(), &set.down)
        .await
        .unwrap();
    let after = client.list_columns("books").await.into_result().unwrap();
    assert_eq!(column_names(&after), column_names(&current));
}

#[tokio::test]
async fn test_unchanged_columns_produce_nothing() {
    let client = client().await;
    client.create_table(&books()).await.unwrap();
    let current = client.list_columns("books").await.into_result().unwrap();
    let same: Vec<ColumnSnapshot> = current.iter().cloned().map(ColumnSnapshot::existing).collect();

    let set = client
        .alter_table("books", &same, Some(current.as_slice()))
        .await
        .unwrap()
        .into_result()
        .unwrap();
    assert!(set.is_empty());
}

#[tokio::test]
async fn test_rename_column() {
    let client = client().await;
    client.create_table(&books()).await.unwrap();
    let current = client.list_columns("books").await.into_result().unwrap();
    let new: Vec<ColumnSnapshot> = current
        .iter()
        .cloned()
        .map(|c| {
            let mut c = c.existing();
            if c.column_name == "status" {
                c.column_name = "state".to_string();
            }
            c
        })
        .collect();

    client.alter_table("books", &new, None).await.unwrap();
    assert!(client.has_column("books", "state").await.unwrap());
    assert!(!client.has_column("books", "status").await.unwrap());
}

#[tokio::test]
async fn test_rename_and_remove_round_trip() {
    let client = client().await;
    let notes = TableSpec::new("notes")
        .column(ColumnSnapshot::new("", "id", "integer").primary_key().auto_increment())
        .column(ColumnSnapshot::new("", "title", "string").char_length(80).not_null())
        .column(ColumnSnapshot::new("", "remark", "string").default_value("it's"));
    client.create_table(&notes).await.unwrap();
    let original = client.list_columns("notes").await.into_result().unwrap();
    assert_eq!(original[2].default_value.as_deref(), Some("it's"));

    let same: Vec<ColumnSnapshot> = original.iter().cloned().map(ColumnSnapshot::existing).collect();
    let unchanged = client
        .alter_table("notes", &same, Some(original.as_slice()))
        .await
        .unwrap()
        .into_result()
        .unwrap();
    assert!(unchanged.is_empty());

    let new: Vec<ColumnSnapshot> = original
        .iter()
        .cloned()
        .map(ColumnSnapshot::existing)
        .filter(|c| c.column_name != "remark")
        .map(|mut c| {
            if c.column_name == "title" {
                c.column_name = "headline".to_string();
            }
            c
        })
        .collect();
    let set = client
        .alter_table("notes", &new, None)
        .await
        .unwrap()
        .into_result()
        .unwrap();
    assert!(client.has_column("notes", "headline").await.unwrap());
    assert!(!client.has_column("notes", "remark").await.unwrap());

    execute_statements(client.transport().await.as_ref(), &set.down)
        .await
        .unwrap();
    let restored = client.list_columns("notes").await.into_result().unwrap();
    assert_eq!(shape(&restored), shape(&original));
}

#[tokio::test]
async fn test_sqlite_retype_is_unsupported() {
    let client = client().await;
    client.create_table(&books()).await.unwrap();
    let current = client.list_columns("books").await.into_result().unwrap();
    let new: Vec<ColumnSnapshot> = current
        .iter()
        .cloned()
        .map(|c| {
            let mut c = c.existing();
            if c.column_name == "status" {
                c.logical_type = "integer".to_string();
                c.char_length = None;
            }
            c
        })
        .collect();

    let err = client.alter_table("books", &new, None).await.unwrap_err();
    assert!(matches!(err, Error::UnsupportedOperation { .. }));
}

#[tokio::test]
async fn test_relation_rules_are_read() {
    let client = client().await;
    client
        .execute_raw_query(
            "CREATE TABLE authors (id INTEGER PRIMARY KEY);
             CREATE TABLE posts (
                 id INTEGER PRIMARY KEY,
                 author_id INTEGER REFERENCES authors(id) ON DELETE CASCADE
             )",
        )
        .await
        .unwrap();

    let relations = client.list_relations("posts").await.into_result().unwrap();
    assert_eq!(relations.len(), 1);
    assert_eq!(relations[0].parent_table, "authors");
    assert_eq!(relations[0].child_column, "author_id");
    assert_eq!(relations[0].on_delete, Some(ReferentialAction::Cascade));
    assert_eq!(relations[0].on_delete.map(ReferentialAction::as_sql), Some("CASCADE"));
}

#[tokio::test]
async fn test_index_and_view_round_trip() {
    let sink = Arc::new(MemoryAuditSink::new());
    let client = client().await.with_audit(sink.clone());
    client.create_table(&books()).await.unwrap();

    let index = IndexSpec {
        table_name: "books".to_string(),
        index_name: "books_title_idx".to_string(),
        columns: vec!["title".to_string()],
        unique: false,
    };
    client.create_index(&index).await.unwrap();
    let indexes = client.list_indexes("books").await.into_result().unwrap();
    assert!(indexes.iter().any(|i| i.index_name == "books_title_idx" && i.column_name == "title"));

    let view = ViewSnapshot {
        view_name: "drafts".to_string(),
        definition: "SELECT id, title FROM books WHERE status = 'draft'".to_string(),
    };
    client.create_view(&view).await.unwrap();
    let views = client.list_views().await.into_result().unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].view_name, "drafts");

    let set = client.drop_view("drafts").await.unwrap().into_result().unwrap();
    assert!(client.list_views().await.into_result().unwrap().is_empty());
    execute_statements(client.transport().await.as_ref(), &set.down)
        .await
        .unwrap();
    assert_eq!(client.list_views().await.into_result().unwrap().len(), 1);

    let operations: Vec<String> = sink.entries().into_iter().map(|(op, _)| op).collect();
    assert_eq!(operations, vec!["create_table", "create_index", "create_view", "drop_view"]);
}

#[tokio::test]
async fn test_drop_table_keeps_structure_in_reverse() {
    let client = client().await;
    client.create_table(&books()).await.unwrap();
    let set = client.drop_table("books").await.unwrap().into_result().unwrap();
    assert!(!client.has_table("books").await.unwrap());

    execute_statements(client.transport().await.as_ref(), &set.down)
        .await
        .unwrap();
    let columns = client.list_columns("books").await.into_result().unwrap();
    assert_eq!(column_names(&columns), vec!["id", "title", "status"]);
}

#[tokio::test]
async fn test_raw_query_batches() {
    let client = client().await;
    let result = client
        .execute_raw_query("CREATE TABLE t (v TEXT); INSERT INTO t VALUES ('a;b'); SELECT v FROM t")
        .await
        .unwrap();
    match result {
        RawQueryResult::Batch(sets) => {
            assert_eq!(sets.len(), 3);
            assert_eq!(sets[2][0]["v"], "a;b");
        }
        RawQueryResult::Single(_) => panic!("expected a batch"),
    }

    let err = client
        .execute_raw_query("CREATE TABLE u (v TEXT); INSERT INTO u VALUES ('x'); SELECT missing FROM u")
        .await
        .unwrap_err();
    match err {
        Error::Execution {
            failed_index,
            failed_sql,
            executed,
            ..
        } => {
            assert_eq!(failed_index, 2);
            assert_eq!(failed_sql, "SELECT missing FROM u");
            assert_eq!(
                executed,
                vec!["CREATE TABLE u (v TEXT)", "INSERT INTO u VALUES ('x')"]
            );
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_batch_keeps_session_state_on_a_shared_pool() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("pool.db").display());
    let transport = LocalTransport::connect(&url, 4)
        .await
        .expect("Failed to create SQLite pool");

    for i in 0..20 {
        let sql = format!(
            "CREATE TEMP TABLE scratch{i} (a INTEGER); INSERT INTO scratch{i} VALUES (1); SELECT a FROM scratch{i}"
        );
        match execute_raw_query(&transport, &sql).await.unwrap() {
            RawQueryResult::Batch(sets) => assert_eq!(sets[2][0]["a"], 1),
            RawQueryResult::Single(_) => panic!("expected a batch"),
        }
    }
    transport.close().await;
}
