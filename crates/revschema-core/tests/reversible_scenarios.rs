//! End-to-end synthesis scenarios across dialects.

use pretty_assertions::assert_eq;
use revschema_core::{
    ColumnSnapshot, DialectKind, ReferentialAction, ReversibleBuilder, TableSpec,
};

fn books_spec() -> TableSpec {
    TableSpec::new("books")
        .column(ColumnSnapshot::new("books", "id", "integer").primary_key().auto_increment())
        .column(ColumnSnapshot::new("books", "title", "string").not_null())
}

fn books_columns() -> Vec<ColumnSnapshot> {
    books_spec().columns
}

// =============================================================================
// Create / drop
// =============================================================================

#[test]
fn test_create_table_has_one_up_and_one_down() {
    for kind in [DialectKind::Databricks, DialectKind::Postgres, DialectKind::Sqlite] {
        let set = ReversibleBuilder::new(kind.strategy())
            .create_table(&books_spec())
            .unwrap();
        assert_eq!(set.up.len(), 1, "{kind}");
        assert_eq!(set.down.len(), 1, "{kind}");
        assert!(set.up[0].sql.starts_with("CREATE TABLE"), "{kind}");
        assert!(set.down[0].sql.starts_with("DROP TABLE"), "{kind}");
    }
}

#[test]
fn test_drop_table_recreates_relations_and_indexes() {
    use revschema_core::{ConstraintKind, IndexSnapshot, RelationSpec};

    let builder = ReversibleBuilder::new(DialectKind::Postgres.strategy());
    let spec = TableSpec::new("orders")
        .column(ColumnSnapshot::new("orders", "id", "integer").primary_key())
        .column(ColumnSnapshot::new("orders", "customer_id", "integer"));
    let relations = vec![RelationSpec::new("orders", "customer_id", "customers", "id")
        .named("orders_customer_fk")
        .on_delete(ReferentialAction::Cascade)];
    let index = |name: &str, constraint| IndexSnapshot {
        table_name: "orders".into(),
        index_name: name.into(),
        column_name: "customer_id".into(),
        non_unique: true,
        sequence_in_index: 1,
        constraint,
    };
    let indexes = vec![
        index("orders_pkey", Some(ConstraintKind::PrimaryKey)),
        index("orders_customer_idx", None),
    ];

    let set = builder.drop_table(&spec, &relations, &indexes).unwrap();
    assert_eq!(set.up.len(), 1);
    assert_eq!(set.up[0].sql, r#"DROP TABLE IF EXISTS "orders""#);
    assert_eq!(set.down.len(), 3);
    assert!(set.down[0].sql.starts_with(r#"CREATE TABLE "orders""#));
    assert_eq!(
        set.down[1].sql,
        r#"ALTER TABLE "orders" ADD CONSTRAINT "orders_customer_fk" FOREIGN KEY ("customer_id") REFERENCES "customers" ("id") ON DELETE CASCADE"#
    );
    assert_eq!(
        set.down[2].sql,
        r#"CREATE INDEX "orders_customer_idx" ON "orders" ("customer_id")"#
    );
}

#[test]
fn test_drop_table_with_array_and_enum_columns() {
    let mut tags = ColumnSnapshot::new("events", "tags", "array");
    tags.raw_type = Some("_int4".into());
    let mut mood = ColumnSnapshot::new("events", "mood", "user-defined");
    mood.raw_type = Some("mood".into());
    let spec = TableSpec::new("events")
        .column(ColumnSnapshot::new("events", "id", "integer").primary_key())
        .column(tags)
        .column(mood);

    let set = ReversibleBuilder::new(DialectKind::Postgres.strategy())
        .drop_table(&spec, &[], &[])
        .unwrap();
    assert_eq!(set.up[0].sql, r#"DROP TABLE IF EXISTS "events""#);
    assert!(set.down[0].sql.contains(r#""tags" "int4"[]"#), "{}", set.down[0].sql);
    assert!(set.down[0].sql.contains(r#""mood" "mood""#), "{}", set.down[0].sql);
}

#[test]
fn test_unknown_type_without_catalog_name_is_rejected() {
    let spec = TableSpec::new("events")
        .column(ColumnSnapshot::new("events", "id", "integer").primary_key())
        .column(ColumnSnapshot::new("events", "tags", "array"));
    assert!(ReversibleBuilder::new(DialectKind::Postgres.strategy())
        .drop_table(&spec, &[], &[])
        .is_err());
}

// =============================================================================
// Add / remove
// =============================================================================

#[test]
fn test_add_description_column() {
    let builder = ReversibleBuilder::new(DialectKind::Postgres.strategy());
    let old = books_columns();
    let mut new: Vec<_> = old.iter().cloned().map(ColumnSnapshot::existing).collect();
    new.push(ColumnSnapshot::new("books", "description", "text"));

    let set = builder.alter_table("books", &old, &new).unwrap();
    assert_eq!(set.up.len(), 1);
    assert_eq!(set.up[0].sql, r#"ALTER TABLE "books" ADD COLUMN "description" TEXT"#);
    assert_eq!(set.down.len(), 1);
    assert_eq!(set.down[0].sql, r#"ALTER TABLE "books" DROP COLUMN "description""#);
}

#[test]
fn test_round_trip_without_removals_restores_old_columns() {
    let builder = ReversibleBuilder::new(DialectKind::Postgres.strategy());
    let old = books_columns();
    let new = vec![
        old[0].clone().existing(),
        ColumnSnapshot::new("books", "name", "string")
            .renamed_from("title")
            .default_value("untitled"),
        ColumnSnapshot::new("books", "pages", "integer"),
    ];
    let forward = builder.alter_table("books", &old, &new).unwrap();
    assert!(!forward.up.is_empty());

    // Going back from the new structure must produce the old down list.
    let applied: Vec<_> = new
        .iter()
        .map(|c| {
            let mut c = c.clone();
            c.original_name = None;
            c
        })
        .collect();
    let restored = vec![
        old[0].clone().existing(),
        old[1].clone().renamed_from("name"),
    ];
    let backward = builder.alter_table("books", &applied, &restored).unwrap();
    assert_eq!(backward.up.len(), forward.down.len());
    for stmt in &forward.down {
        assert!(backward.up.contains(stmt), "missing {stmt}");
    }
}

// =============================================================================
// Primary keys
// =============================================================================

#[test]
fn test_unchanged_primary_key_emits_no_key_statements() {
    let builder = ReversibleBuilder::new(DialectKind::Databricks.strategy());
    let old = books_columns();
    let new = vec![
        old[0].clone().existing(),
        old[1].clone().existing().comment("shown in lists"),
        ColumnSnapshot::new("books", "isbn", "string"),
    ];
    let set = builder.alter_table("books", &old, &new).unwrap();
    assert!(set.up.iter().all(|s| !s.sql.contains("PRIMARY KEY")));
    assert!(set.up.iter().all(|s| !s.sql.contains("DROP CONSTRAINT")));
}

#[test]
fn test_primary_key_rebuild_emits_at_most_one_drop_and_one_add() {
    let builder = ReversibleBuilder::new(DialectKind::Postgres.strategy());
    let old = vec![
        ColumnSnapshot::new("t", "a", "integer").primary_key(),
        ColumnSnapshot::new("t", "b", "integer").not_null(),
        ColumnSnapshot::new("t", "c", "string"),
    ];
    let new = vec![
        ColumnSnapshot::new("t", "a", "integer").primary_key().existing(),
        ColumnSnapshot::new("t", "b", "integer").primary_key().existing(),
        ColumnSnapshot::new("t", "d", "integer").primary_key(),
    ];
    let set = builder.alter_table("t", &old, &new).unwrap();
    let drops = set.up.iter().filter(|s| s.sql.contains("DROP CONSTRAINT")).count();
    let adds = set.up.iter().filter(|s| s.sql.contains("PRIMARY KEY")).count();
    assert_eq!(drops, 1);
    assert_eq!(adds, 1);
    assert_eq!(
        set.up.last().unwrap().sql,
        r#"ALTER TABLE "t" ADD CONSTRAINT "t_pkey" PRIMARY KEY ("a","b","d")"#
    );
}

// =============================================================================
// Defaults
// =============================================================================

#[test]
fn test_cast_default_round_trip_is_not_a_change() {
    let builder = ReversibleBuilder::new(DialectKind::Postgres.strategy());
    let old = vec![ColumnSnapshot::new("t", "status", "varchar")
        .char_length(255)
        .default_value("'foo'::character varying")];
    let new = vec![ColumnSnapshot::new("t", "status", "varchar")
        .char_length(255)
        .default_value("'foo'")
        .existing()];
    let set = builder.alter_table("t", &old, &new).unwrap();
    assert!(set.is_empty());
}
