//! Dialect-neutral schema diffing and reversible DDL synthesis.
//!
//! `revschema-core` turns structured table and column descriptions into
//! dialect-specific DDL, pairing every forward statement with a reverse one:
//!
//! - **Quoting** - knex-style `?` / `??` templates with per-dialect quoting
//! - **Snapshots** - canonical descriptions of columns, relations, indexes, views
//! - **Diff** - classifies column changes and reconciles primary keys
//! - **Dialects** - Databricks, PostgreSQL and SQLite strategies
//! - **Reversible** - builds `up` / `down` statement lists
//!
//! The crate performs no I/O; executing statements and reading catalogs is
//! the job of `revschema-migrate`.
//!
//! # Example
//!
//! ```rust
//! use revschema_core::{ColumnSnapshot, DialectKind, ReversibleBuilder, TableSpec};
//!
//! let builder = ReversibleBuilder::new(DialectKind::Postgres.strategy());
//! let spec = TableSpec::new("books")
//!     .column(ColumnSnapshot::new("books", "id", "integer").primary_key().auto_increment())
//!     .column(ColumnSnapshot::new("books", "title", "string").not_null());
//!
//! let set = builder.create_table(&spec).unwrap();
//! assert_eq!(set.up.len(), 1);
//! assert_eq!(set.down[0].sql, r#"DROP TABLE IF EXISTS "books""#);
//! ```

pub mod dialect;
pub mod diff;
pub mod error;
pub mod quote;
pub mod reversible;
pub mod snapshot;

pub use dialect::{
    ColumnOpKind, DatabricksDialect, DialectKind, DialectStrategy, PostgresDialect, SqliteDialect,
};
pub use diff::{classify, primary_key_change, PrimaryKeyChange};
pub use error::{Result, SynthError};
pub use quote::{gen_query, QueryArg, Quoter};
pub use reversible::{ReversibleBuilder, ReversibleStatementSet, Statement};
pub use snapshot::{
    normalize_default, ChangeMarker, ColumnSnapshot, ConstraintKind, IndexSnapshot, IndexSpec,
    ReferentialAction, RelationSpec, TableSpec, TriggerSpec, ViewSnapshot,
};
