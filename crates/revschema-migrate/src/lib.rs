//! Reversible schema edits against live databases, and a versioned
//! migrator for the metadata store.
//!
//! `revschema-migrate` executes what `revschema-core` synthesizes:
//!
//! - **Transport** - a local `sqlx` pool or a remote HTTP executor
//! - **Engine** - statement splitting and ordered execution
//! - **Client** - the [`SqlClient`] operation surface with introspection
//! - **Migrations** - static, ordered migration units with a SQL ledger
//!
//! # Example
//!
//! ```rust,no_run
//! use revschema_core::{ColumnSnapshot, DialectKind, TableSpec};
//! use revschema_migrate::{ClientConfig, SqlClient};
//!
//! # async fn run() -> revschema_migrate::Result<()> {
//! let config = ClientConfig::new(DialectKind::Postgres, "postgres://app@localhost/app");
//! let client = SqlClient::connect(&config).await?;
//!
//! let spec = TableSpec::new("books")
//!     .column(ColumnSnapshot::new("books", "id", "integer").primary_key().auto_increment())
//!     .column(ColumnSnapshot::new("books", "title", "string").not_null());
//! let set = client.create_table(&spec).await?;
//! println!("{:?}", set.data().map(|s| &s.down));
//! # Ok(())
//! # }
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Apply pending metadata migrations
//! revschema --config revschema.toml migrate
//!
//! # Revert the last two
//! revschema --config revschema.toml migrate --reverse --count 2
//!
//! # Show migration status
//! revschema --config revschema.toml show-migrations
//! ```

pub mod audit;
pub mod client;
pub mod config;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod executor;
pub mod history;
pub mod introspect;
pub mod meta;
pub mod migration;
pub mod transport;

pub use audit::{AuditSink, MemoryAuditSink, TracingAuditSink};
pub use client::{ServerVersion, SqlClient};
pub use config::{ClientConfig, RemoteConfig};
pub use engine::{execute_raw_query, execute_statements, split_statements, RawQueryResult};
pub use envelope::ResultEnvelope;
pub use error::{Error, Result};
pub use executor::{MigrationExecutor, MigrationState, MigrationStatus};
pub use history::{AppliedMigration, MigrationLedger};
pub use migration::{MetaConnection, MigrationFn, MigrationSource, MigrationUnit};
pub use transport::{BatchFailure, LocalTransport, RemoteTransport, Row, Transport};
