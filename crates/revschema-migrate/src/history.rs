//! Migration ledger.
//!
//! Each migration source records its applied units in its own table with
//! the columns `id`, `name` (unique) and `applied_at`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use revschema_core::{gen_query, ColumnSnapshot, IndexSpec, SynthError, TableSpec};
use tracing::{debug, warn};

use crate::client::SqlClient;
use crate::engine;
use crate::error::{Error, Result};
use crate::introspect::RowExt;

/// A record of an applied migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMigration {
    /// Position in the ledger; increases with every application.
    pub id: i64,
    /// Migration name.
    pub name: String,
    /// When the migration was applied.
    pub applied_at: DateTime<Utc>,
}

fn parse_applied_at(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").map(|dt| dt.and_utc())
        })
        .map_err(|e| Error::InvalidState(format!("unreadable applied_at '{value}': {e}")))
}

/// Reads and writes one ledger table.
#[derive(Debug, Clone)]
pub struct MigrationLedger {
    client: Arc<SqlClient>,
    table: String,
}

impl MigrationLedger {
    /// Creates a ledger over `table`.
    #[must_use]
    pub fn new(client: Arc<SqlClient>, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }

    /// Ledger table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    fn spec(&self) -> TableSpec {
        TableSpec::new(&self.table)
            .column(ColumnSnapshot::new("", "id", "bigint").primary_key())
            .column(ColumnSnapshot::new("", "name", "string").not_null())
            .column(ColumnSnapshot::new("", "applied_at", "string").char_length(64).not_null())
    }

    fn query(&self, template: &str, args: &[revschema_core::QueryArg]) -> Result<String> {
        Ok(gen_query(self.client.dialect(), template, args)?)
    }

    /// Creates the ledger table if it does not exist.
    pub async fn ensure_table(&self) -> Result<()> {
        if self.client.has_table(&self.table).await? {
            return Ok(());
        }
        debug!(table = %self.table, "Creating migration ledger");
        let dialect = self.client.dialect();
        let mut statements = vec![dialect.synthesize_create_table(&self.spec())?];
        let index = IndexSpec {
            table_name: self.table.clone(),
            index_name: format!("{}_name_unique", self.table),
            columns: vec!["name".to_string()],
            unique: true,
        };
        match dialect.synthesize_create_index(&index) {
            Ok(statement) => statements.push(statement),
            Err(SynthError::Unsupported { .. }) => {
                warn!(table = %self.table, "Dialect has no indexes, ledger names are checked on insert only");
            }
            Err(e) => return Err(e.into()),
        }
        let transport = self.client.transport().await;
        engine::execute_statements(transport.as_ref(), &statements).await?;
        Ok(())
    }

    /// Gets all applied migrations, oldest first.
    pub async fn applied(&self) -> Result<Vec<AppliedMigration>> {
        let sql = self.query(
            "SELECT ??, ??, ?? FROM ?? ORDER BY ??",
            &["id".into(), "name".into(), "applied_at".into(), self.table.as_str().into(), "id".into()],
        )?;
        let rows = self.client.transport().await.fetch(&sql).await?;
        rows.iter()
            .map(|row| {
                Ok(AppliedMigration {
                    id: row
                        .int("id")
                        .ok_or_else(|| Error::InvalidState(format!("ledger '{}' has a row without id", self.table)))?,
                    name: row.text("name").unwrap_or_default(),
                    applied_at: parse_applied_at(&row.text("applied_at").unwrap_or_default())?,
                })
            })
            .collect()
    }

    /// Checks if a migration has been applied.
    pub async fn is_applied(&self, name: &str) -> Result<bool> {
        Ok(self.applied().await?.iter().any(|m| m.name == name))
    }

    /// Records a migration as applied.
    pub async fn record_applied(&self, name: &str) -> Result<()> {
        let applied = self.applied().await?;
        if applied.iter().any(|m| m.name == name) {
            return Err(Error::InvalidState(format!(
                "migration '{name}' is already recorded in '{}'",
                self.table
            )));
        }
        let next_id = applied.iter().map(|m| m.id).max().unwrap_or(0) + 1;
        let sql = self.query(
            "INSERT INTO ?? (??, ??, ??) VALUES (?, ?, ?)",
            &[
                self.table.as_str().into(),
                "id".into(),
                "name".into(),
                "applied_at".into(),
                next_id.to_string().into(),
                name.into(),
                Utc::now().to_rfc3339().into(),
            ],
        )?;
        debug!(sql = %sql, "Executing SQL");
        self.client.transport().await.execute(&sql).await?;
        Ok(())
    }

    /// Removes a migration record (for rollback).
    pub async fn record_unapplied(&self, name: &str) -> Result<()> {
        let sql = self.query(
            "DELETE FROM ?? WHERE ?? = ?",
            &[self.table.as_str().into(), "name".into(), name.into()],
        )?;
        debug!(sql = %sql, "Executing SQL");
        let affected = self.client.transport().await.execute(&sql).await?;
        if affected == 0 {
            return Err(Error::InvalidState(format!(
                "migration '{name}' is not recorded in '{}'",
                self.table
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LocalTransport;
    use revschema_core::DialectKind;

    async fn ledger() -> MigrationLedger {
        let transport = LocalTransport::connect("sqlite::memory:", 1)
            .await
            .expect("Failed to create in-memory SQLite pool");
        let client = SqlClient::with_transport(Arc::new(transport), DialectKind::Sqlite, None);
        MigrationLedger::new(Arc::new(client), "test_migrations")
    }

    #[tokio::test]
    async fn test_record_and_unrecord() {
        let ledger = ledger().await;
        ledger.ensure_table().await.unwrap();
        ledger.ensure_table().await.unwrap();

        ledger.record_applied("001_init").await.unwrap();
        ledger.record_applied("002_order").await.unwrap();
        assert!(ledger.record_applied("001_init").await.is_err());

        let applied = ledger.applied().await.unwrap();
        let names: Vec<&str> = applied.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["001_init", "002_order"]);
        assert!(applied[0].id < applied[1].id);

        ledger.record_unapplied("002_order").await.unwrap();
        assert!(!ledger.is_applied("002_order").await.unwrap());
        assert!(matches!(
            ledger.record_unapplied("002_order").await,
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_parse_applied_at_formats() {
        let parsed = parse_applied_at("2024-03-01 10:00:00").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-03-01T10:00:00+00:00");
        let parsed = parse_applied_at("2024-03-01T10:00:00+00:00").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-03-01T10:00:00+00:00");
        assert!(matches!(parse_applied_at("yesterday"), Err(Error::InvalidState(_))));
        assert!(parse_applied_at("").is_err());
    }

    #[tokio::test]
    async fn test_corrupt_applied_at_is_reported() {
        let ledger = ledger().await;
        ledger.ensure_table().await.unwrap();
        ledger
            .client
            .transport()
            .await
            .execute("INSERT INTO test_migrations (id, name, applied_at) VALUES (1, '001_init', 'garbage')")
            .await
            .unwrap();

        let err = ledger.applied().await.unwrap_err();
        assert!(matches!(err, Error::InvalidState(ref m) if m.contains("garbage")));
    }
}
