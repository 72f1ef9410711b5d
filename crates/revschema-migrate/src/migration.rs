//! Migration units and the connection they run against.
//!
//! Units are plain function pairs registered in static, ordered arrays.
//! The order of the array is the order of application; nothing is
//! discovered at runtime.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use revschema_core::{ColumnSnapshot, DialectStrategy, TableSpec};
use tracing::{debug, warn};

use crate::client::SqlClient;
use crate::error::{Error, Result};

/// A unit's `up` or `down` step.
pub type MigrationFn = for<'a> fn(&'a MetaConnection) -> BoxFuture<'a, Result<()>>;

/// One named, reversible migration step.
#[derive(Clone, Copy)]
pub struct MigrationUnit {
    /// Unique name, recorded in the ledger once applied.
    pub name: &'static str,
    /// Applies the step.
    pub up: MigrationFn,
    /// Reverts the step.
    pub down: MigrationFn,
}

impl fmt::Debug for MigrationUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationUnit")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// An ordered group of units sharing one ledger table.
#[derive(Debug, Clone, Copy)]
pub struct MigrationSource {
    /// Source name, used in logs.
    pub name: &'static str,
    /// Ledger table recording which units of this source ran.
    pub ledger_table: &'static str,
    /// Units in application order.
    pub units: &'static [MigrationUnit],
}

impl MigrationSource {
    /// Looks up a unit by name.
    #[must_use]
    pub fn unit(&self, name: &str) -> Option<&'static MigrationUnit> {
        self.units.iter().find(|u| u.name == name)
    }

    /// Fails if two units share a name.
    pub fn validate(&self) -> Result<()> {
        for (i, unit) in self.units.iter().enumerate() {
            if self.units[..i].iter().any(|u| u.name == unit.name) {
                return Err(Error::InvalidState(format!(
                    "duplicate migration name '{}' in source '{}'",
                    unit.name, self.name
                )));
            }
        }
        Ok(())
    }
}

/// The metadata database as seen by migration units.
#[derive(Debug, Clone)]
pub struct MetaConnection {
    client: Arc<SqlClient>,
}

impl MetaConnection {
    /// Wraps a client.
    #[must_use]
    pub fn new(client: Arc<SqlClient>) -> Self {
        Self { client }
    }

    /// The underlying client.
    #[must_use]
    pub fn client(&self) -> &SqlClient {
        &self.client
    }

    /// The shared client handle.
    #[must_use]
    pub fn shared(&self) -> Arc<SqlClient> {
        Arc::clone(&self.client)
    }

    /// The metadata database dialect.
    #[must_use]
    pub fn dialect(&self) -> &'static dyn DialectStrategy {
        self.client.dialect()
    }

    /// Returns `true` if `table` exists.
    pub async fn has_table(&self, table: &str) -> Result<bool> {
        self.client.has_table(table).await
    }

    /// Returns `true` if `table` has `column`.
    pub async fn has_column(&self, table: &str, column: &str) -> Result<bool> {
        self.client.has_column(table, column).await
    }

    /// Runs one statement, returning the affected row count.
    pub async fn execute(&self, sql: &str) -> Result<u64> {
        debug!(sql = %sql, "Executing SQL");
        self.client.transport().await.execute(sql).await
    }

    /// Creates `spec` unless the table already exists.
    pub async fn create_table_if_missing(&self, spec: &TableSpec) -> Result<()> {
        if self.has_table(&spec.table_name).await? {
            warn!(table = %spec.table_name, "Table already exists, skipping");
            return Ok(());
        }
        self.client.create_table(spec).await?;
        Ok(())
    }

    /// Drops `table` if it exists.
    pub async fn drop_table_if_exists(&self, table: &str) -> Result<()> {
        if !self.has_table(table).await? {
            warn!(table = %table, "Table does not exist, skipping");
            return Ok(());
        }
        self.client.drop_table(table).await?;
        Ok(())
    }

    /// Renames `from` to `to` when `from` exists.
    pub async fn rename_table_if_exists(&self, from: &str, to: &str) -> Result<()> {
        if !self.has_table(from).await? {
            warn!(table = %from, "Table does not exist, skipping rename");
            return Ok(());
        }
        self.client.rename_table(from, to).await?;
        Ok(())
    }

    /// Adds `column` to `table` unless it is already there.
    pub async fn add_column_if_missing(&self, table: &str, column: ColumnSnapshot) -> Result<()> {
        if self.has_column(table, &column.column_name).await? {
            warn!(table = %table, column = %column.column_name, "Column already exists, skipping");
            return Ok(());
        }
        let mut columns = self.existing_columns(table).await?;
        columns.push(column);
        self.client.alter_table(table, &columns, None).await?;
        Ok(())
    }

    /// Drops `column` from `table` when present.
    pub async fn drop_column_if_exists(&self, table: &str, column: &str) -> Result<()> {
        if !self.has_column(table, column).await? {
            warn!(table = %table, column = %column, "Column does not exist, skipping");
            return Ok(());
        }
        let columns: Vec<ColumnSnapshot> = self
            .existing_columns(table)
            .await?
            .into_iter()
            .filter(|c| c.column_name != column)
            .collect();
        self.client.alter_table(table, &columns, None).await?;
        Ok(())
    }

    /// Renames column `from` to `to` when `from` is present.
    pub async fn rename_column_if_exists(&self, table: &str, from: &str, to: &str) -> Result<()> {
        if !self.has_column(table, from).await? {
            warn!(table = %table, column = %from, "Column does not exist, skipping rename");
            return Ok(());
        }
        let columns: Vec<ColumnSnapshot> = self
            .existing_columns(table)
            .await?
            .into_iter()
            .map(|mut c| {
                if c.column_name == from {
                    c.column_name = to.to_string();
                }
                c
            })
            .collect();
        self.client.alter_table(table, &columns, None).await?;
        Ok(())
    }

    /// Current columns, each paired with itself for diffing.
    async fn existing_columns(&self, table: &str) -> Result<Vec<ColumnSnapshot>> {
        Ok(self
            .client
            .try_list_columns(table)
            .await?
            .into_iter()
            .map(ColumnSnapshot::existing)
            .collect())
    }
}
