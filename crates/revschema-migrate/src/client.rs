//! The SQL client: schema edits and introspection against one database.
//!
//! Read-path operations never fail outright; they return a
//! [`ResultEnvelope`] carrying either the data or an error message.
//! Mutations synthesize a [`ReversibleStatementSet`], execute its forward
//! list, hand it to the audit sink and return it so callers can keep the
//! reverse list.

use std::sync::Arc;

use revschema_core::{
    ColumnSnapshot, DialectKind, DialectStrategy, IndexSnapshot, IndexSpec, RelationSpec,
    ReversibleBuilder, ReversibleStatementSet, TableSpec, TriggerSpec, ViewSnapshot,
};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::audit::{AuditSink, TracingAuditSink};
use crate::config::ClientConfig;
use crate::engine::{self, RawQueryResult};
use crate::envelope::ResultEnvelope;
use crate::error::{Error, Result};
use crate::introspect::{self, RowExt};
use crate::transport::{self, Row, Transport};

/// Parsed server version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerVersion {
    /// Version string as reported by the server.
    pub version: String,
    /// First component.
    pub primary: String,
    /// Second component.
    pub major: String,
    /// Third component, or the second when there are only two.
    pub minor: String,
    /// `primary` followed by `major`.
    pub key: String,
}

impl ServerVersion {
    /// Parses `16.2` or `3.45.1`. Anything after the first space is ignored.
    pub fn parse(version: &str) -> Result<Self> {
        let version = version.split_whitespace().next().unwrap_or_default();
        let parts: Vec<&str> = version.split('.').collect();
        if !(parts.len() == 2 || parts.len() == 3) || parts.iter().any(|p| p.is_empty()) {
            return Err(Error::InvalidState(format!("Invalid version : {version}")));
        }
        Ok(Self {
            version: version.to_string(),
            primary: parts[0].to_string(),
            major: parts[1].to_string(),
            minor: parts.get(2).unwrap_or(&parts[1]).to_string(),
            key: format!("{}{}", parts[0], parts[1]),
        })
    }
}

/// Dialect-neutral client for one database.
#[derive(Debug)]
pub struct SqlClient {
    transport: RwLock<Arc<dyn Transport>>,
    dialect: &'static dyn DialectStrategy,
    schema: String,
    audit: Arc<dyn AuditSink>,
}

fn envelope<T>(operation: &str, result: Result<T>) -> ResultEnvelope<T> {
    if let Err(e) = &result {
        warn!(operation, error = %e, "Read operation failed");
    }
    result.into()
}

impl SqlClient {
    /// Connects using `config`.
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        let transport = transport::connect(config).await?;
        Ok(Self::with_transport(
            transport,
            config.dialect,
            Some(config.effective_schema()),
        ))
    }

    /// Wraps an existing transport.
    #[must_use]
    pub fn with_transport(
        transport: Arc<dyn Transport>,
        dialect: DialectKind,
        schema: Option<String>,
    ) -> Self {
        let dialect = dialect.strategy();
        Self {
            transport: RwLock::new(transport),
            dialect,
            schema: schema.unwrap_or_else(|| dialect.default_schema().to_string()),
            audit: Arc::new(TracingAuditSink),
        }
    }

    /// Replaces the audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// The dialect statements are rendered with.
    #[must_use]
    pub fn dialect(&self) -> &'static dyn DialectStrategy {
        self.dialect
    }

    /// The schema introspection runs against.
    #[must_use]
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// The transport currently in use.
    pub async fn transport(&self) -> Arc<dyn Transport> {
        self.transport.read().await.clone()
    }

    /// Releases the transport's connections.
    pub async fn close(&self) {
        self.transport().await.close().await;
    }

    fn builder(&self) -> ReversibleBuilder<'static> {
        ReversibleBuilder::new(self.dialect)
    }

    async fn fetch(&self, sql: revschema_core::Result<String>) -> Result<Vec<Row>> {
        let sql = sql?;
        debug!(sql = %sql, "Executing SQL");
        self.transport().await.fetch(&sql).await
    }

    /// Executes the forward list and records the set.
    async fn apply(
        &self,
        operation: &str,
        set: ReversibleStatementSet,
    ) -> Result<ResultEnvelope<ReversibleStatementSet>> {
        let transport = self.transport().await;
        engine::execute_statements(transport.as_ref(), &set.up).await?;
        self.audit.record(operation, &set);
        Ok(ResultEnvelope::Ok(set))
    }

    // ================================================================
    // Introspection
    // ================================================================

    pub(crate) async fn try_list_columns(&self, table: &str) -> Result<Vec<ColumnSnapshot>> {
        let rows = self.fetch(self.dialect.columns_query(&self.schema, table)).await?;
        let mut columns = introspect::map_columns(&rows);
        for column in &mut columns {
            if column.table_name.is_empty() {
                column.table_name = table.to_string();
            }
        }
        Ok(columns)
    }

    async fn try_list_relations(&self, table: &str) -> Result<Vec<RelationSpec>> {
        let rows = self.fetch(self.dialect.relations_query(&self.schema, table)).await?;
        Ok(introspect::map_relations(&rows))
    }

    async fn try_list_indexes(&self, table: &str) -> Result<Vec<IndexSnapshot>> {
        let rows = self.fetch(self.dialect.indexes_query(&self.schema, table)).await?;
        Ok(introspect::map_indexes(&rows))
    }

    async fn try_list_views(&self) -> Result<Vec<ViewSnapshot>> {
        let rows = self.fetch(self.dialect.views_query(&self.schema)).await?;
        Ok(introspect::map_views(&rows))
    }

    pub(crate) async fn try_list_tables(&self) -> Result<Vec<String>> {
        let rows = self.fetch(self.dialect.tables_query(&self.schema)).await?;
        Ok(introspect::map_tables(&rows))
    }

    async fn try_server_version(&self) -> Result<ServerVersion> {
        let rows = self.fetch(Ok(self.dialect.server_version_query().to_string())).await?;
        let version = rows
            .first()
            .and_then(|row| row.text("server_version"))
            .ok_or_else(|| Error::InvalidState("server version query returned no rows".into()))?;
        ServerVersion::parse(&version)
    }

    /// Columns of `table` in ordinal order.
    pub async fn list_columns(&self, table: &str) -> ResultEnvelope<Vec<ColumnSnapshot>> {
        envelope("list_columns", self.try_list_columns(table).await)
    }

    /// Foreign keys declared on `table`, one entry per column.
    pub async fn list_relations(&self, table: &str) -> ResultEnvelope<Vec<RelationSpec>> {
        envelope("list_relations", self.try_list_relations(table).await)
    }

    /// Index entries of `table`, one per indexed column.
    pub async fn list_indexes(&self, table: &str) -> ResultEnvelope<Vec<IndexSnapshot>> {
        envelope("list_indexes", self.try_list_indexes(table).await)
    }

    /// Primary key and unique constraints of `table`, one entry per column.
    pub async fn list_constraints(&self, table: &str) -> ResultEnvelope<Vec<IndexSnapshot>> {
        let result = self
            .fetch(self.dialect.constraints_query(&self.schema, table))
            .await
            .map(|rows| introspect::map_constraints(&rows));
        envelope("list_constraints", result)
    }

    /// Views in the schema.
    pub async fn list_views(&self) -> ResultEnvelope<Vec<ViewSnapshot>> {
        envelope("list_views", self.try_list_views().await)
    }

    /// Base tables in the schema.
    pub async fn list_tables(&self) -> ResultEnvelope<Vec<String>> {
        envelope("list_tables", self.try_list_tables().await)
    }

    /// Returns `true` if `table` exists in the schema.
    pub async fn has_table(&self, table: &str) -> Result<bool> {
        Ok(self.try_list_tables().await?.iter().any(|t| t == table))
    }

    /// Returns `true` if `table` has a column named `column`.
    pub async fn has_column(&self, table: &str, column: &str) -> Result<bool> {
        Ok(self
            .try_list_columns(table)
            .await?
            .iter()
            .any(|c| c.column_name == column))
    }

    /// Runs the dialect's connection check query.
    pub async fn test_connection(&self) -> ResultEnvelope<()> {
        let result = self
            .fetch(Ok(self.dialect.connection_check_query().to_string()))
            .await
            .map(|_| ());
        envelope("test_connection", result)
    }

    /// Reads and parses the server version.
    pub async fn server_version(&self) -> ResultEnvelope<ServerVersion> {
        envelope("server_version", self.try_server_version().await)
    }

    /// Splits and runs a raw SQL script.
    pub async fn execute_raw_query(&self, sql: &str) -> Result<RawQueryResult> {
        engine::execute_raw_query(self.transport().await.as_ref(), sql).await
    }

    // ================================================================
    // Tables
    // ================================================================

    /// Creates a table.
    pub async fn create_table(&self, spec: &TableSpec) -> Result<ResultEnvelope<ReversibleStatementSet>> {
        info!(table = %spec.table_name, "Creating table");
        spec.validate()?;
        let set = self.builder().create_table(spec)?;
        self.apply("create_table", set).await
    }

    /// Applies column changes to `table`.
    ///
    /// `new` columns are matched to `old` by `original_name`. When `old` is
    /// `None` the current columns are read from the catalog.
    pub async fn alter_table(
        &self,
        table: &str,
        new: &[ColumnSnapshot],
        old: Option<&[ColumnSnapshot]>,
    ) -> Result<ResultEnvelope<ReversibleStatementSet>> {
        info!(table = %table, "Altering table");
        let introspected;
        let old = match old {
            Some(old) => old,
            None => {
                introspected = self.try_list_columns(table).await?;
                introspected.as_slice()
            }
        };
        let set = self.builder().alter_table(table, old, new)?;
        if set.is_empty() {
            warn!(table = %table, "No column changes, nothing to apply");
            return Ok(ResultEnvelope::Ok(set));
        }
        self.apply("alter_table", set).await
    }

    /// Drops a table. The reverse list recreates its columns, foreign keys
    /// and secondary indexes as read from the catalog.
    pub async fn drop_table(&self, table: &str) -> Result<ResultEnvelope<ReversibleStatementSet>> {
        info!(table = %table, "Dropping table");
        let columns = self.try_list_columns(table).await?;
        if columns.is_empty() {
            return Err(Error::InvalidState(format!("table '{table}' does not exist")));
        }
        let spec = columns
            .into_iter()
            .fold(TableSpec::new(table), TableSpec::column);
        let relations = self.try_list_relations(table).await?;
        let indexes = self.try_list_indexes(table).await?;
        let set = self.builder().drop_table(&spec, &relations, &indexes)?;
        self.apply("drop_table", set).await
    }

    /// Renames a table.
    pub async fn rename_table(&self, from: &str, to: &str) -> Result<ResultEnvelope<ReversibleStatementSet>> {
        info!(from = %from, to = %to, "Renaming table");
        let set = self.builder().rename_table(from, to)?;
        self.apply("rename_table", set).await
    }

    // ================================================================
    // Views, triggers and sequences
    // ================================================================

    async fn find_view(&self, name: &str) -> Result<ViewSnapshot> {
        self.try_list_views()
            .await?
            .into_iter()
            .find(|v| v.view_name == name)
            .ok_or_else(|| Error::InvalidState(format!("view '{name}' does not exist")))
    }

    /// Creates a view.
    pub async fn create_view(&self, view: &ViewSnapshot) -> Result<ResultEnvelope<ReversibleStatementSet>> {
        info!(view = %view.view_name, "Creating view");
        let set = self.builder().create_view(view)?;
        self.apply("create_view", set).await
    }

    /// Replaces the definition of an existing view.
    pub async fn update_view(&self, view: &ViewSnapshot) -> Result<ResultEnvelope<ReversibleStatementSet>> {
        info!(view = %view.view_name, "Updating view");
        let old = self.find_view(&view.view_name).await?;
        let set = self.builder().update_view(&old, view)?;
        self.apply("update_view", set).await
    }

    /// Drops a view. The reverse list recreates it from the catalog definition.
    pub async fn drop_view(&self, name: &str) -> Result<ResultEnvelope<ReversibleStatementSet>> {
        info!(view = %name, "Dropping view");
        let old = self.find_view(name).await?;
        let set = self.builder().drop_view(&old)?;
        self.apply("drop_view", set).await
    }

    /// Creates a trigger.
    pub async fn create_trigger(&self, trigger: &TriggerSpec) -> Result<ResultEnvelope<ReversibleStatementSet>> {
        info!(trigger = %trigger.trigger_name, table = %trigger.table_name, "Creating trigger");
        let set = self.builder().create_trigger(trigger)?;
        self.apply("create_trigger", set).await
    }

    /// Replaces `old` with `new`.
    pub async fn update_trigger(
        &self,
        old: &TriggerSpec,
        new: &TriggerSpec,
    ) -> Result<ResultEnvelope<ReversibleStatementSet>> {
        info!(trigger = %new.trigger_name, table = %new.table_name, "Updating trigger");
        let set = self.builder().update_trigger(old, new)?;
        self.apply("update_trigger", set).await
    }

    /// Drops a trigger.
    pub async fn drop_trigger(&self, trigger: &TriggerSpec) -> Result<ResultEnvelope<ReversibleStatementSet>> {
        info!(trigger = %trigger.trigger_name, table = %trigger.table_name, "Dropping trigger");
        let set = self.builder().drop_trigger(trigger)?;
        self.apply("drop_trigger", set).await
    }

    /// Creates a sequence.
    pub async fn create_sequence(
        &self,
        name: &str,
        start: Option<i64>,
    ) -> Result<ResultEnvelope<ReversibleStatementSet>> {
        info!(sequence = %name, "Creating sequence");
        let set = self.builder().create_sequence(name, start)?;
        self.apply("create_sequence", set).await
    }

    /// Drops a sequence.
    pub async fn drop_sequence(&self, name: &str) -> Result<ResultEnvelope<ReversibleStatementSet>> {
        info!(sequence = %name, "Dropping sequence");
        let set = self.builder().drop_sequence(name)?;
        self.apply("drop_sequence", set).await
    }

    /// Renames a sequence.
    pub async fn rename_sequence(&self, from: &str, to: &str) -> Result<ResultEnvelope<ReversibleStatementSet>> {
        info!(from = %from, to = %to, "Renaming sequence");
        let set = self.builder().rename_sequence(from, to)?;
        self.apply("rename_sequence", set).await
    }

    // ================================================================
    // Indexes and relations
    // ================================================================

    /// Creates an index.
    pub async fn create_index(&self, index: &IndexSpec) -> Result<ResultEnvelope<ReversibleStatementSet>> {
        info!(index = %index.index_name, table = %index.table_name, "Creating index");
        let set = self.builder().create_index(index)?;
        self.apply("create_index", set).await
    }

    /// Drops an index.
    pub async fn drop_index(&self, index: &IndexSpec) -> Result<ResultEnvelope<ReversibleStatementSet>> {
        info!(index = %index.index_name, table = %index.table_name, "Dropping index");
        let set = self.builder().drop_index(index)?;
        self.apply("drop_index", set).await
    }

    /// Adds a foreign key made of `parts` (one entry per column).
    pub async fn create_relation(&self, parts: &[RelationSpec]) -> Result<ResultEnvelope<ReversibleStatementSet>> {
        let first = parts
            .first()
            .ok_or_else(|| Error::InvalidState("relation has no columns".into()))?;
        info!(
            child = %first.child_table,
            parent = %first.parent_table,
            "Creating relation"
        );
        let set = self.builder().create_relation(parts)?;
        self.apply("create_relation", set).await
    }

    /// Drops a foreign key made of `parts`.
    pub async fn drop_relation(&self, parts: &[RelationSpec]) -> Result<ResultEnvelope<ReversibleStatementSet>> {
        let first = parts
            .first()
            .ok_or_else(|| Error::InvalidState("relation has no columns".into()))?;
        info!(
            child = %first.child_table,
            parent = %first.parent_table,
            "Dropping relation"
        );
        let set = self.builder().drop_relation(parts)?;
        self.apply("drop_relation", set).await
    }

    // ================================================================
    // Databases
    // ================================================================

    /// Creates a database on the connected server.
    pub async fn create_database(&self, name: &str) -> Result<ResultEnvelope<ReversibleStatementSet>> {
        info!(database = %name, "Creating database");
        let mut set = ReversibleStatementSet::new();
        set.push(
            [self.dialect.synthesize_create_database(name)?],
            [self.dialect.synthesize_drop_database(name)?],
        );
        self.apply("create_database", set).await
    }

    /// First phase of dropping a database: switches this client to the
    /// dialect's maintenance database and cuts other sessions off `name`.
    ///
    /// Does nothing for dialects without a maintenance database.
    pub async fn detach_from_database(&self, name: &str) -> Result<()> {
        let Some(maintenance) = self.dialect.maintenance_database() else {
            debug!(database = %name, "Dialect has no maintenance database, skipping detach");
            return Ok(());
        };
        let statements = self.dialect.synthesize_detach_sessions(name)?;
        let replacement = {
            let mut guard = self.transport.write().await;
            let replacement = guard.reconnect(maintenance).await?;
            let previous = std::mem::replace(&mut *guard, Arc::clone(&replacement));
            previous.close().await;
            replacement
        };
        info!(database = %name, maintenance = %maintenance, "Detaching sessions");
        engine::execute_statements(replacement.as_ref(), &statements).await?;
        Ok(())
    }

    /// Drops a database: detaches first, then runs `DROP DATABASE`.
    pub async fn drop_database(&self, name: &str) -> Result<ResultEnvelope<ReversibleStatementSet>> {
        info!(database = %name, "Dropping database");
        let mut set = ReversibleStatementSet::new();
        set.push(
            [self.dialect.synthesize_drop_database(name)?],
            [self.dialect.synthesize_create_database(name)?],
        );
        self.detach_from_database(name).await?;
        self.apply("drop_database", set).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::transport::LocalTransport;

    async fn client() -> SqlClient {
        let transport = LocalTransport::connect("sqlite::memory:", 1)
            .await
            .expect("Failed to create in-memory SQLite pool");
        SqlClient::with_transport(Arc::new(transport), DialectKind::Sqlite, None)
    }

    #[test]
    fn test_parse_version() {
        let version = ServerVersion::parse("16.2 (Debian 16.2-1.pgdg120+2)").unwrap();
        assert_eq!(version.primary, "16");
        assert_eq!(version.major, "2");
        assert_eq!(version.minor, "2");
        assert_eq!(version.key, "162");

        let version = ServerVersion::parse("3.45.1").unwrap();
        assert_eq!(version.minor, "1");

        assert!(ServerVersion::parse("nightly").is_err());
    }

    #[tokio::test]
    async fn test_connection_check_and_version() {
        let client = client().await;
        assert!(client.test_connection().await.is_ok());
        let version = client.server_version().await;
        assert_eq!(version.data().map(|v| v.primary.as_str()), Some("3"));
    }

    #[tokio::test]
    async fn test_raw_query_error_and_empty_views() {
        let client = client().await;
        let result = client.execute_raw_query("SELEC nonsense").await;
        assert!(result.is_err());

        let views = client.list_views().await;
        assert!(views.is_ok());
        assert!(views.data().is_some_and(Vec::is_empty));
    }

    #[tokio::test]
    async fn test_create_table_is_audited() {
        let sink = Arc::new(MemoryAuditSink::new());
        let client = client().await.with_audit(sink.clone());
        let spec = TableSpec::new("books")
            .column(ColumnSnapshot::new("books", "id", "integer").primary_key().auto_increment())
            .column(ColumnSnapshot::new("books", "title", "string").not_null());

        let set = client.create_table(&spec).await.unwrap();
        assert!(set.is_ok());
        assert!(client.has_table("books").await.unwrap());
        assert!(client.has_column("books", "title").await.unwrap());
        assert!(!client.has_column("books", "author").await.unwrap());
        assert_eq!(sink.entries()[0].0, "create_table");
    }

    #[tokio::test]
    async fn test_sqlite_cannot_drop_database() {
        let client = client().await;
        let err = client.drop_database("other").await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedOperation { .. }));
    }
}
