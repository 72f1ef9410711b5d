//! Statement transports.
//!
//! A transport runs one SQL statement at a time, either on a local `sqlx`
//! pool or by posting it to a remote executor. The client picks one at
//! construction from its configuration.

mod local;
mod remote;

pub use local::LocalTransport;
pub use remote::RemoteTransport;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{Error, Result};

/// A result row, keyed by column name.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// A batch stopped at the statement at `index`; the ones before it ran.
#[derive(Debug)]
pub struct BatchFailure {
    /// 0-based index of the failing statement.
    pub index: usize,
    /// Why it failed.
    pub error: Error,
}

/// Runs SQL against a database.
#[async_trait]
pub trait Transport: fmt::Debug + Send + Sync {
    /// Executes one statement, returning the number of affected rows.
    async fn execute(&self, sql: &str) -> Result<u64>;

    /// Executes one query and returns its rows.
    async fn fetch(&self, sql: &str) -> Result<Vec<Row>>;

    /// Runs `statements` in order as one unit of work, returning one row set
    /// per statement. Stops at the first failure.
    ///
    /// Transports that pool connections must run the whole batch on a
    /// single connection so session state (`BEGIN`, `SET`, temporary
    /// tables) carries from one statement to the next.
    async fn run_batch(&self, statements: &[String]) -> std::result::Result<Vec<Vec<Row>>, BatchFailure> {
        let mut results = Vec::with_capacity(statements.len());
        for (index, sql) in statements.iter().enumerate() {
            debug!(sql = %sql, "Executing SQL");
            let rows = self
                .fetch(sql)
                .await
                .map_err(|error| BatchFailure { index, error })?;
            results.push(rows);
        }
        Ok(results)
    }

    /// Opens a new transport to `database` on the same server.
    async fn reconnect(&self, database: &str) -> Result<Arc<dyn Transport>>;

    /// Releases the underlying connections.
    async fn close(&self);
}

/// Builds the transport described by `config`.
pub async fn connect(config: &ClientConfig) -> Result<Arc<dyn Transport>> {
    config.validate()?;
    if let Some(remote) = &config.remote {
        return Ok(Arc::new(RemoteTransport::new(remote)?));
    }
    let url = config
        .url
        .as_deref()
        .ok_or_else(|| Error::Config("missing database url".to_string()))?;
    Ok(Arc::new(LocalTransport::connect(url, config.max_connections).await?))
}
