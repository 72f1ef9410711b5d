//! Local transport over an `sqlx` Any pool.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Column, Row as _};
use tracing::debug;

use super::{BatchFailure, Row, Transport};
use crate::error::{Error, Result};

/// Runs statements on a pooled connection.
#[derive(Debug, Clone)]
pub struct LocalTransport {
    pool: AnyPool,
    url: String,
    max_connections: u32,
}

impl LocalTransport {
    /// Connects a new pool to `url`.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;
        debug!(max_connections, "Connected local pool");
        Ok(Self {
            pool,
            url: url.to_string(),
            max_connections,
        })
    }

    /// The underlying pool.
    #[must_use]
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }
}

fn decode_column(row: &AnyRow, index: usize) -> Value {
    if let Ok(value) = row.try_get::<Option<i64>, _>(index) {
        return value.map_or(Value::Null, Value::from);
    }
    if let Ok(value) = row.try_get::<Option<f64>, _>(index) {
        return value
            .and_then(serde_json::Number::from_f64)
            .map_or(Value::Null, Value::Number);
    }
    if let Ok(value) = row.try_get::<Option<String>, _>(index) {
        return value.map_or(Value::Null, Value::String);
    }
    if let Ok(value) = row.try_get::<Option<bool>, _>(index) {
        return value.map_or(Value::Null, Value::Bool);
    }
    if let Ok(value) = row.try_get::<Option<Vec<u8>>, _>(index) {
        return value.map_or(Value::Null, |bytes| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        });
    }
    Value::Null
}

fn decode_row(row: &AnyRow) -> Row {
    row.columns()
        .iter()
        .map(|column| (column.name().to_string(), decode_column(row, column.ordinal())))
        .collect()
}

#[async_trait]
impl Transport for LocalTransport {
    async fn execute(&self, sql: &str) -> Result<u64> {
        let result = sqlx::raw_sql(sql).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn fetch(&self, sql: &str) -> Result<Vec<Row>> {
        let rows = sqlx::raw_sql(sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(decode_row).collect())
    }

    async fn run_batch(&self, statements: &[String]) -> std::result::Result<Vec<Vec<Row>>, BatchFailure> {
        let mut conn = self.pool.acquire().await.map_err(|e| BatchFailure {
            index: 0,
            error: Error::Connection(e.to_string()),
        })?;
        let mut results = Vec::with_capacity(statements.len());
        for (index, sql) in statements.iter().enumerate() {
            debug!(sql = %sql, "Executing SQL");
            let rows = sqlx::Executor::fetch_all(&mut *conn, sqlx::raw_sql(sql))
                .await
                .map_err(|e| BatchFailure { index, error: e.into() })?;
            results.push(rows.iter().map(decode_row).collect());
        }
        Ok(results)
    }

    async fn reconnect(&self, database: &str) -> Result<Arc<dyn Transport>> {
        let mut url = url::Url::parse(&self.url)
            .map_err(|e| Error::Config(format!("invalid database url: {e}")))?;
        if url.scheme().starts_with("sqlite") {
            return Err(Error::Connection(
                "sqlite connections cannot switch databases".to_string(),
            ));
        }
        url.set_path(&format!("/{database}"));
        Ok(Arc::new(
            Self::connect(url.as_str(), self.max_connections).await?,
        ))
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn memory() -> LocalTransport {
        LocalTransport::connect("sqlite::memory:", 1)
            .await
            .expect("Failed to create in-memory SQLite pool")
    }

    #[tokio::test]
    async fn test_execute_and_fetch() {
        let transport = memory().await;
        transport
            .execute("CREATE TABLE t (id INTEGER, name TEXT, score REAL)")
            .await
            .unwrap();
        let affected = transport
            .execute("INSERT INTO t VALUES (1, 'a', 1.5), (2, NULL, NULL)")
            .await
            .unwrap();
        assert_eq!(affected, 2);

        let rows = transport.fetch("SELECT id, name, score FROM t ORDER BY id").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["id"], json!(1));
        assert_eq!(rows[0]["name"], json!("a"));
        assert_eq!(rows[0]["score"], json!(1.5));
        assert_eq!(rows[1]["name"], Value::Null);
    }

    #[tokio::test]
    async fn test_sqlite_cannot_reconnect() {
        let transport = memory().await;
        assert!(matches!(
            transport.reconnect("other").await,
            Err(Error::Connection(_))
        ));
    }
}
