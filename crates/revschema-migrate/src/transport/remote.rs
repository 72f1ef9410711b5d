//! Remote transport: statements are posted to an HTTP executor.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use super::{Row, Transport};
use crate::config::RemoteConfig;
use crate::error::{Error, Result};

/// Posts `{query, config, raw: true}` to `{db_mux}/query/{source_id}`.
#[derive(Debug, Clone)]
pub struct RemoteTransport {
    http: reqwest::Client,
    remote: RemoteConfig,
    endpoint: Url,
}

impl RemoteTransport {
    /// Creates a transport for the given executor.
    pub fn new(remote: &RemoteConfig) -> Result<Self> {
        let endpoint = Url::parse(&format!(
            "{}/query/{}",
            remote.db_mux.trim_end_matches('/'),
            remote.source_id
        ))
        .map_err(|e| Error::Config(format!("invalid db_mux '{}': {e}", remote.db_mux)))?;
        Ok(Self {
            http: reqwest::Client::new(),
            remote: remote.clone(),
            endpoint,
        })
    }

    /// The URL statements are posted to.
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn post(&self, sql: &str) -> Result<Value> {
        debug!(endpoint = %self.endpoint, "Posting statement to remote executor");
        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&json!({
                "query": sql,
                "config": self.remote.config,
                "raw": true,
            }))
            .send()
            .await?;
        let status = response.status();
        let body: Value = response.json().await?;
        check_response(status.is_success(), status.as_u16(), body)
    }
}

/// Turns an `{error}` body or a failing status into [`Error::Remote`].
fn check_response(success: bool, status: u16, body: Value) -> Result<Value> {
    if let Some(error) = body.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .or_else(|| error.as_str())
            .map_or_else(|| error.to_string(), str::to_string);
        return Err(Error::Remote(message));
    }
    if !success {
        return Err(Error::Remote(format!("executor answered with status {status}")));
    }
    Ok(body)
}

/// Extracts rows from either `{ "rows": [...] }` or a bare array.
fn rows_from(body: Value) -> Vec<Row> {
    let rows = match body {
        Value::Array(rows) => rows,
        Value::Object(mut map) => match map.remove("rows") {
            Some(Value::Array(rows)) => rows,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };
    rows.into_iter()
        .filter_map(|row| match row {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect()
}

#[async_trait]
impl Transport for RemoteTransport {
    async fn execute(&self, sql: &str) -> Result<u64> {
        let body = self.post(sql).await?;
        Ok(body.get("rowCount").and_then(Value::as_u64).unwrap_or(0))
    }

    async fn fetch(&self, sql: &str) -> Result<Vec<Row>> {
        Ok(rows_from(self.post(sql).await?))
    }

    async fn reconnect(&self, database: &str) -> Result<Arc<dyn Transport>> {
        let mut remote = self.remote.clone();
        remote
            .config
            .insert("database".to_string(), Value::String(database.to_string()));
        Ok(Arc::new(Self::new(&remote)?))
    }

    async fn close(&self) {}
}
