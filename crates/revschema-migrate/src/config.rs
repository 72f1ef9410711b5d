//! Client configuration, loaded from TOML.
//!
//! ```toml
//! dialect = "postgres"
//! url = "postgres://app@localhost/app"
//! schema = "public"
//! max_connections = 5
//!
//! [remote]
//! db_mux = "https://mux.internal"
//! source_id = "src_123"
//! ```

use std::path::Path;

use revschema_core::DialectKind;
use serde::Deserialize;

use crate::error::{Error, Result};

fn default_max_connections() -> u32 {
    5
}

/// Remote executor settings. When present, statements are posted to
/// `{db_mux}/query/{source_id}` instead of running on a local pool.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the remote executor.
    pub db_mux: String,
    /// Source identifier passed in the request path.
    pub source_id: String,
    /// Extra connection settings forwarded verbatim as `config`.
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
}

/// Connection and dialect settings for a [`SqlClient`](crate::client::SqlClient).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClientConfig {
    /// SQL dialect.
    pub dialect: DialectKind,
    /// Connection URL for the local pool.
    #[serde(default)]
    pub url: Option<String>,
    /// Schema to introspect; the dialect default when unset.
    #[serde(default)]
    pub schema: Option<String>,
    /// Local pool size.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Remote executor, used instead of `url` when set.
    #[serde(default)]
    pub remote: Option<RemoteConfig>,
}

impl ClientConfig {
    /// Creates a local configuration.
    #[must_use]
    pub fn new(dialect: DialectKind, url: impl Into<String>) -> Self {
        Self {
            dialect,
            url: Some(url.into()),
            schema: None,
            max_connections: default_max_connections(),
            remote: None,
        }
    }

    /// Sets the schema.
    #[must_use]
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Sets the local pool size.
    #[must_use]
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Schema to introspect.
    #[must_use]
    pub fn effective_schema(&self) -> String {
        self.schema
            .clone()
            .unwrap_or_else(|| self.dialect.strategy().default_schema().to_string())
    }

    /// Checks that exactly one way of reaching the database is configured.
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(Error::Config("max_connections must be at least 1".to_string()));
        }
        match (&self.url, &self.remote) {
            (None, None) => Err(Error::Config(
                "either `url` or a `[remote]` section is required".to_string(),
            )),
            (_, Some(remote)) => {
                url::Url::parse(&remote.db_mux)
                    .map_err(|e| Error::Config(format!("invalid db_mux '{}': {e}", remote.db_mux)))?;
                if remote.source_id.trim().is_empty() {
                    return Err(Error::Config("remote source_id is empty".to_string()));
                }
                Ok(())
            }
            (Some(_), None) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_local() {
        let config = ClientConfig::from_toml_str(
            r#"
            dialect = "sqlite"
            url = "sqlite::memory:"
            "#,
        )
        .unwrap();
        assert_eq!(config.dialect, DialectKind::Sqlite);
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.effective_schema(), "main");
    }

    #[test]
    fn test_parse_remote_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            dialect = "databricks"
            schema = "analytics"

            [remote]
            db_mux = "https://mux.example.com"
            source_id = "src_1"

            [remote.config]
            warehouse = "w1"
            "#
        )
        .unwrap();
        let config = ClientConfig::from_file(file.path()).unwrap();
        let remote = config.remote.unwrap();
        assert_eq!(remote.source_id, "src_1");
        assert_eq!(remote.config["warehouse"], "w1");
        assert_eq!(config.schema.as_deref(), Some("analytics"));
    }

    #[test]
    fn test_missing_target_is_rejected() {
        let err = ClientConfig::from_toml_str(r#"dialect = "postgres""#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_bad_mux_url_is_rejected() {
        let err = ClientConfig::from_toml_str(
            r#"
            dialect = "postgres"
            [remote]
            db_mux = "not a url"
            source_id = "x"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
