//! Error types for schema edits and the migration sequencer.

use revschema_core::SynthError;

/// Errors raised while executing schema edits or running migrations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Could not reach or authenticate with the database.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The dialect cannot express the requested operation.
    #[error("Unsupported operation for {dialect}: {operation}")]
    UnsupportedOperation {
        /// Dialect name.
        dialect: String,
        /// Description of the operation.
        operation: String,
    },

    /// The requested column changes are ambiguous.
    #[error("Conflicting change for column '{column}': {reason}")]
    DiffConflict {
        /// Column the conflict was detected on.
        column: String,
        /// Why the change cannot be expressed.
        reason: String,
    },

    /// DDL synthesis failed for another reason.
    #[error("Synthesis error: {0}")]
    Synthesis(SynthError),

    /// A statement failed; statements after it were not run.
    #[error(
        "Statement {failed_index} failed after {} succeeded: {message}\n{failed_sql}",
        .executed.len()
    )]
    Execution {
        /// 0-based index of the failing statement.
        failed_index: usize,
        /// The failing statement.
        failed_sql: String,
        /// Statements that ran before the failure, in order.
        executed: Vec<String>,
        /// Driver error message.
        message: String,
    },

    /// A migration unit failed; the sequencer stopped.
    #[error("Migration '{name}' failed: {source}")]
    MigrationSequence {
        /// Name of the failing unit.
        name: String,
        /// The underlying failure.
        #[source]
        source: Box<Error>,
    },

    /// Database driver error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote executor answered with an error body.
    #[error("Remote executor error: {0}")]
    Remote(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error (reading configuration files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed TOML configuration.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid sequencer or ledger state.
    #[error("Invalid migration state: {0}")]
    InvalidState(String),
}

impl From<SynthError> for Error {
    fn from(err: SynthError) -> Self {
        match err {
            SynthError::Unsupported { dialect, operation } => Self::UnsupportedOperation {
                dialect: dialect.to_string(),
                operation,
            },
            SynthError::DiffConflict { column, reason } => Self::DiffConflict { column, reason },
            other => Self::Synthesis(other),
        }
    }
}

/// Result type for schema edits and migrations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synth_errors_map_onto_taxonomy() {
        let err: Error = SynthError::Unsupported {
            dialect: "sqlite",
            operation: "sequences".into(),
        }
        .into();
        assert!(matches!(err, Error::UnsupportedOperation { ref dialect, .. } if dialect == "sqlite"));

        let err: Error = SynthError::InvalidSpec("empty".into()).into();
        assert!(matches!(err, Error::Synthesis(SynthError::InvalidSpec(_))));
    }

    #[test]
    fn test_migration_sequence_message() {
        let err = Error::MigrationSequence {
            name: "0002_sources".into(),
            source: Box::new(Error::InvalidState("boom".into())),
        };
        assert_eq!(
            err.to_string(),
            "Migration '0002_sources' failed: Invalid migration state: boom"
        );
    }
}
