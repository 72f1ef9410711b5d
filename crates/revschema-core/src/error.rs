//! Error types for DDL synthesis.

/// Errors raised while classifying changes or synthesizing DDL.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SynthError {
    /// A query template and its arguments disagree on the placeholder count.
    #[error("Query template expects {placeholders} argument(s) but {args} were supplied: {template}")]
    PlaceholderMismatch {
        /// The template being expanded.
        template: String,
        /// Number of `?`/`??` placeholders in the template.
        placeholders: usize,
        /// Number of arguments supplied.
        args: usize,
    },

    /// The logical or native type is not known to the dialect.
    #[error("Unsupported data type for {dialect}: {data_type}")]
    UnsupportedType {
        /// Dialect name.
        dialect: &'static str,
        /// The offending type.
        data_type: String,
    },

    /// The dialect cannot express the requested change.
    #[error("{dialect} does not support {operation}")]
    Unsupported {
        /// Dialect name.
        dialect: &'static str,
        /// Human readable description of the operation.
        operation: String,
    },

    /// The change classification is ambiguous or inconsistent.
    #[error("Conflicting change for column '{column}': {reason}")]
    DiffConflict {
        /// Column the conflict was detected on.
        column: String,
        /// Why the change cannot be expressed.
        reason: String,
    },

    /// A table or column specification is malformed.
    #[error("Invalid specification: {0}")]
    InvalidSpec(String),
}

impl SynthError {
    pub(crate) fn unsupported(dialect: &'static str, operation: impl Into<String>) -> Self {
        Self::Unsupported {
            dialect,
            operation: operation.into(),
        }
    }
}

/// Result type for synthesis operations.
pub type Result<T> = std::result::Result<T, SynthError>;
