//! Immutable result envelope returned by read-path client operations.

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::error::Error;

/// Either a payload or an error message.
///
/// Serializes to `{ "code": 0, "message": null, "data": ... }` on success and
/// `{ "code": -1, "message": "...", "data": null }` on failure.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultEnvelope<T> {
    /// Successful result.
    Ok(T),
    /// Failed result.
    Err {
        /// What went wrong.
        message: String,
    },
}

impl<T> ResultEnvelope<T> {
    /// Wraps a failure.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Err {
            message: message.into(),
        }
    }

    /// Wraps an [`Error`] as a failure.
    pub fn from_error(err: &Error) -> Self {
        Self::error(err.to_string())
    }

    /// `0` on success, `-1` on failure.
    #[must_use]
    pub const fn code(&self) -> i32 {
        match self {
            Self::Ok(_) => 0,
            Self::Err { .. } => -1,
        }
    }

    /// Returns `true` on success.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    /// The payload, if any.
    #[must_use]
    pub const fn data(&self) -> Option<&T> {
        match self {
            Self::Ok(data) => Some(data),
            Self::Err { .. } => None,
        }
    }

    /// The error message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Ok(_) => None,
            Self::Err { message } => Some(message),
        }
    }

    /// Converts into a standard `Result`.
    pub fn into_result(self) -> Result<T, String> {
        match self {
            Self::Ok(data) => Ok(data),
            Self::Err { message } => Err(message),
        }
    }

    /// Maps the payload.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ResultEnvelope<U> {
        match self {
            Self::Ok(data) => ResultEnvelope::Ok(f(data)),
            Self::Err { message } => ResultEnvelope::Err { message },
        }
    }
}

impl<T> From<crate::error::Result<T>> for ResultEnvelope<T> {
    fn from(result: crate::error::Result<T>) -> Self {
        match result {
            Ok(data) => Self::Ok(data),
            Err(err) => Self::from_error(&err),
        }
    }
}

impl<T: Serialize> Serialize for ResultEnvelope<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ResultEnvelope", 3)?;
        state.serialize_field("code", &self.code())?;
        state.serialize_field("message", &self.message())?;
        state.serialize_field("data", &self.data())?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serialize_ok() {
        let env = ResultEnvelope::Ok(vec![1, 2]);
        assert_eq!(
            serde_json::to_value(&env).unwrap(),
            json!({ "code": 0, "message": null, "data": [1, 2] })
        );
    }

    #[test]
    fn test_serialize_err() {
        let env: ResultEnvelope<u8> = ResultEnvelope::from(Err(Error::Remote("denied".into())));
        assert_eq!(env.code(), -1);
        assert_eq!(
            serde_json::to_value(&env).unwrap(),
            json!({ "code": -1, "message": "Remote executor error: denied", "data": null })
        );
    }
}
