//! Error type shared by every back-office operation.
//!
//! Upstream failures (network, HTTP status, SQLite) are surfaced unchanged to
//! the caller. Nothing in this crate retries.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Caller supplied a value the operation refuses to store.
    #[error("{0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The record exists but is not in a state that allows the request.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not authorized: {0}")]
    Unauthorized(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// Transport-level failure talking to the hosted backend.
    #[error("{0}")]
    Network(String),

    /// Non-success HTTP response from the hosted backend.
    #[error("backend error (HTTP {status}): {message}")]
    Backend { status: u16, message: String },

    #[error("database lock poisoned")]
    LockPoisoned,

    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// True for errors produced by the data-access boundary rather than by
    /// business rules.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Error::Network(_)
                | Error::Backend { .. }
                | Error::LockPoisoned
                | Error::Sqlite(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message_names_entity() {
        let err = Error::not_found("cash cut", "cut-9");
        assert_eq!(err.to_string(), "cash cut not found: cut-9");
        assert!(!err.is_upstream());
    }

    #[test]
    fn test_backend_error_is_upstream() {
        let err = Error::Backend {
            status: 503,
            message: "service unavailable".into(),
        };
        assert!(err.is_upstream());
        assert_eq!(
            err.to_string(),
            "backend error (HTTP 503): service unavailable"
        );
    }
}
