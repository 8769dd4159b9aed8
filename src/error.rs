//! Error types shared by the hybrid retrieval and sparse codec modules.
//!
//! Errors fall into three categories:
//!
//! - **User** errors describe bad request or field configuration input and are
//!   reported back to the caller as-is.
//! - **Invariant** errors mean an upstream component handed over data that breaks
//!   a structural contract (a short delimited stream, a missing hybrid collector,
//!   a corrupt file). The request must fail.
//! - **Io** errors wrap storage, serialization, rescoring and clustering failures
//!   together with their cause.

use std::io;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, IrisError>;

/// Coarse classification of an [`IrisError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    User,
    Invariant,
    Io,
}

/// The crate-wide error type.
#[derive(Debug, Error)]
pub enum IrisError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Corrupt index: {0}")]
    Corrupt(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rescore failed for hybrid query: {source}")]
    Rescore {
        #[source]
        source: Box<IrisError>,
    },

    #[error("Clustering task failed: {0}")]
    ClusteringTask(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl IrisError {
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        IrisError::InvalidArgument(msg.into())
    }

    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        IrisError::InvalidConfig(msg.into())
    }

    pub fn validation(messages: Vec<String>) -> Self {
        IrisError::Validation(messages)
    }

    pub fn illegal_state<S: Into<String>>(msg: S) -> Self {
        IrisError::IllegalState(msg.into())
    }

    pub fn corrupt<S: Into<String>>(msg: S) -> Self {
        IrisError::Corrupt(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        IrisError::Internal(msg.into())
    }

    pub fn storage<S: Into<String>>(msg: S) -> Self {
        IrisError::Storage(msg.into())
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        IrisError::NotFound(msg.into())
    }

    pub fn clustering_task<S: Into<String>>(msg: S) -> Self {
        IrisError::ClusteringTask(msg.into())
    }

    pub fn other<S: Into<String>>(msg: S) -> Self {
        IrisError::Other(msg.into())
    }

    /// Wrap a failure raised while rescoring a sub-query result list.
    pub fn rescore(cause: IrisError) -> Self {
        IrisError::Rescore {
            source: Box::new(cause),
        }
    }

    /// Which side of the user/invariant divide this error belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            IrisError::InvalidArgument(_)
            | IrisError::InvalidConfig(_)
            | IrisError::Validation(_)
            | IrisError::NotFound(_) => ErrorCategory::User,
            IrisError::IllegalState(_) | IrisError::Corrupt(_) | IrisError::Internal(_) => {
                ErrorCategory::Invariant
            }
            IrisError::Storage(_)
            | IrisError::Rescore { .. }
            | IrisError::ClusteringTask(_)
            | IrisError::Io(_)
            | IrisError::Json(_)
            | IrisError::Other(_) => ErrorCategory::Io,
        }
    }

    /// Whether the error should be surfaced to the caller as bad input.
    pub fn is_user_error(&self) -> bool {
        self.category() == ErrorCategory::User
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(
            IrisError::invalid_argument("bad").category(),
            ErrorCategory::User
        );
        assert_eq!(
            IrisError::illegal_state("bug").category(),
            ErrorCategory::Invariant
        );
        assert_eq!(
            IrisError::rescore(IrisError::other("boom")).category(),
            ErrorCategory::Io
        );
        assert!(IrisError::validation(vec!["a".into()]).is_user_error());
    }

    #[test]
    fn test_validation_message_joins_all_errors() {
        let err = IrisError::validation(vec!["first".to_string(), "second".to_string()]);
        assert_eq!(err.to_string(), "Validation failed: first; second");
    }

    #[test]
    fn test_rescore_keeps_cause() {
        let err = IrisError::rescore(IrisError::storage("disk gone"));
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("Storage error: disk gone"));
    }
}
