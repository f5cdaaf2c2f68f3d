//! Error taxonomy for the interaction engine.
//!
//! The storage layer speaks `anyhow` like the rest of the binary. Anything
//! that crosses the service boundary (toward the web layer or a client
//! view) is converted into an `InteractionError` so callers can decide
//! between "ignore", "show a message" and "offer a retry".

use thiserror::Error;

/// Result type alias for service- and client-level operations.
pub type Result<T> = std::result::Result<T, InteractionError>;

#[derive(Error, Debug)]
pub enum InteractionError {
    /// Duplicate relation insert. Callers treat this as a successful no-op.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Post, comment, user or notification missing (or soft-deleted).
    #[error("{0} not found")]
    NotFound(String),

    /// Network failure between a client view and the server.
    #[error("Network error: {0}")]
    Transient(String),

    /// Rejected before any persistence (empty comment, self-targeting).
    #[error("Validation error: {0}")]
    Validation(String),

    /// The caller is authenticated but may not touch this record.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Unexpected store failure.
    #[error("Storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl InteractionError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Whether the UI should offer a retry action for this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Storage(_))
    }
}

#[cfg(feature = "web")]
impl axum::response::IntoResponse for InteractionError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let status = match &self {
            InteractionError::Conflict(_) => StatusCode::CONFLICT,
            InteractionError::NotFound(_) => StatusCode::NOT_FOUND,
            InteractionError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            InteractionError::Validation(_) => StatusCode::BAD_REQUEST,
            InteractionError::Forbidden(_) => StatusCode::FORBIDDEN,
            InteractionError::Storage(e) => {
                tracing::error!(error = %e, "Storage failure on request path");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        // Storage details stay in the logs.
        let message = match &self {
            InteractionError::Storage(_) => "Database error".to_string(),
            other => other.to_string(),
        };

        crate::web::api_error(status, &message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(InteractionError::Transient("timeout".into()).is_retryable());
        assert!(InteractionError::Storage(anyhow::anyhow!("disk full")).is_retryable());
        assert!(!InteractionError::not_found("post").is_retryable());
        assert!(!InteractionError::validation("empty comment").is_retryable());
        assert!(!InteractionError::Conflict("like".into()).is_retryable());
    }

    #[test]
    fn test_not_found_message() {
        assert_eq!(InteractionError::not_found("Post").to_string(), "Post not found");
    }
}
