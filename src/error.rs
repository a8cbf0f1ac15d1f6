use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use thiserror::Error;
use tracing::error;

impl From<serde_json::Error> for GovernanceError {
    fn from(err: serde_json::Error) -> Self {
        Self::ValidationError(format!("JSON serialization error: {}", err))
    }
}

impl From<sqlx::Error> for GovernanceError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("Row not found".to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Self::Conflict(format!("Duplicate record: {}", db_err.message()))
            }
            other => Self::DatabaseError(format!("Database error: {}", other)),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for GovernanceError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::DatabaseError(format!("Migration failed: {}", err))
    }
}

#[derive(Error, Debug)]
pub enum GovernanceError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid transition for {kind}: {from} -> {to}")]
    InvalidTransition {
        kind: &'static str,
        from: String,
        to: String,
    },

    #[error("Quorum not met: {present} present, {required} required")]
    QuorumNotMet { present: usize, required: usize },

    #[error("Cryptographic error: {0}")]
    CryptoError(String),

    #[error("Signature verification failed: {0}")]
    SignatureError(String),
}

impl GovernanceError {
    pub fn not_found(kind: &str, id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{} {} does not exist", kind, id))
    }

    pub fn invalid_transition(
        kind: &'static str,
        from: impl std::fmt::Display,
        to: impl std::fmt::Display,
    ) -> Self {
        Self::InvalidTransition {
            kind,
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::AuthError(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Conflict(_) | Self::InvalidTransition { .. } | Self::QuorumNotMet { .. } => {
                StatusCode::CONFLICT
            }
            Self::ValidationError(_) | Self::SignatureError(_) | Self::CryptoError(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::ConfigError(_) | Self::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GovernanceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            GovernanceError::not_found("Board", 7).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            GovernanceError::invalid_transition("meeting", "adjourned", "in_session").status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            GovernanceError::QuorumNotMet {
                present: 1,
                required: 3
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            GovernanceError::Forbidden("nope".to_string()).status_code(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_transition_message() {
        let err = GovernanceError::invalid_transition("minutes", "finalized", "draft");
        assert_eq!(
            err.to_string(),
            "Invalid transition for minutes: finalized -> draft"
        );
    }
}
