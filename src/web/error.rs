//! HTTP mapping of [`Error`].

use crate::errors::Error;
use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

impl Error {
    /// HTTP status and stable machine-readable code for this error.
    #[must_use]
    pub const fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Validation { .. } => (StatusCode::BAD_REQUEST, "validation_error"),
            Self::InvalidAmount { .. } => (StatusCode::BAD_REQUEST, "invalid_amount"),
            Self::CommentRequired => (StatusCode::BAD_REQUEST, "comment_required"),
            Self::Import { .. } | Self::Csv(_) => (StatusCode::BAD_REQUEST, "import_error"),
            Self::InvalidCredentials => (StatusCode::UNAUTHORIZED, "invalid_credentials"),
            Self::Unauthenticated => (StatusCode::UNAUTHORIZED, "unauthenticated"),
            Self::Forbidden { .. } => (StatusCode::FORBIDDEN, "forbidden"),
            Self::StudentNotFound { .. } => (StatusCode::NOT_FOUND, "student_not_found"),
            Self::TransactionNotFound { .. } => (StatusCode::NOT_FOUND, "transaction_not_found"),
            Self::UserNotFound { .. } => (StatusCode::NOT_FOUND, "user_not_found"),
            Self::InsufficientBalance { .. } => (StatusCode::CONFLICT, "insufficient_balance"),
            Self::NotEditable { .. } => (StatusCode::CONFLICT, "not_editable"),
            Self::Database(_) | Self::Config { .. } | Self::PasswordHash { .. } | Self::Io(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        }
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl From<PathRejection> for Error {
    fn from(rejection: PathRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl From<QueryRejection> for Error {
    fn from(rejection: QueryRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = if status.is_server_error() {
            error!(error = %self, "Request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        (
            status,
            Json(json!({
                "success": false,
                "error": message,
                "code": code,
            })),
        )
            .into_response()
    }
}
