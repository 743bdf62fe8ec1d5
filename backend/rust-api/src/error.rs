use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failures of the payment-gated quiz pipeline. Every variant is detected before any
/// state is written, so callers can surface them without worrying about partial writes.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Quiz not found")]
    QuizNotFound,

    #[error("Quiz is not active")]
    QuizInactive,

    #[error("Quiz already paid for")]
    AlreadyPaid,

    #[error("A payment for this quiz is already in progress")]
    PaymentInProgress,

    #[error("Failed to create payment order")]
    OrderCreationFailed,

    #[error("Invalid payment signature")]
    InvalidSignature,

    #[error("Payment record not found")]
    PaymentRecordNotFound,

    #[error("Invalid or unpaid quiz access")]
    PaymentRequired,

    #[error("Invalid answers format")]
    InvalidAnswersFormat,

    #[error("Quiz already submitted")]
    AlreadySubmitted,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid request body: {0}")]
    InvalidRequestBody(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Stable machine-readable code returned next to the human message.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::QuizNotFound => "quiz_not_found",
            Self::QuizInactive => "quiz_inactive",
            Self::AlreadyPaid => "already_paid",
            Self::PaymentInProgress => "payment_in_progress",
            Self::OrderCreationFailed => "order_creation_failed",
            Self::InvalidSignature => "invalid_signature",
            Self::PaymentRecordNotFound => "payment_record_not_found",
            Self::PaymentRequired => "payment_required",
            Self::InvalidAnswersFormat => "invalid_answers_format",
            Self::AlreadySubmitted => "already_submitted",
            Self::Validation(_) => "validation_error",
            Self::InvalidRequestBody(_) => "invalid_request_body",
            Self::Internal(_) => "internal_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::QuizNotFound | Self::PaymentRecordNotFound => StatusCode::NOT_FOUND,
            Self::QuizInactive
            | Self::AlreadyPaid
            | Self::PaymentInProgress
            | Self::AlreadySubmitted => StatusCode::CONFLICT,
            Self::OrderCreationFailed => StatusCode::BAD_GATEWAY,
            Self::InvalidSignature
            | Self::InvalidAnswersFormat
            | Self::Validation(_)
            | Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::PaymentRequired => StatusCode::PAYMENT_REQUIRED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<crate::repository::RepositoryError> for CoreError {
    fn from(err: crate::repository::RepositoryError) -> Self {
        CoreError::Internal(err.to_string())
    }
}

impl From<validator::ValidationErrors> for CoreError {
    fn from(err: validator::ValidationErrors) -> Self {
        CoreError::Validation(err.to_string())
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // Storage details stay in the logs
        let message = match &self {
            CoreError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (
            status,
            Json(json!({
                "error": self.code(),
                "message": message,
            })),
        )
            .into_response()
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(CoreError::Unauthenticated.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(CoreError::PaymentRequired.status_code(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(CoreError::AlreadySubmitted.status_code(), StatusCode::CONFLICT);
        assert_eq!(CoreError::InvalidSignature.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(CoreError::OrderCreationFailed.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_internal_detail_is_not_exposed() {
        let response = CoreError::Internal("mongo exploded".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
