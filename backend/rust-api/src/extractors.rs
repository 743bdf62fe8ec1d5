use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;

use crate::error::CoreError;

/// `Json` whose rejections surface as [`CoreError::InvalidRequestBody`], so malformed
/// bodies get the same `{error, message}` shape as every other API failure.
pub struct AppJson<T>(pub T);

impl<T, S> FromRequest<S> for AppJson<T>
where
    T: DeserializeOwned + 'static,
    S: Send + Sync,
{
    type Rejection = CoreError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(describe_rejection)?;
        Ok(AppJson(value))
    }
}

fn describe_rejection(rejection: JsonRejection) -> CoreError {
    let message = match &rejection {
        JsonRejection::MissingJsonContentType(_) => {
            "Expected a body with content-type application/json".to_string()
        }
        JsonRejection::JsonSyntaxError(e) => format!("Malformed JSON: {}", e.body_text()),
        JsonRejection::JsonDataError(e) => format!("Unexpected body shape: {}", e.body_text()),
        other => other.body_text(),
    };
    tracing::debug!(status = %rejection.status(), "Rejected request body: {}", message);
    CoreError::InvalidRequestBody(message)
}
