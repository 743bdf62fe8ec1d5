use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;
use validator::Validate;

use crate::error::CoreResult;
use crate::extractors::AppJson;
use crate::models::{
    CreateOrderRequest, CreateOrderResponse, Identity, VerifyPaymentRequest,
    VerifyPaymentResponse,
};
use crate::services::payment_service::CheckoutCallback;
use crate::services::AppState;

/// POST /api/v1/payments/orders
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    AppJson(req): AppJson<CreateOrderRequest>,
) -> CoreResult<(StatusCode, Json<CreateOrderResponse>)> {
    req.validate()?;

    let identity = identity.with_contact(req.guest);
    let order = state
        .order_service()
        .create_order(&req.quiz_id, &identity)
        .await?;

    Ok((StatusCode::CREATED, Json(order)))
}

/// POST /api/v1/payments/verify
pub async fn verify_payment(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    AppJson(req): AppJson<VerifyPaymentRequest>,
) -> CoreResult<Json<VerifyPaymentResponse>> {
    req.validate()?;

    let identity = identity.with_contact(req.guest);
    let callback = CheckoutCallback {
        order_id: req.order_id,
        payment_id: req.payment_id,
        signature: req.signature,
    };

    let response = state
        .payment_service()
        .verify_payment(&callback, &identity)
        .await?;

    Ok(Json(response))
}
