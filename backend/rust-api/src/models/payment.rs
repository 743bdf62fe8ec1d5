use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::identity::GuestContact;
use super::{bson_datetime_as_chrono, bson_datetime_as_chrono_option};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Success => "success",
            PaymentStatus::Failed => "failed",
        }
    }
}

/// Payment record stored in MongoDB "payments" collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    #[serde(rename = "_id")]
    pub id: String,
    pub quiz_id: String,
    /// `user:<id>` or `device:<fingerprint>`
    pub identity_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_fingerprint: Option<String>,
    pub is_anonymous: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guest: Option<GuestContact>,
    /// Gateway order id
    pub order_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_payment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Copied from the quiz at issuance
    pub amount: f64,
    pub amount_minor: i64,
    pub currency: String,
    pub status: PaymentStatus,
    #[serde(with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "bson_datetime_as_chrono_option"
    )]
    pub verified_at: Option<DateTime<Utc>>,
}

/// Successful gateway confirmation applied to a pending payment
#[derive(Debug, Clone)]
pub struct PaymentConfirmation {
    pub gateway_payment_id: String,
    pub signature: String,
    pub verified_at: DateTime<Utc>,
    pub guest: Option<GuestContact>,
}

/// Payment as returned to the client (no identity details, no signature)
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentView {
    pub id: String,
    pub quiz_id: String,
    pub order_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_payment_id: Option<String>,
    pub amount: f64,
    pub currency: String,
    pub status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
}

impl From<Payment> for PaymentView {
    fn from(payment: Payment) -> Self {
        PaymentView {
            id: payment.id,
            quiz_id: payment.quiz_id,
            order_id: payment.order_id,
            gateway_payment_id: payment.gateway_payment_id,
            amount: payment.amount,
            currency: payment.currency,
            status: payment.status,
            verified_at: payment.verified_at,
        }
    }
}

/// Request to open a payment order. There is deliberately no amount field:
/// whatever a client sends besides these fields is ignored.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, max = 64, message = "quizId is required"))]
    pub quiz_id: String,

    /// Required for guests
    #[validate(nested)]
    pub guest: Option<GuestContact>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    pub order_id: String,
    /// Minor currency units, as charged by the gateway
    pub amount: i64,
    pub currency: String,
    pub key_id: String,
    pub payment_id: String,
}

/// Checkout completion callback relayed by the client
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
    #[serde(alias = "razorpay_order_id")]
    #[validate(length(min = 1, max = 128, message = "orderId is required"))]
    pub order_id: String,

    #[serde(alias = "razorpay_payment_id")]
    #[validate(length(min = 1, max = 128, message = "paymentId is required"))]
    pub payment_id: String,

    #[serde(alias = "razorpay_signature")]
    #[validate(length(min = 1, max = 256, message = "signature is required"))]
    pub signature: String,

    #[validate(nested)]
    pub guest: Option<GuestContact>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentResponse {
    pub success: bool,
    /// True when this callback had already been applied earlier
    pub already_verified: bool,
    pub payment: PaymentView,
}
