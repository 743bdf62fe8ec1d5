use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{CoreError, CoreResult};
use crate::metrics::{record_outcome, PAYMENT_VERIFICATIONS_TOTAL};
use crate::models::payment::PaymentConfirmation;
use crate::models::{Identity, Payment, PaymentStatus, VerifyPaymentResponse};
use crate::repository::{RepositoryError, Store};
use crate::services::signature::verify_checkout_signature;

/// Checkout completion callback after request validation
#[derive(Debug, Clone)]
pub struct CheckoutCallback {
    pub order_id: String,
    pub payment_id: String,
    pub signature: String,
}

pub struct PaymentService {
    store: Arc<dyn Store>,
    key_secret: String,
}

impl PaymentService {
    pub fn new(store: Arc<dyn Store>, key_secret: String) -> Self {
        Self { store, key_secret }
    }

    pub async fn verify_payment(
        &self,
        callback: &CheckoutCallback,
        identity: &Identity,
    ) -> CoreResult<VerifyPaymentResponse> {
        let result = self.verify(callback, identity).await;
        match &result {
            Ok(r) if r.already_verified => {
                record_outcome(&PAYMENT_VERIFICATIONS_TOTAL, "replayed")
            }
            Ok(_) => record_outcome(&PAYMENT_VERIFICATIONS_TOTAL, "verified"),
            Err(e) => record_outcome(&PAYMENT_VERIFICATIONS_TOTAL, e.code()),
        }
        result
    }

    async fn verify(
        &self,
        callback: &CheckoutCallback,
        identity: &Identity,
    ) -> CoreResult<VerifyPaymentResponse> {
        let identity_key = identity.key();

        if !verify_checkout_signature(
            &self.key_secret,
            &callback.order_id,
            &callback.payment_id,
            &callback.signature,
        ) {
            tracing::warn!(
                order_id = %callback.order_id,
                identity = %identity_key,
                "Payment signature mismatch"
            );
            return Err(CoreError::InvalidSignature);
        }

        let confirmation = PaymentConfirmation {
            gateway_payment_id: callback.payment_id.clone(),
            signature: callback.signature.clone(),
            verified_at: Utc::now(),
            guest: identity.contact().cloned(),
        };

        if let Some(payment) = self
            .store
            .confirm_payment(
                &callback.order_id,
                &identity_key,
                PaymentStatus::Pending,
                &confirmation,
            )
            .await?
        {
            tracing::info!(
                order_id = %callback.order_id,
                identity = %identity_key,
                payment_id = %payment.id,
                "Payment verified"
            );
            return Ok(VerifyPaymentResponse {
                success: true,
                already_verified: false,
                payment: payment.into(),
            });
        }

        let existing = self
            .store
            .find_payment_by_order(&callback.order_id, &identity_key)
            .await?;

        match existing {
            Some(payment)
                if payment.status == PaymentStatus::Failed
                    && payment.gateway_payment_id.is_none() =>
            {
                self.recover_expired(payment, &confirmation, &identity_key)
                    .await
            }
            other => settled(callback, &identity_key, other),
        }
    }

    /// A validly signed callback for an order that expired locally means the gateway
    /// captured the money. The capture is applied if the payer holds no success yet,
    /// otherwise it is stored on the failed row for refund.
    async fn recover_expired(
        &self,
        expired: Payment,
        confirmation: &PaymentConfirmation,
        identity_key: &str,
    ) -> CoreResult<VerifyPaymentResponse> {
        let already_paid = self
            .store
            .find_payment(&expired.quiz_id, identity_key, PaymentStatus::Success)
            .await?
            .is_some();

        if !already_paid {
            // The replacement order gives up the slot; if it is captured later it lands here too
            if let Some(pending) = self
                .store
                .find_payment(&expired.quiz_id, identity_key, PaymentStatus::Pending)
                .await?
            {
                self.store
                    .expire_pending_payment(&pending.id, DateTime::<Utc>::MAX_UTC)
                    .await?;
                tracing::info!(
                    order_id = %pending.order_id,
                    identity = %identity_key,
                    "Released replacement order for captured expired order"
                );
            }

            match self
                .store
                .confirm_payment(
                    &expired.order_id,
                    identity_key,
                    PaymentStatus::Failed,
                    confirmation,
                )
                .await
            {
                Ok(Some(payment)) => {
                    tracing::warn!(
                        order_id = %expired.order_id,
                        identity = %identity_key,
                        payment_id = %payment.id,
                        "Late capture applied to expired order"
                    );
                    return Ok(VerifyPaymentResponse {
                        success: true,
                        already_verified: false,
                        payment: payment.into(),
                    });
                }
                Ok(None) | Err(RepositoryError::Duplicate(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        if !self
            .store
            .record_capture(&expired.order_id, identity_key, confirmation)
            .await?
        {
            // A concurrent callback settled the row first
            let current = self
                .store
                .find_payment_by_order(&expired.order_id, identity_key)
                .await?;
            let callback = CheckoutCallback {
                order_id: expired.order_id.clone(),
                payment_id: confirmation.gateway_payment_id.clone(),
                signature: confirmation.signature.clone(),
            };
            return settled(&callback, identity_key, current);
        }

        tracing::error!(
            order_id = %expired.order_id,
            identity = %identity_key,
            gateway_payment_id = %confirmation.gateway_payment_id,
            "Captured payment for expired order not applied: payer already paid, refund required"
        );
        Err(CoreError::AlreadyPaid)
    }
}

/// Outcome for a callback whose order is no longer pending. Only a replay of the exact
/// same successful callback is accepted.
fn settled(
    callback: &CheckoutCallback,
    identity_key: &str,
    existing: Option<Payment>,
) -> CoreResult<VerifyPaymentResponse> {
    match existing {
        Some(payment)
            if payment.status == PaymentStatus::Success
                && payment.gateway_payment_id.as_deref() == Some(callback.payment_id.as_str()) =>
        {
            tracing::info!(
                order_id = %callback.order_id,
                identity = %identity_key,
                "Payment callback replayed"
            );
            Ok(VerifyPaymentResponse {
                success: true,
                already_verified: true,
                payment: payment.into(),
            })
        }
        Some(payment)
            if payment.status == PaymentStatus::Failed
                && payment.gateway_payment_id.as_deref() == Some(callback.payment_id.as_str()) =>
        {
            Err(CoreError::AlreadyPaid)
        }
        other => {
            tracing::warn!(
                order_id = %callback.order_id,
                identity = %identity_key,
                status = ?other.map(|p| p.status),
                "No pending payment matches verified callback"
            );
            Err(CoreError::PaymentRecordNotFound)
        }
    }
}
