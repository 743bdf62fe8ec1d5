use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::config::GatewaySettings;
use crate::error::{CoreError, CoreResult};
use crate::metrics::{record_outcome, ORDERS_CREATED_TOTAL};
use crate::models::{CreateOrderResponse, Identity, Payment, PaymentStatus};
use crate::repository::{RepositoryError, Store};
use crate::services::gateway::{GatewayOrderRequest, PaymentGateway};

pub struct OrderService {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
    settings: GatewaySettings,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        settings: GatewaySettings,
    ) -> Self {
        Self {
            store,
            gateway,
            settings,
        }
    }

    /// Opens a gateway order for `quiz_id` and records it as a pending payment.
    ///
    /// The charged amount always comes from the stored quiz. The gateway is called
    /// before the payment row is written, so a stored order id always exists upstream.
    pub async fn create_order(
        &self,
        quiz_id: &str,
        identity: &Identity,
    ) -> CoreResult<CreateOrderResponse> {
        let result = self.issue(quiz_id, identity).await;
        match &result {
            Ok(_) => record_outcome(&ORDERS_CREATED_TOTAL, "created"),
            Err(e) => record_outcome(&ORDERS_CREATED_TOTAL, e.code()),
        }
        result
    }

    async fn issue(&self, quiz_id: &str, identity: &Identity) -> CoreResult<CreateOrderResponse> {
        if identity.is_guest() && identity.contact().is_none() {
            return Err(CoreError::Validation(
                "Guest contact details (name, email, phone) are required".to_string(),
            ));
        }

        let quiz = self
            .store
            .find_quiz(quiz_id)
            .await?
            .ok_or(CoreError::QuizNotFound)?;

        if !quiz.is_active {
            return Err(CoreError::QuizInactive);
        }

        let amount_minor = quiz.entry_fee_minor().ok_or_else(|| {
            CoreError::Internal(format!("Quiz {} has no chargeable entry fee", quiz.id))
        })?;

        let identity_key = identity.key();

        if self
            .store
            .find_payment(quiz_id, &identity_key, PaymentStatus::Success)
            .await?
            .is_some()
        {
            tracing::info!(quiz_id, identity = %identity_key, "Order refused: already paid");
            return Err(CoreError::AlreadyPaid);
        }

        if let Some(pending) = self
            .store
            .find_payment(quiz_id, &identity_key, PaymentStatus::Pending)
            .await?
        {
            let cutoff = Utc::now() - Duration::seconds(self.settings.pending_order_ttl_seconds);
            if pending.created_at >= cutoff
                || !self.store.expire_pending_payment(&pending.id, cutoff).await?
            {
                tracing::info!(
                    quiz_id,
                    identity = %identity_key,
                    order_id = %pending.order_id,
                    "Order refused: payment in progress"
                );
                return Err(CoreError::PaymentInProgress);
            }
            tracing::info!(
                quiz_id,
                identity = %identity_key,
                order_id = %pending.order_id,
                "Expired abandoned pending payment"
            );
        }

        let receipt = format!("quiz_{}_{}", quiz.id, Utc::now().timestamp_millis());
        let order = self
            .gateway
            .create_order(&GatewayOrderRequest {
                amount: amount_minor,
                currency: self.settings.currency.clone(),
                receipt,
            })
            .await
            .map_err(|e| {
                tracing::error!(quiz_id, "Gateway order creation failed: {}", e);
                CoreError::OrderCreationFailed
            })?;

        let now = Utc::now();
        let payment = Payment {
            id: Uuid::new_v4().to_string(),
            quiz_id: quiz.id.clone(),
            identity_key: identity_key.clone(),
            user_id: identity.user_id().map(str::to_string),
            device_fingerprint: identity.device_fingerprint().map(str::to_string),
            is_anonymous: identity.is_guest(),
            guest: identity.contact().cloned(),
            order_id: order.id.clone(),
            gateway_payment_id: None,
            signature: None,
            amount: quiz.entry_fee,
            amount_minor,
            currency: self.settings.currency.clone(),
            status: PaymentStatus::Pending,
            created_at: now,
            updated_at: now,
            verified_at: None,
        };

        match self.store.insert_payment(&payment).await {
            Ok(()) => {}
            Err(RepositoryError::Duplicate(what)) => {
                tracing::warn!(
                    quiz_id,
                    identity = %identity_key,
                    order_id = %order.id,
                    "Concurrent order issuance lost the race: {}",
                    what
                );
                return Err(CoreError::PaymentInProgress);
            }
            Err(e) => {
                tracing::error!(
                    quiz_id,
                    order_id = %order.id,
                    "Failed to persist pending payment: {}",
                    e
                );
                return Err(CoreError::OrderCreationFailed);
            }
        }

        tracing::info!(
            quiz_id,
            identity = %identity_key,
            order_id = %order.id,
            amount_minor,
            "Payment order created"
        );

        Ok(CreateOrderResponse {
            order_id: order.id,
            amount: amount_minor,
            currency: payment.currency,
            key_id: self.gateway.key_id().to_string(),
            payment_id: payment.id,
        })
    }
}
