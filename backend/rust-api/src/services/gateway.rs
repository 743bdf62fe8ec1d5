use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::config::GatewaySettings;
use crate::metrics::GATEWAY_REQUEST_DURATION_SECONDS;

#[derive(Debug, Clone, Serialize)]
pub struct GatewayOrderRequest {
    /// Minor currency units (paise)
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Gateway request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Gateway rejected the order (status {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Invalid gateway configuration: {0}")]
    Config(String),
}

/// Outbound side of the payment gateway. Order creation is never retried here.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Public key id handed to the client checkout
    fn key_id(&self) -> &str;

    async fn create_order(&self, request: &GatewayOrderRequest)
        -> Result<GatewayOrder, GatewayError>;
}

pub struct RazorpayGateway {
    client: Client,
    orders_url: Url,
    key_id: String,
    key_secret: String,
}

impl RazorpayGateway {
    pub fn new(settings: &GatewaySettings) -> Result<Self, GatewayError> {
        let base = Url::parse(&settings.api_base)
            .map_err(|e| GatewayError::Config(format!("Invalid api_base: {}", e)))?;

        // Enforce HTTPS in production mode
        let app_env = std::env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());
        if app_env == "prod" && base.scheme() != "https" {
            return Err(GatewayError::Config(format!(
                "Gateway endpoint must use HTTPS in production mode. Got: {}",
                base.scheme()
            )));
        }
        if base.scheme() != "https" && base.scheme() != "http" {
            return Err(GatewayError::Config(format!(
                "Invalid endpoint scheme: {}",
                base.scheme()
            )));
        }

        let orders_url = base
            .join("/v1/orders")
            .map_err(|e| GatewayError::Config(e.to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            orders_url,
            key_id: settings.key_id.clone(),
            key_secret: settings.key_secret.clone(),
        })
    }

    pub fn orders_url(&self) -> &Url {
        &self.orders_url
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    fn key_id(&self) -> &str {
        &self.key_id
    }

    async fn create_order(
        &self,
        request: &GatewayOrderRequest,
    ) -> Result<GatewayOrder, GatewayError> {
        let start = Instant::now();

        let result = async {
            let response = self
                .client
                .post(self.orders_url.clone())
                .basic_auth(&self.key_id, Some(&self.key_secret))
                .json(request)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(GatewayError::Rejected {
                    status: status.as_u16(),
                    body,
                });
            }

            Ok(response.json::<GatewayOrder>().await?)
        }
        .await;

        let label = if result.is_ok() { "success" } else { "error" };
        GATEWAY_REQUEST_DURATION_SECONDS
            .with_label_values(&["create_order", label])
            .observe(start.elapsed().as_secs_f64());

        result
    }
}
