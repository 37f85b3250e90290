//! Client for the storefront REST backend.

use async_trait::async_trait;
use mockall::automock;
use reqwest::Client;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    dto::orders::{
        CardPaymentSession, CreatedOrder, OrderSubmission, PaymentOrderRequest, WalletCapture,
        WalletCaptureRequest, WalletOrder,
    },
    response::ApiResponse,
};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("storefront request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("storefront rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("storefront response carried no data")]
    EmptyResponse,
}

impl ApiError {
    /// Message supplied by the backend, if it sent one.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ApiError::Rejected { message, .. } => Some(message),
            _ => None,
        }
    }
}

#[automock]
#[async_trait]
pub trait StorefrontApi: Send + Sync {
    /// Creates the order record and returns its identifier.
    async fn create_order(
        &self,
        submission: &OrderSubmission,
        idempotency_key: Uuid,
    ) -> Result<CreatedOrder, ApiError>;

    /// Creates the wallet provider order carrying the approval link.
    async fn create_wallet_order(&self, order_id: &str) -> Result<WalletOrder, ApiError>;

    /// Creates the card payment intent and returns its client secret.
    async fn create_card_payment(&self, order_id: &str) -> Result<CardPaymentSession, ApiError>;

    /// Captures an approved wallet order after the provider redirects back.
    async fn capture_wallet_order(&self, token: &str) -> Result<WalletCapture, ApiError>;
}

#[derive(Debug, Clone)]
pub struct HttpStorefrontApi {
    base_url: String,
    http: Client,
}

impl HttpStorefrontApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, http: Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, http }
    }

    async fn post<B, T>(
        &self,
        path: &str,
        body: &B,
        idempotency_key: Option<Uuid>,
    ) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);

        let mut request = self.http.post(&url).json(body);
        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key.to_string());
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = server_message(&text)
                .unwrap_or_else(|| format!("request failed with status {status}"));
            tracing::warn!(%url, %status, %message, "storefront request rejected");

            return Err(ApiError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let envelope: ApiResponse<T> = response.json().await?;
        envelope.data.ok_or(ApiError::EmptyResponse)
    }
}

#[async_trait]
impl StorefrontApi for HttpStorefrontApi {
    async fn create_order(
        &self,
        submission: &OrderSubmission,
        idempotency_key: Uuid,
    ) -> Result<CreatedOrder, ApiError> {
        self.post("/orders", submission, Some(idempotency_key)).await
    }

    async fn create_wallet_order(&self, order_id: &str) -> Result<WalletOrder, ApiError> {
        let body = PaymentOrderRequest {
            order_id: order_id.to_string(),
        };
        self.post("/payments/wallet/orders", &body, None).await
    }

    async fn create_card_payment(&self, order_id: &str) -> Result<CardPaymentSession, ApiError> {
        let body = PaymentOrderRequest {
            order_id: order_id.to_string(),
        };
        self.post("/payments/card/intents", &body, None).await
    }

    async fn capture_wallet_order(&self, token: &str) -> Result<WalletCapture, ApiError> {
        let body = WalletCaptureRequest {
            token: token.to_string(),
        };
        self.post("/payments/wallet/capture", &body, None).await
    }
}

/// Pulls a human-readable message out of an error body, accepting both the
/// envelope shape and a bare `{"error": "..."}`.
fn server_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;

    [
        value.get("message"),
        value.pointer("/data/error"),
        value.get("error"),
    ]
    .into_iter()
    .flatten()
    .filter_map(Value::as_str)
    .map(str::trim)
    .find(|message| !message.is_empty())
    .map(str::to_string)
}
