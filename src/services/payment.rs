//! Embedded card payment confirmation.
//!
//! Confirmation talks to the card provider directly with the publishable key,
//! so card data never passes through the storefront backend.

use async_trait::async_trait;
use mockall::automock;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dto::checkout::CardInput;

const SUCCEEDED: &str = "succeeded";

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    #[error("{message}")]
    Declined {
        code: Option<String>,
        message: String,
    },

    #[error("payment provider unreachable: {0}")]
    Transport(String),

    #[error("malformed client secret")]
    MalformedSecret,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub status: String,
}

impl PaymentIntent {
    pub fn succeeded(&self) -> bool {
        self.status == SUCCEEDED
    }
}

#[automock]
#[async_trait]
pub trait CardPaymentSdk: Send + Sync {
    async fn confirm_card_payment(
        &self,
        client_secret: &str,
        card: &CardInput,
    ) -> Result<PaymentIntent, ProviderError>;
}

#[derive(Debug, Clone)]
pub struct HttpCardPaymentSdk {
    base_url: String,
    publishable_key: String,
    http: Client,
}

impl HttpCardPaymentSdk {
    pub fn new(base_url: impl Into<String>, publishable_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            publishable_key: publishable_key.into(),
            http: Client::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: ProviderErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorDetail {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[async_trait]
impl CardPaymentSdk for HttpCardPaymentSdk {
    async fn confirm_card_payment(
        &self,
        client_secret: &str,
        card: &CardInput,
    ) -> Result<PaymentIntent, ProviderError> {
        let intent_id = intent_id_from_secret(client_secret)?;
        let url = format!("{}/v1/payment_intents/{}/confirm", self.base_url, intent_id);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.publishable_key)
            .form(&[
                ("client_secret", client_secret),
                ("payment_method", card.payment_method.as_str()),
            ])
            .send()
            .await
            .map_err(|err| ProviderError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let (code, message) = match serde_json::from_str::<ProviderErrorBody>(&text) {
                Ok(body) => (body.error.code, body.error.message),
                Err(_) => (None, None),
            };

            return Err(ProviderError::Declined {
                code,
                message: message
                    .unwrap_or_else(|| format!("card confirmation failed with status {status}")),
            });
        }

        response
            .json::<PaymentIntent>()
            .await
            .map_err(|err| ProviderError::Transport(err.to_string()))
    }
}

/// Client secrets have the shape `<intent id>_secret_<nonce>`.
pub fn intent_id_from_secret(client_secret: &str) -> Result<&str, ProviderError> {
    match client_secret.split_once("_secret_") {
        Some((intent_id, nonce)) if !intent_id.is_empty() && !nonce.is_empty() => Ok(intent_id),
        _ => Err(ProviderError::MalformedSecret),
    }
}
