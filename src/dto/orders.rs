use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{ProductType, Specifications};

const MIXED: &str = "mixed";

/// Classification of a whole order: one product type, or `mixed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum OrderType {
    Single(ProductType),
    Mixed,
}

impl From<OrderType> for String {
    fn from(value: OrderType) -> Self {
        match value {
            OrderType::Single(product_type) => product_type.as_str().to_string(),
            OrderType::Mixed => MIXED.to_string(),
        }
    }
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderType::Single(product_type) => f.write_str(product_type.as_str()),
            OrderType::Mixed => f.write_str(MIXED),
        }
    }
}

impl TryFrom<String> for OrderType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value == MIXED {
            return Ok(OrderType::Mixed);
        }
        serde_json::from_value(serde_json::Value::String(value.clone()))
            .map(OrderType::Single)
            .map_err(|_| format!("unknown order type {value}"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ShippingAddress {
    pub full_name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OrderItemRequest {
    pub product_id: String,
    pub product_type: ProductType,
    pub name: String,
    pub quantity: u32,
    #[schema(value_type = String)]
    pub unit_price: Decimal,
    #[schema(value_type = String)]
    pub total_price: Decimal,
    #[schema(value_type = Object)]
    pub specifications: Specifications,
}

/// Body of the order-creation request, built fresh from a cart snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OrderSubmission {
    #[schema(value_type = String)]
    pub order_type: OrderType,
    pub items: Vec<OrderItemRequest>,
    pub shipping_address: ShippingAddress,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CreatedOrder {
    #[serde(alias = "id")]
    pub order_id: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PaymentOrderRequest {
    pub order_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WalletLink {
    pub href: String,
    pub rel: String,
    #[serde(default)]
    pub method: Option<String>,
}

/// Provider order object returned by the wallet-payment endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WalletOrder {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub links: Vec<WalletLink>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CardPaymentSession {
    pub client_secret: String,
    #[serde(default)]
    pub payment_intent_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WalletCaptureRequest {
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WalletCapture {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub order_id: Option<String>,
}
