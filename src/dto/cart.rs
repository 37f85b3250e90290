use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{ProductType, Specifications};

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateQuantityRequest {
    pub quantity: i64,
}

/// What the cart side panel renders.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct CartView {
    pub lines: Vec<CartViewLine>,
    pub item_count: u64,
    #[schema(value_type = String)]
    pub total: Decimal,
    pub is_empty: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct CartViewLine {
    pub id: String,
    pub title: String,
    pub image: String,
    pub category: String,
    pub product_type: ProductType,
    pub quantity: u32,
    #[schema(value_type = String)]
    pub unit_price: Decimal,
    #[schema(value_type = String)]
    pub line_total: Decimal,
    #[schema(value_type = Object)]
    pub specifications: Specifications,
}
