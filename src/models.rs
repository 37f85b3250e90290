use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Selected variant options for a line, e.g. `size -> "A3"`.
pub type Specifications = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ProductType {
    #[default]
    GalleryPrint,
    Merchandise,
    CustomPortrait,
}

impl ProductType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::GalleryPrint => "gallery-print",
            ProductType::Merchandise => "merchandise",
            ProductType::CustomPortrait => "custom-portrait",
        }
    }
}

impl std::fmt::Display for ProductType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A product as offered by a product page, before it enters the cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Product {
    pub id: String,
    pub title: String,
    #[schema(value_type = Option<String>)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub product_type: ProductType,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub specifications: Specifications,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CartLine {
    pub id: String,
    pub title: String,
    #[schema(value_type = String)]
    pub price: Decimal,
    pub image: String,
    pub category: String,
    pub product_type: ProductType,
    pub quantity: u32,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub specifications: Specifications,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cart total is too large")]
pub struct TotalOverflow;

impl CartLine {
    pub fn checked_line_total(&self) -> Option<Decimal> {
        self.price.checked_mul(Decimal::from(self.quantity))
    }

    /// Line total for display. Saturates instead of panicking; a line held by
    /// a cart always fits.
    pub fn line_total(&self) -> Decimal {
        self.price.saturating_mul(Decimal::from(self.quantity))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, ToSchema)]
pub struct CartState {
    pub items: Vec<CartLine>,
    #[schema(value_type = String)]
    pub total: Decimal,
}

impl CartState {
    /// Recomputes `total` from `items`. The only place `total` is written.
    /// On overflow `total` is left untouched.
    pub fn recalculate(&mut self) -> Result<(), TotalOverflow> {
        let mut total = Decimal::ZERO;
        for line in &self.items {
            let line_total = line.checked_line_total().ok_or(TotalOverflow)?;
            total = total.checked_add(line_total).ok_or(TotalOverflow)?;
        }
        self.total = total;
        Ok(())
    }

    pub fn line(&self, id: &str) -> Option<&CartLine> {
        self.items.iter().find(|line| line.id == id)
    }

    pub fn item_count(&self) -> u64 {
        self.items.iter().map(|line| u64::from(line.quantity)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
