//! Cart and checkout core of the gallery storefront.
//!
//! [`services::cart_service::CartStore`] owns the persisted cart,
//! [`services::checkout_service::CheckoutOrchestrator`] turns a cart snapshot
//! into a paid order, and [`routes`] exposes both to the storefront UI along
//! with the payment provider return pages.

pub mod config;
pub mod dto;
pub mod error;
pub mod models;
pub mod response;
pub mod routes;
pub mod services;
pub mod state;
pub mod storage;
