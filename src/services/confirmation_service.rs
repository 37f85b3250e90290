//! Return and confirmation pages reached after leaving the in-page checkout.
//!
//! Each confirmation reference clears the cart at most once, so reloading a
//! receipt never wipes a cart the shopper has started filling again.

use std::{
    collections::{HashSet, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::{IntoParams, ToSchema};

use crate::services::{cart_service::CartStore, storefront_api::StorefrontApi};

const CAPTURE_COMPLETED: &str = "COMPLETED";

/// How many confirmation references are remembered for one-shot clearing.
pub const HANDLED_HISTORY: usize = 1024;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfirmationError {
    #[error("confirmation link is missing its payment reference")]
    MissingReference,

    #[error("payment was not completed (status: {0})")]
    NotSucceeded(String),

    #[error("could not complete wallet payment: {0}")]
    Capture(String),
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CardReturnQuery {
    pub payment_intent: Option<String>,
    pub order_id: Option<String>,
    pub redirect_status: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct WalletReturnQuery {
    pub token: Option<String>,
    #[serde(rename = "PayerID")]
    pub payer_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Receipt {
    pub reference: String,
    pub order_id: Option<String>,
    /// Whether this visit cleared the cart.
    pub cleared: bool,
    pub confirmed_at: DateTime<Utc>,
}

/// Recently seen references, oldest first. A reference is inserted when a
/// visit starts handling it, not when it finishes.
#[derive(Debug)]
struct HandledReferences {
    seen: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl HandledReferences {
    fn new(capacity: usize) -> Self {
        Self {
            seen: HashSet::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Returns false if the reference is already taken.
    fn reserve(&mut self, reference: &str) -> bool {
        if !self.seen.insert(reference.to_string()) {
            return false;
        }
        self.order.push_back(reference.to_string());
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }

    fn release(&mut self, reference: &str) {
        if self.seen.remove(reference) {
            self.order.retain(|seen| seen != reference);
        }
    }
}

/// Holds a reference while its payment is being confirmed. Dropping it
/// without [`Reservation::commit`] frees the reference for a later visit.
struct Reservation<'a> {
    handled: &'a Mutex<HandledReferences>,
    reference: &'a str,
    committed: bool,
}

impl Reservation<'_> {
    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            lock(self.handled).release(self.reference);
        }
    }
}

fn lock(handled: &Mutex<HandledReferences>) -> MutexGuard<'_, HandledReferences> {
    handled.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct ConfirmationPage {
    cart: Arc<CartStore>,
    api: Arc<dyn StorefrontApi>,
    handled: Mutex<HandledReferences>,
}

impl ConfirmationPage {
    pub fn new(cart: Arc<CartStore>, api: Arc<dyn StorefrontApi>) -> Self {
        Self::with_history(cart, api, HANDLED_HISTORY)
    }

    pub fn with_history(
        cart: Arc<CartStore>,
        api: Arc<dyn StorefrontApi>,
        history: usize,
    ) -> Self {
        Self {
            cart,
            api,
            handled: Mutex::new(HandledReferences::new(history)),
        }
    }

    pub fn confirm_card(&self, query: &CardReturnQuery) -> Result<Receipt, ConfirmationError> {
        if let Some(status) = query.redirect_status.as_deref() {
            if status != "succeeded" {
                return Err(ConfirmationError::NotSucceeded(status.to_string()));
            }
        }

        let reference = non_empty(&query.payment_intent)
            .or_else(|| non_empty(&query.order_id))
            .ok_or(ConfirmationError::MissingReference)?;

        let cleared = match self.reserve(reference) {
            Some(reservation) => {
                reservation.commit();
                self.clear_cart(reference);
                true
            }
            None => false,
        };
        Ok(Receipt {
            reference: reference.to_string(),
            order_id: non_empty(&query.order_id).map(str::to_string),
            cleared,
            confirmed_at: Utc::now(),
        })
    }

    pub async fn confirm_wallet(
        &self,
        query: &WalletReturnQuery,
    ) -> Result<Receipt, ConfirmationError> {
        let token = non_empty(&query.token).ok_or(ConfirmationError::MissingReference)?;

        let Some(reservation) = self.reserve(token) else {
            tracing::debug!(%token, "wallet return already handled");
            return Ok(Receipt {
                reference: token.to_string(),
                order_id: None,
                cleared: false,
                confirmed_at: Utc::now(),
            });
        };

        let capture = self.api.capture_wallet_order(token).await.map_err(|err| {
            tracing::warn!(%token, error = %err, "wallet capture failed");
            ConfirmationError::Capture(
                err.server_message()
                    .unwrap_or("please try again later")
                    .to_string(),
            )
        })?;

        if !capture.status.eq_ignore_ascii_case(CAPTURE_COMPLETED) {
            return Err(ConfirmationError::NotSucceeded(capture.status));
        }

        reservation.commit();
        self.clear_cart(token);
        Ok(Receipt {
            reference: capture.id,
            order_id: capture.order_id,
            cleared: true,
            confirmed_at: Utc::now(),
        })
    }

    /// The shopper backed out of wallet approval; the cart stays as it was.
    pub fn cancel_wallet(&self, query: &WalletReturnQuery) {
        tracing::info!(token = ?query.token, "wallet payment cancelled");
    }

    fn reserve<'a>(&'a self, reference: &'a str) -> Option<Reservation<'a>> {
        if !lock(&self.handled).reserve(reference) {
            return None;
        }
        Some(Reservation {
            handled: &self.handled,
            reference,
            committed: false,
        })
    }

    fn clear_cart(&self, reference: &str) {
        self.cart.clear();
        tracing::info!(%reference, "cart cleared after confirmed payment");
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
