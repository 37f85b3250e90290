use std::sync::Arc;

use crate::services::{
    cart_service::CartStore, checkout_service::CheckoutOrchestrator,
    confirmation_service::ConfirmationPage, payment::CardPaymentSdk,
    storefront_api::StorefrontApi,
};

#[derive(Clone)]
pub struct AppState {
    pub cart: Arc<CartStore>,
    pub checkout: Arc<CheckoutOrchestrator>,
    pub confirmation: Arc<ConfirmationPage>,
}

impl AppState {
    /// Wires every consumer to the one cart store.
    pub fn new(
        cart: Arc<CartStore>,
        api: Arc<dyn StorefrontApi>,
        card_sdk: Arc<dyn CardPaymentSdk>,
    ) -> Self {
        Self {
            checkout: Arc::new(CheckoutOrchestrator::new(
                cart.clone(),
                api.clone(),
                card_sdk,
            )),
            confirmation: Arc::new(ConfirmationPage::new(cart.clone(), api)),
            cart,
        }
    }
}
