use utoipa::{OpenApi, openapi::OpenApi as OpenApiSpec};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        cart::{CartView, CartViewLine, UpdateQuantityRequest},
        checkout::{CardInput, CheckoutDetails, CheckoutRequest, PaymentMethod},
    },
    models::{Product, ProductType},
    response::ApiResponse,
    routes::{cart, checkout, confirmation, health},
    services::{
        checkout_service::{CheckoutOutcome, CheckoutState, RequiredField},
        confirmation_service::Receipt,
    },
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        cart::cart_view,
        cart::add_to_cart,
        cart::update_quantity,
        cart::remove_from_cart,
        cart::clear_cart,
        checkout::checkout_status,
        checkout::submit_checkout,
        checkout::back_to_details,
        checkout::close_checkout,
        confirmation::card_success,
        confirmation::wallet_return,
        confirmation::wallet_cancel
    ),
    components(
        schemas(
            Product,
            ProductType,
            CartView,
            CartViewLine,
            UpdateQuantityRequest,
            CheckoutDetails,
            CheckoutRequest,
            CardInput,
            PaymentMethod,
            CheckoutState,
            CheckoutOutcome,
            RequiredField,
            Receipt,
            checkout::CheckoutStatus,
            ApiResponse<CartView>,
            ApiResponse<CheckoutOutcome>,
            ApiResponse<checkout::CheckoutStatus>,
            ApiResponse<Receipt>
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Cart", description = "Cart panel endpoints"),
        (name = "Checkout", description = "Checkout orchestration endpoints"),
        (name = "Confirmation", description = "Payment provider return pages"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
