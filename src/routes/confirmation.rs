use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};

use crate::{
    dto::cart::CartView,
    error::AppResult,
    response::ApiResponse,
    services::confirmation_service::{CardReturnQuery, Receipt, WalletReturnQuery},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/success", get(card_success))
        .route("/wallet/return", get(wallet_return))
        .route("/wallet/cancel", get(wallet_cancel))
}

#[utoipa::path(
    get,
    path = "/checkout/success",
    params(CardReturnQuery),
    responses(
        (status = 200, description = "Receipt for a confirmed card payment", body = ApiResponse<Receipt>),
        (status = 400, description = "Missing payment reference"),
        (status = 402, description = "Payment did not succeed"),
    ),
    tag = "Confirmation"
)]
pub async fn card_success(
    State(state): State<AppState>,
    Query(query): Query<CardReturnQuery>,
) -> AppResult<Json<ApiResponse<Receipt>>> {
    let receipt = state.confirmation.confirm_card(&query)?;
    Ok(Json(ApiResponse::success("Thank you for your order", receipt)))
}

#[utoipa::path(
    get,
    path = "/checkout/wallet/return",
    params(WalletReturnQuery),
    responses(
        (status = 200, description = "Receipt for a captured wallet payment", body = ApiResponse<Receipt>),
        (status = 402, description = "Wallet payment not completed"),
        (status = 502, description = "Capture failed"),
    ),
    tag = "Confirmation"
)]
pub async fn wallet_return(
    State(state): State<AppState>,
    Query(query): Query<WalletReturnQuery>,
) -> AppResult<Json<ApiResponse<Receipt>>> {
    let receipt = state.confirmation.confirm_wallet(&query).await?;
    Ok(Json(ApiResponse::success("Thank you for your order", receipt)))
}

#[utoipa::path(
    get,
    path = "/checkout/wallet/cancel",
    params(WalletReturnQuery),
    responses(
        (status = 200, description = "Wallet payment cancelled, cart unchanged", body = ApiResponse<CartView>)
    ),
    tag = "Confirmation"
)]
pub async fn wallet_cancel(
    State(state): State<AppState>,
    Query(query): Query<WalletReturnQuery>,
) -> Json<ApiResponse<CartView>> {
    state.confirmation.cancel_wallet(&query);
    Json(ApiResponse::success(
        "Payment cancelled, your cart is unchanged",
        CartView::from(&state.cart.snapshot()),
    ))
}
