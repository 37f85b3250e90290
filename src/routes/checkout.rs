use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    dto::checkout::{CheckoutDetails, CheckoutRequest},
    error::AppResult,
    response::ApiResponse,
    services::checkout_service::{CheckoutOutcome, CheckoutState},
    state::AppState,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutStatus {
    pub state: CheckoutState,
    pub details: CheckoutDetails,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(checkout_status).post(submit_checkout))
        .route("/back", post(back_to_details))
        .route("/close", post(close_checkout))
}

fn status(state: &AppState) -> CheckoutStatus {
    CheckoutStatus {
        state: state.checkout.state(),
        details: state.checkout.details(),
    }
}

#[utoipa::path(
    get,
    path = "/api/checkout",
    responses(
        (status = 200, description = "Checkout state and entered details", body = ApiResponse<CheckoutStatus>)
    ),
    tag = "Checkout"
)]
pub async fn checkout_status(State(state): State<AppState>) -> Json<ApiResponse<CheckoutStatus>> {
    Json(ApiResponse::success("OK", status(&state)))
}

#[utoipa::path(
    post,
    path = "/api/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Paid, or approval link to navigate to", body = ApiResponse<CheckoutOutcome>),
        (status = 422, description = "Missing required field, empty cart or card details"),
        (status = 409, description = "A checkout is already in progress"),
        (status = 502, description = "Order creation or payment failed"),
    ),
    tag = "Checkout"
)]
pub async fn submit_checkout(
    State(state): State<AppState>,
    Json(payload): Json<CheckoutRequest>,
) -> AppResult<Json<ApiResponse<CheckoutOutcome>>> {
    let outcome = state.checkout.submit(payload).await?;
    let message = match &outcome {
        CheckoutOutcome::Redirect { .. } => "Redirecting to payment approval",
        CheckoutOutcome::Paid { .. } => "Payment successful",
    };
    Ok(Json(ApiResponse::success(message, outcome)))
}

#[utoipa::path(
    post,
    path = "/api/checkout/back",
    responses(
        (status = 200, description = "Back to the details form", body = ApiResponse<CheckoutStatus>),
        (status = 409, description = "Nothing to go back from"),
    ),
    tag = "Checkout"
)]
pub async fn back_to_details(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<CheckoutStatus>>> {
    state.checkout.back_to_details()?;
    Ok(Json(ApiResponse::success("OK", status(&state))))
}

#[utoipa::path(
    post,
    path = "/api/checkout/close",
    responses(
        (status = 200, description = "Checkout panel closed", body = ApiResponse<CheckoutStatus>)
    ),
    tag = "Checkout"
)]
pub async fn close_checkout(State(state): State<AppState>) -> Json<ApiResponse<CheckoutStatus>> {
    state.checkout.close();
    Json(ApiResponse::success("Checkout closed", status(&state)))
}
