use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, patch, post},
};

use crate::{
    dto::cart::{CartView, UpdateQuantityRequest},
    error::AppResult,
    models::Product,
    response::ApiResponse,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(cart_view).delete(clear_cart))
        .route("/items", post(add_to_cart))
        .route(
            "/items/{product_id}",
            patch(update_quantity).delete(remove_from_cart),
        )
}

fn view(state: &AppState) -> CartView {
    CartView::from(&state.cart.snapshot())
}

#[utoipa::path(
    get,
    path = "/api/cart",
    responses(
        (status = 200, description = "Current cart contents", body = ApiResponse<CartView>)
    ),
    tag = "Cart"
)]
pub async fn cart_view(State(state): State<AppState>) -> Json<ApiResponse<CartView>> {
    Json(ApiResponse::success("OK", view(&state)))
}

#[utoipa::path(
    post,
    path = "/api/cart/items",
    request_body = Product,
    responses(
        (status = 200, description = "Add one unit of a product", body = ApiResponse<CartView>),
        (status = 400, description = "Product has no usable price or the total is out of range"),
    ),
    tag = "Cart"
)]
pub async fn add_to_cart(
    State(state): State<AppState>,
    Json(product): Json<Product>,
) -> AppResult<Json<ApiResponse<CartView>>> {
    state.cart.add(product)?;
    Ok(Json(ApiResponse::success("Added to cart", view(&state))))
}

#[utoipa::path(
    patch,
    path = "/api/cart/items/{product_id}",
    params(
        ("product_id" = String, Path, description = "Product ID")
    ),
    request_body = UpdateQuantityRequest,
    responses(
        (status = 200, description = "Set quantity; zero or below removes the line", body = ApiResponse<CartView>),
        (status = 400, description = "Resulting total is out of range"),
    ),
    tag = "Cart"
)]
pub async fn update_quantity(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
    Json(payload): Json<UpdateQuantityRequest>,
) -> AppResult<Json<ApiResponse<CartView>>> {
    state.cart.update_quantity(&product_id, payload.quantity)?;
    Ok(Json(ApiResponse::success("Cart updated", view(&state))))
}

#[utoipa::path(
    delete,
    path = "/api/cart/items/{product_id}",
    params(
        ("product_id" = String, Path, description = "Product ID")
    ),
    responses(
        (status = 200, description = "Removed from cart", body = ApiResponse<CartView>)
    ),
    tag = "Cart"
)]
pub async fn remove_from_cart(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
) -> Json<ApiResponse<CartView>> {
    state.cart.remove(&product_id);
    Json(ApiResponse::success("Removed from cart", view(&state)))
}

#[utoipa::path(
    delete,
    path = "/api/cart",
    responses(
        (status = 200, description = "Cart emptied", body = ApiResponse<CartView>)
    ),
    tag = "Cart"
)]
pub async fn clear_cart(State(state): State<AppState>) -> Json<ApiResponse<CartView>> {
    state.cart.clear();
    Json(ApiResponse::success("Cart cleared", view(&state)))
}
