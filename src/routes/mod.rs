use axum::{Router, http::Uri, routing::get};

use crate::{error::AppError, state::AppState};

pub mod cart;
pub mod checkout;
pub mod confirmation;
pub mod doc;
pub mod health;

// JSON API used by the cart panel and checkout form.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .nest("/cart", cart::router())
        .nest("/checkout", checkout::router())
}

/// Full application router: health, API, provider return pages and docs.
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api", create_api_router())
        .nest("/checkout", confirmation::router())
        .merge(doc::scalar_docs())
        .fallback(not_found)
        .with_state(state)
}

async fn not_found(uri: Uri) -> AppError {
    tracing::debug!(path = %uri.path(), "no route");
    AppError::NotFound
}
