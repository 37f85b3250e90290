use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::{
    response::ApiResponse,
    services::{
        cart_service::CartError,
        checkout_service::{CheckoutError, RequiredField},
        confirmation_service::ConfirmationError,
    },
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not Found")]
    NotFound,

    #[error("{0}")]
    Cart(#[from] CartError),

    #[error("{0}")]
    Checkout(#[from] CheckoutError),

    #[error("{0}")]
    Confirmation(#[from] ConfirmationError),
}

#[derive(Serialize)]
struct ErrorData {
    error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<&'static str>,
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Cart(_) => StatusCode::BAD_REQUEST,
            AppError::Checkout(err) => match err {
                CheckoutError::MissingFields(_)
                | CheckoutError::EmptyCart
                | CheckoutError::MissingCardDetails => StatusCode::UNPROCESSABLE_ENTITY,
                CheckoutError::Busy
                | CheckoutError::AlreadyCompleted
                | CheckoutError::NothingToRetry
                | CheckoutError::Closed => StatusCode::CONFLICT,
                CheckoutError::OrderCreation(_) | CheckoutError::Payment(_) => {
                    StatusCode::BAD_GATEWAY
                }
            },
            AppError::Confirmation(err) => match err {
                ConfirmationError::MissingReference => StatusCode::BAD_REQUEST,
                ConfirmationError::NotSucceeded(_) => StatusCode::PAYMENT_REQUIRED,
                ConfirmationError::Capture(_) => StatusCode::BAD_GATEWAY,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let fields = match &self {
            AppError::Checkout(CheckoutError::MissingFields(fields)) => {
                fields.iter().map(RequiredField::key).collect()
            }
            _ => Vec::new(),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = ApiResponse {
            message: self.to_string(),
            data: Some(ErrorData {
                error: self.to_string(),
                fields,
            }),
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
