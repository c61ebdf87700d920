// ABOUTME: Gateway-level error taxonomy spanning validation, routing, transport and webhook failures
// ABOUTME: Implements IntoResponse so axum handlers stay Result-returning and `?`-friendly

use crate::route::RouteError;
use crate::session::SessionError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("validation failed")]
    Validation(HashMap<String, Vec<String>>),

    #[error("can't route message: {0}")]
    NoActiveRoute(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("webhook delivery failed: {0}")]
    Webhook(String),

    #[error("could not decode message")]
    Decode,

    #[error("smpp connection failure: {0}")]
    ConnectionFailure(#[from] SessionError),
}

impl From<RouteError> for GatewayError {
    fn from(err: RouteError) -> Self {
        match err {
            RouteError::Empty(_) | RouteError::NoActiveRoute(_) => {
                GatewayError::NoActiveRoute(err.to_string())
            }
            RouteError::Transport(msg) => GatewayError::Transport(msg),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        match self {
            GatewayError::Validation(fields) => {
                (StatusCode::BAD_REQUEST, axum::Json(fields)).into_response()
            }
            GatewayError::NoActiveRoute(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, msg).into_response()
            }
            GatewayError::Transport(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, msg).into_response()
            }
            GatewayError::Webhook(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, msg).into_response()
            }
            GatewayError::Decode => {
                (StatusCode::INTERNAL_SERVER_ERROR, "could not decode message").into_response()
            }
            GatewayError::ConnectionFailure(err) => {
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
            }
        }
    }
}
