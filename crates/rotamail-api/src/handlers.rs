//! API request handlers

pub mod accounts;
pub mod campaigns;
pub mod health;
pub mod oauth;
pub mod tracking;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rotamail_common::Error;
use serde::Serialize;

/// Wire shape of an API error
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
}

/// Handler error carrying the domain error's HTTP mapping
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(ErrorResponse {
            error: self.0.code(),
            message: self.0.to_string(),
        });
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
