use crate::QueryParams;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use ti1_core::OrderedRecord;

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub data: Vec<OrderedRecord>,
    pub count: usize,
    pub params: QueryParams,
}

#[derive(Debug, Serialize)]
pub struct JourneyCallsResponse {
    pub journey: OrderedRecord,
    pub calls: Vec<OrderedRecord>,
    pub count: usize,
    pub params: QueryParams,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    code: u16,
}

/// An error rendered as `{"error": "...", "code": N}` with the matching status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: &self.message,
            code: self.status.as_u16(),
        };
        (self.status, Json(body)).into_response()
    }
}
