use crate::{errors::ServiceError, ApiResponse, PaginatedResponse};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use validator::Validate;

/// 200 with the standard envelope
pub fn success_response<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}

/// 201 with the standard envelope
pub fn created_response<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(ApiResponse::success(data))).into_response()
}

/// Wraps one page of models, converting each into its wire form.
pub fn page_response<M, T>(models: Vec<M>, total: u64, page: u64, limit: u64) -> Response
where
    T: Serialize + From<M>,
{
    let items = models.into_iter().map(T::from).collect();
    success_response(PaginatedResponse::<T>::new(items, total, page, limit))
}

/// Validate request input
pub fn validate_input<T: Validate>(input: &T) -> Result<(), ServiceError> {
    input
        .validate()
        .map_err(|e| ServiceError::ValidationError(format!("Validation failed: {}", e)))
}

/// Trims an optional field; blanks become `None`.
pub fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
