use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;

use pricepilot_core::ProductId;
use pricepilot_infra::EngineResult;

use crate::app::errors;

/// Serialize `result` with `status`, or map the engine error.
pub fn respond<T: Serialize>(status: StatusCode, result: EngineResult<T>) -> axum::response::Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub fn product_id(raw: &str) -> Result<ProductId, axum::response::Response> {
    errors::parse_param(raw, "invalid_id")
}
