use core::str::FromStr;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use pricepilot_infra::EngineError;

pub fn engine_error_to_response(err: EngineError) -> axum::response::Response {
    let message = err.to_string();
    match err {
        EngineError::NotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", message),
        EngineError::Conflict(_) => json_error(StatusCode::CONFLICT, "conflict", message),
        EngineError::InvalidTransition { .. } => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invalid_transition", message)
        }
        EngineError::MissingBaseline(_) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "missing_baseline", message)
        }
        EngineError::ExternalApplyFailure { .. } => {
            json_error(StatusCode::BAD_GATEWAY, "external_apply_failure", message)
        }
        EngineError::Validation(_) => json_error(StatusCode::BAD_REQUEST, "validation_error", message),
        EngineError::Storage(_) => {
            tracing::error!(error = %message, "storage failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "storage_error", message)
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Parse a path or query value, answering 400 with `code` on failure.
pub fn parse_param<T>(raw: &str, code: &'static str) -> Result<T, axum::response::Response>
where
    T: FromStr,
    T::Err: core::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| json_error(StatusCode::BAD_REQUEST, code, e.to_string()))
}
