use std::sync::Arc;

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};

use crate::app::services::AppServices;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// Alerts raised since start, newest first.
pub async fn alerts(Extension(services): Extension<Arc<AppServices>>) -> impl IntoResponse {
    let mut items = services.alerts.all();
    items.reverse();
    Json(serde_json::json!({ "items": items }))
}
