use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use pricepilot_core::ChangeId;
use pricepilot_pricing::RecommendationStatus;

use crate::app::{dto, errors};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_recommendations))
        .route("/generate", post(generate_recommendations))
        .route("/:change_id", get(get_recommendation))
        .route("/:change_id/decision", post(decide_recommendation))
}

/// Run the pricing pass now. Products that already have today's change id are skipped.
pub async fn generate_recommendations(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.engine.generate_recommendations() {
        Ok(report) => (StatusCode::OK, Json(dto::generation_to_json(&report))).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn list_recommendations(
    Extension(services): Extension<Arc<AppServices>>,
    Query(q): Query<dto::StatusQuery>,
) -> axum::response::Response {
    let status = match q
        .status
        .as_deref()
        .map(|raw| errors::parse_param::<RecommendationStatus>(raw, "invalid_status"))
    {
        Some(Ok(s)) => Some(s),
        Some(Err(resp)) => return resp,
        None => None,
    };
    match services.engine.list_recommendations(status) {
        Ok(items) => {
            let items = items.iter().map(dto::recommendation_to_json).collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn get_recommendation(
    Extension(services): Extension<Arc<AppServices>>,
    Path(change_id): Path<String>,
) -> axum::response::Response {
    let change_id: ChangeId = match errors::parse_param(&change_id, "invalid_change_id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.engine.get_recommendation(&change_id) {
        Ok(rec) => (StatusCode::OK, Json(dto::recommendation_to_json(&rec))).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

/// Approve (apply the price and start its experiment) or reject a pending recommendation.
pub async fn decide_recommendation(
    Extension(services): Extension<Arc<AppServices>>,
    Path(change_id): Path<String>,
    Json(body): Json<dto::DecideRequest>,
) -> axum::response::Response {
    let change_id: ChangeId = match errors::parse_param(&change_id, "invalid_change_id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.engine.decide_recommendation(&change_id, body.decision).await {
        Ok(outcome) => (StatusCode::OK, Json(dto::decision_to_json(&outcome))).into_response(),
        Err(e) => {
            tracing::warn!(change_id = %change_id, decision = ?body.decision, error = %e, "decision failed");
            errors::engine_error_to_response(e)
        }
    }
}
