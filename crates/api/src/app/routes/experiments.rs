use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use pricepilot_analytics::ExperimentKind;
use pricepilot_core::ExperimentId;
use pricepilot_infra::services::StartRequest;

use crate::app::{dto, errors};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", post(start_experiment).get(list_active_experiments))
        .route("/due", get(list_due))
        .route("/stuck", get(list_stuck))
        .route("/:id", get(get_experiment))
        .route("/:id/review", post(review_experiment))
        .route("/:id/complete", post(complete_experiment))
}

fn experiment_id(raw: &str) -> Result<ExperimentId, axum::response::Response> {
    errors::parse_param(raw, "invalid_id")
}

pub async fn start_experiment(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<StartRequest>,
) -> axum::response::Response {
    match services.engine.start_experiment(body).await {
        Ok(exp) => (StatusCode::CREATED, Json(dto::experiment_to_json(&exp))).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn list_active_experiments(
    Extension(services): Extension<Arc<AppServices>>,
    Query(q): Query<dto::KindQuery>,
) -> axum::response::Response {
    let kind = match q.kind.as_deref().map(|raw| errors::parse_param::<ExperimentKind>(raw, "invalid_kind")) {
        Some(Ok(k)) => Some(k),
        Some(Err(resp)) => return resp,
        None => None,
    };
    match services.engine.list_active_experiments(kind) {
        Ok(items) => {
            let items = items.iter().map(dto::active_experiment_to_json).collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn list_due(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.engine.due_for_review() {
        Ok(items) => {
            let items = items.iter().map(dto::experiment_to_json).collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn list_stuck(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.engine.stuck_experiments() {
        Ok(items) => {
            let items = items.iter().map(dto::experiment_to_json).collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn get_experiment(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match experiment_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.engine.get_experiment(id) {
        Ok(exp) => (StatusCode::OK, Json(dto::experiment_to_json(&exp))).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

/// Collect result metrics and attach a suggested verdict. Safe to repeat.
pub async fn review_experiment(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match experiment_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.engine.review_experiment(id).await {
        Ok(review) => (StatusCode::OK, Json(dto::review_to_json(&review))).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn complete_experiment(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::CompleteExperimentRequest>,
) -> axum::response::Response {
    let id = match experiment_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services
        .engine
        .complete_experiment(id, body.verdict, body.note, body.rollback)
        .await
    {
        Ok(exp) => (StatusCode::OK, Json(dto::experiment_to_json(&exp))).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
