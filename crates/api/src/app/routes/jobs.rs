use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};

use pricepilot_infra::scheduler::{JobName, jobs};

use crate::app::errors;
use crate::app::routes::common::respond;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/:name/trigger", post(trigger_job))
        .route("/:name/run", post(run_job))
}

/// Queue a run on the scheduler. At most one run per job is pending at a time.
pub async fn trigger_job(
    Extension(services): Extension<Arc<AppServices>>,
    Path(name): Path<String>,
) -> axum::response::Response {
    let job: JobName = match errors::parse_param(&name, "unknown_job") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if !services.jobs.scheduled(job) {
        return errors::json_error(StatusCode::CONFLICT, "not_scheduled", format!("{job} is not running"));
    }
    let queued = services.jobs.trigger(job);
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "job": job, "queued": queued })),
    )
        .into_response()
}

/// Run a job inline and return its report.
pub async fn run_job(
    Extension(services): Extension<Arc<AppServices>>,
    Path(name): Path<String>,
) -> axum::response::Response {
    let job: JobName = match errors::parse_param(&name, "unknown_job") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, jobs::run(job, &services.engine).await)
}
