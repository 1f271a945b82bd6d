use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Query},
    http::StatusCode,
    routing::get,
};

use pricepilot_analytics::Urgency;
use pricepilot_core::Money;

use crate::app::{dto, errors};
use crate::app::routes::common::respond;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/low-stock", get(get_low_stock))
        .route("/overstock", get(get_overstock))
        .route("/summary", get(get_summary))
        .route("/reorder-plan", get(get_reorder_plan))
        .route("/anomalies", get(get_anomalies))
}

pub async fn get_low_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Query(q): Query<dto::LowStockQuery>,
) -> axum::response::Response {
    let urgency = match q.urgency.as_deref().map(|raw| errors::parse_param::<Urgency>(raw, "invalid_urgency")) {
        Some(Ok(u)) => Some(u),
        Some(Err(resp)) => return resp,
        None => None,
    };
    let result = services
        .engine
        .low_stock(urgency)
        .map(|items| serde_json::json!({ "items": items }));
    respond(StatusCode::OK, result)
}

pub async fn get_overstock(
    Extension(services): Extension<Arc<AppServices>>,
    Query(q): Query<dto::OverstockQuery>,
) -> axum::response::Response {
    let result = services
        .engine
        .overstock(q.threshold_days)
        .map(|items| serde_json::json!({ "items": items }));
    respond(StatusCode::OK, result)
}

pub async fn get_summary(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    respond(StatusCode::OK, services.engine.inventory_summary())
}

pub async fn get_reorder_plan(
    Extension(services): Extension<Arc<AppServices>>,
    Query(q): Query<dto::ReorderQuery>,
) -> axum::response::Response {
    let budget = q.max_total_cost.map(Money::from_minor);
    respond(StatusCode::OK, services.engine.reorder_plan(budget))
}

pub async fn get_anomalies(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    let result = services
        .engine
        .sales_anomalies()
        .map(|items| serde_json::json!({ "items": items }));
    respond(StatusCode::OK, result)
}
