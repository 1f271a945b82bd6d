use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    routing::{get, post},
};

use pricepilot_catalog::Product;
use pricepilot_infra::EngineError;

use crate::app::{dto, errors};
use crate::app::routes::common::{product_id, respond};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", post(upsert_product).get(list_products))
        .route("/:id", get(get_product))
        .route("/:id/sales", post(record_sales))
        .route("/:id/stock", post(record_stock))
        .route("/:id/forecast", get(get_forecast))
        .route("/:id/analysis", get(get_analysis))
        .route("/:id/trend", get(get_trend))
        .route("/:id/anomaly", get(get_anomaly))
        .route("/:id/price-history", get(get_price_history))
}

/// Insert or replace a product as synced from the marketplace.
pub async fn upsert_product(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<Product>,
) -> axum::response::Response {
    if let Err(e) = body.validate() {
        return errors::engine_error_to_response(e.into());
    }
    let result = services
        .engine
        .catalog()
        .upsert_product(body.clone())
        .map(|()| body)
        .map_err(EngineError::from);
    respond(StatusCode::OK, result)
}

pub async fn list_products(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    let result = services
        .engine
        .catalog()
        .list_products(false)
        .map(|items| serde_json::json!({ "items": items }))
        .map_err(EngineError::from);
    respond(StatusCode::OK, result)
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match product_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let result = services
        .engine
        .catalog()
        .get_product(id)
        .map_err(EngineError::from)
        .and_then(|p| p.ok_or_else(|| EngineError::NotFound(format!("product {id}"))));
    respond(StatusCode::OK, result)
}

pub async fn record_sales(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::RecordSalesRequest>,
) -> axum::response::Response {
    let id = match product_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if body.quantity < 0 || body.revenue.is_negative() {
        return errors::engine_error_to_response(EngineError::Validation(
            "quantity and revenue cannot be negative".to_string(),
        ));
    }
    let row = body.into_row(id);
    let result = services
        .engine
        .catalog()
        .upsert_sales(row.clone())
        .map(|()| row)
        .map_err(EngineError::from);
    respond(StatusCode::OK, result)
}

pub async fn record_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::RecordStockRequest>,
) -> axum::response::Response {
    let id = match product_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if body.warehouse.trim().is_empty() {
        return errors::engine_error_to_response(EngineError::Validation("warehouse cannot be empty".to_string()));
    }
    let snapshot = body.into_snapshot(id);
    let result = services
        .engine
        .catalog()
        .record_stock(snapshot.clone())
        .map(|()| snapshot)
        .map_err(EngineError::from);
    respond(StatusCode::OK, result)
}

pub async fn get_forecast(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    match product_id(&id) {
        Ok(id) => respond(StatusCode::OK, services.engine.forecast(id)),
        Err(resp) => resp,
    }
}

/// The score card plus the proposal it yields, if any.
pub async fn get_analysis(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match product_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let result = services.engine.analyze(id).and_then(|analysis| {
        let proposal = services.engine.recommend(id)?;
        Ok(serde_json::json!({ "analysis": analysis, "proposal": proposal }))
    });
    respond(StatusCode::OK, result)
}

pub async fn get_trend(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Query(q): Query<dto::TrendQuery>,
) -> axum::response::Response {
    match product_id(&id) {
        Ok(id) => respond(StatusCode::OK, services.engine.sales_trend(id, q.window_days)),
        Err(resp) => resp,
    }
}

pub async fn get_anomaly(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    match product_id(&id) {
        Ok(id) => respond(StatusCode::OK, services.engine.sales_anomaly(id)),
        Err(resp) => resp,
    }
}

pub async fn get_price_history(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match product_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let result = services
        .engine
        .price_history(id)
        .map(|items| serde_json::json!({ "product_id": id, "items": items }));
    respond(StatusCode::OK, result)
}
