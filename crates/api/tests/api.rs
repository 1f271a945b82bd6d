use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use chrono::{NaiveDate, TimeZone, Utc};
use serde_json::{Value, json};
use tower::ServiceExt;

use pricepilot_api::app::{AppServices, build_app};
use pricepilot_infra::clock::FixedClock;
use pricepilot_infra::config::AppConfig;
use pricepilot_infra::marketplace::{InMemoryMarketplace, MarketplaceError};

struct TestApp {
    router: Router,
    marketplace: Arc<InMemoryMarketplace>,
}

/// Router over fresh in-memory state at 2024-06-15 12:00 UTC.
fn spawn_app() -> TestApp {
    let marketplace = Arc::new(InMemoryMarketplace::new());
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap(),
        chrono_tz::UTC,
    ));
    let services = AppServices::in_memory(&AppConfig::default(), clock, marketplace.clone());
    TestApp {
        router: build_app(services),
        marketplace,
    }
}

impl TestApp {
    async fn call(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let body = match body {
            Some(v) => Body::from(v.to_string()),
            None => Body::empty(),
        };
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body)
            .unwrap();
        let res = self.router.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.call(Method::GET, uri, None).await
    }

    async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.call(Method::POST, uri, Some(body)).await
    }

    /// Product 1 at 1350.00 (cost 500.00), 4 units left, 2 sold per day for the last 30 days.
    async fn seed_short_on_stock(&self) {
        let (status, _) = self
            .post(
                "/products",
                json!({"id": 1, "offer_id": "SKU-1", "name": "Kettle", "price": 135000, "cost_price": 50000}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let yesterday = NaiveDate::from_ymd_opt(2024, 6, 14).unwrap();
        for offset in 0..30u64 {
            let date = yesterday - chrono::Days::new(offset);
            let (status, _) = self
                .post("/products/1/sales", json!({"date": date, "quantity": 2, "revenue": 270000}))
                .await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, _) = self
            .post(
                "/products/1/stock",
                json!({"warehouse": "main", "quantity": 4, "snapshot_date": "2024-06-14"}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }
}

#[tokio::test]
async fn health_is_ok() {
    let app = spawn_app();
    let (status, _) = app.get("/health").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn ingested_rows_drive_the_forecast() {
    let app = spawn_app();
    app.seed_short_on_stock().await;

    let (status, forecast) = app.get("/products/1/forecast").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(forecast["current_stock"], 4);
    assert_eq!(forecast["urgency"], "critical");

    let (_, low) = app.get("/inventory/low-stock?urgency=critical").await;
    assert_eq!(low["items"].as_array().unwrap().len(), 1);

    let (status, body) = app.get("/inventory/low-stock?urgency=soon").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_urgency");
}

#[tokio::test]
async fn invalid_product_is_rejected() {
    let app = spawn_app();
    let (status, body) = app
        .post(
            "/products",
            json!({"id": 2, "offer_id": " ", "name": "Kettle", "price": 100, "cost_price": 50}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (status, body) = app.get("/products/2").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn recommendation_flow_applies_price_once() {
    let app = spawn_app();
    app.seed_short_on_stock().await;

    let (status, report) = app.post("/recommendations/generate", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    let created = report["created"].as_array().unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0]["change_id"], "PR-20240615-SKU-1");
    assert_eq!(created[0]["recommended_price"], 149000);
    assert_eq!(created[0]["status"], "pending");

    let (_, pending) = app.get("/recommendations?status=pending").await;
    assert_eq!(pending["items"].as_array().unwrap().len(), 1);

    let (status, outcome) = app
        .post("/recommendations/PR-20240615-SKU-1/decision", json!({"decision": "approve"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["recommendation"]["status"], "applied");
    let experiment_id = outcome["experiment"]["id"].as_str().unwrap().to_string();
    assert_eq!(outcome["experiment"]["kind"], "price");
    assert_eq!(outcome["experiment"]["review_date"], "2024-06-22");

    // A retried approval returns the same experiment and does not touch the marketplace again.
    let (status, retry) = app
        .post("/recommendations/PR-20240615-SKU-1/decision", json!({"decision": "approve"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(retry["experiment"]["id"], experiment_id.as_str());
    assert_eq!(app.marketplace.calls().len(), 1);

    let (_, product) = app.get("/products/1").await;
    assert_eq!(product["price"], 149000);

    let (_, history) = app.get("/products/1/price-history").await;
    let items = history["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["source"], "recommendation");
    assert_eq!(items[0]["old_price"], 135000);

    let (_, active) = app.get("/experiments?kind=price").await;
    let items = active["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["days_left"], 7);
    assert_eq!(items[0]["overdue"], false);
}

#[tokio::test]
async fn rejected_recommendation_cannot_be_approved() {
    let app = spawn_app();
    app.seed_short_on_stock().await;
    app.post("/recommendations/generate", json!({})).await;

    let (status, _) = app
        .post("/recommendations/PR-20240615-SKU-1/decision", json!({"decision": "reject"}))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .post("/recommendations/PR-20240615-SKU-1/decision", json!({"decision": "approve"}))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invalid_transition");

    let (status, _) = app.get("/recommendations/PR-20240615-SKU-9").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn failed_apply_is_a_bad_gateway() {
    let app = spawn_app();
    app.seed_short_on_stock().await;
    app.post("/recommendations/generate", json!({})).await;
    app.marketplace.fail_next(MarketplaceError::Rejected("price locked".to_string()));

    let (status, body) = app
        .post("/recommendations/PR-20240615-SKU-1/decision", json!({"decision": "approve"}))
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "external_apply_failure");

    let (_, rec) = app.get("/recommendations/PR-20240615-SKU-1").await;
    assert_eq!(rec["status"], "failed");

    let (_, alerts) = app.get("/alerts").await;
    assert_eq!(alerts["items"][0]["kind"], "apply_failed");
}

#[tokio::test]
async fn experiment_lifecycle_over_http() {
    let app = spawn_app();
    app.seed_short_on_stock().await;

    let start = json!({
        "subject": {
            "kind": "content",
            "product_id": 1,
            "field": "description",
            "old_value": "A kettle.",
            "new_value": "A fast, quiet kettle."
        },
        "duration_days": 7
    });
    let (status, exp) = app.post("/experiments", start.clone()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(exp["status"], "active");
    assert_eq!(exp["baseline"]["orders"], 14);
    let id = exp["id"].as_str().unwrap().to_string();

    let (status, body) = app.post("/experiments", start).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    // No full day of results yet.
    let (status, _) = app.post(&format!("/experiments/{id}/review"), json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, done) = app
        .post(
            &format!("/experiments/{id}/complete"),
            json!({"verdict": "NEUTRAL", "note": "no visible effect"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["status"], "completed");
    assert_eq!(done["verdict"], "NEUTRAL");

    let (_, active) = app.get("/experiments?kind=content").await;
    assert!(active["items"].as_array().unwrap().is_empty());

    let (status, _) = app.get("/experiments/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn jobs_run_inline_and_raise_alerts() {
    let app = spawn_app();
    app.seed_short_on_stock().await;

    let (status, report) = app.post("/jobs/stock_alerts/run", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["job"], "stock_alerts");
    assert_eq!(report["failed"], 0);

    let (_, alerts) = app.get("/alerts").await;
    let kinds: Vec<&str> = alerts["items"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|a| a["kind"].as_str())
        .collect();
    assert!(kinds.contains(&"low_stock"));

    let (status, body) = app.post("/jobs/nightly/run", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "unknown_job");

    // No scheduler attached to this router.
    let (status, body) = app.post("/jobs/stock_alerts/trigger", json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "not_scheduled");
}
