mod common;

use axum::http::{Method, StatusCode};
use common::{json_body, TestApp};
use rstest::rstest;
use serde_json::{json, Value};
use uuid::Uuid;

fn item<'a>(items: &'a Value, name: &str) -> &'a Value {
    items
        .as_array()
        .expect("array of items")
        .iter()
        .find(|i| i["name"] == name)
        .unwrap_or_else(|| panic!("item {} missing", name))
}

#[tokio::test]
async fn repeated_ingestion_accumulates() {
    let app = TestApp::new().await;

    app.ingest(json!({"Eggs": 10})).await;
    let report = app.ingest(json!({"Eggs": 5})).await;

    assert_eq!(report["applied"], 1);
    assert_eq!(report["results"][0]["total_added"], 15);
    assert_eq!(report["results"][0]["current_quantity"], 15);
}

#[tokio::test]
async fn invalid_counts_are_skipped_not_applied() {
    let app = TestApp::new().await;

    let report = app
        .ingest(json!({"Eggs": 10, "Bad": -3, "Milk": 0, "Note": "three", "Half": 0.5}))
        .await;

    assert_eq!(report["applied"], 1);
    assert_eq!(report["failed"], 0);
    assert_eq!(report["skipped"].as_array().unwrap().len(), 4);

    let response = app
        .request_authenticated(Method::GET, "/api/v1/inventory", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let items = json_body(response).await["data"].clone();
    assert_eq!(items.as_array().unwrap().len(), 1);
    assert_eq!(item(&items, "Eggs")["current_quantity"], 10);
}

#[tokio::test]
async fn failing_item_does_not_undo_the_rest_of_the_batch() {
    let app = TestApp::new().await;
    let long_name = "x".repeat(300);

    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/inventory/ingest",
            Some(json!({"detections": {"Eggs": 3, long_name.as_str(): 2}})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let report = json_body(response).await["data"].clone();

    assert_eq!(report["applied"], 1);
    assert_eq!(report["failed"], 1);
    let failed = item(&report["results"], &long_name);
    assert!(failed["error"]
        .as_str()
        .unwrap()
        .contains("exceeds 255 characters"));
    assert!(failed.get("total_added").is_none());
    assert_eq!(item(&report["results"], "Eggs")["total_added"], 3);

    let response = app
        .request_authenticated(Method::GET, "/api/v1/inventory", None)
        .await;
    let items = json_body(response).await["data"].clone();
    assert_eq!(items.as_array().unwrap().len(), 1);
    assert_eq!(item(&items, "Eggs")["current_quantity"], 3);
}

#[tokio::test]
async fn empty_batch_is_a_no_op() {
    let app = TestApp::new().await;
    let report = app.ingest(json!({})).await;
    assert_eq!(report["applied"], 0);
    assert!(report["results"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn detections_must_be_an_object() {
    let app = TestApp::new().await;
    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/inventory/ingest",
            Some(json!({"detections": [1, 2, 3]})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn inventory_is_listed_by_name() {
    let app = TestApp::new().await;
    app.ingest(json!({"Tomatoes": 3, "Basil": 1, "Mozzarella": 2}))
        .await;

    let response = app
        .request_authenticated(Method::GET, "/api/v1/inventory", None)
        .await;
    let items = json_body(response).await["data"].clone();
    let names: Vec<&str> = items
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Basil", "Mozzarella", "Tomatoes"]);
}

#[tokio::test]
async fn sale_debits_ledger_and_records_sale() {
    let app = TestApp::new().await;
    app.ingest(json!({"Burger Buns": 20})).await;

    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/sales",
            Some(json!({"item": "Burger Buns", "quantity": 7})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    assert_eq!(body["data"]["item"]["current_quantity"], 13);
    assert_eq!(body["data"]["item"]["total_sold"], 7);
    assert_eq!(body["data"]["item"]["total_added"], 20);
    assert_eq!(body["data"]["sale"]["quantity"], 7);

    let entry_id = body["data"]["item"]["id"].as_str().unwrap().to_string();
    let response = app
        .request_authenticated(
            Method::GET,
            &format!("/api/v1/sales?entry_id={}", entry_id),
            None,
        )
        .await;
    let sales = json_body(response).await["data"].clone();
    assert_eq!(sales.as_array().unwrap().len(), 1);
    assert_eq!(sales[0]["quantity"], 7);
    assert_eq!(sales[0]["item_name"], "Burger Buns");
}

#[tokio::test]
async fn sale_by_entry_id_works() {
    let app = TestApp::new().await;
    let report = app.ingest(json!({"Lettuce": 4})).await;
    assert_eq!(report["applied"], 1);

    let response = app
        .request_authenticated(Method::GET, "/api/v1/inventory", None)
        .await;
    let items = json_body(response).await["data"].clone();
    let id = item(&items, "Lettuce")["id"].as_str().unwrap().to_string();

    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/sales",
            Some(json!({"item": id, "quantity": 4})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    assert_eq!(body["data"]["item"]["current_quantity"], 0);
}

#[tokio::test]
async fn uuid_shaped_name_is_sold_through_item_name() {
    let app = TestApp::new().await;
    let label = Uuid::new_v4().to_string();
    app.ingest(json!({label.as_str(): 6})).await;

    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/sales",
            Some(json!({"item": label, "quantity": 1})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/sales",
            Some(json!({"item_name": label, "quantity": 2})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    assert_eq!(body["data"]["item"]["name"], label.as_str());
    assert_eq!(body["data"]["item"]["current_quantity"], 4);

    let entry_id = body["data"]["item"]["id"].clone();
    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/sales",
            Some(json!({"item_id": entry_id, "quantity": 4})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(json_body(response).await["data"]["item"]["current_quantity"], 0);
}

#[rstest]
#[case(json!({"quantity": 1}))]
#[case(json!({"item": "Eggs", "item_name": "Eggs", "quantity": 1}))]
#[tokio::test]
async fn sale_needs_exactly_one_item_selector(#[case] body: Value) {
    let app = TestApp::new().await;
    app.ingest(json!({"Eggs": 5})).await;

    let response = app
        .request_authenticated(Method::POST, "/api/v1/sales", Some(body))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn oversell_is_rejected_with_quantities() {
    let app = TestApp::new().await;
    app.ingest(json!({"Cheddar Cheese": 3})).await;

    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/sales",
            Some(json!({"item": "Cheddar Cheese", "quantity": 5})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await;
    assert_eq!(body["context"]["available"], 3);
    assert_eq!(body["context"]["requested"], 5);

    let response = app
        .request_authenticated(Method::GET, "/api/v1/sales", None)
        .await;
    let sales = json_body(response).await["data"].clone();
    assert!(sales.as_array().unwrap().is_empty());

    let response = app
        .request_authenticated(Method::GET, "/api/v1/inventory", None)
        .await;
    let items = json_body(response).await["data"].clone();
    assert_eq!(item(&items, "Cheddar Cheese")["current_quantity"], 3);
    assert_eq!(item(&items, "Cheddar Cheese")["total_sold"], 0);
}

#[rstest]
#[case(json!(0))]
#[case(json!(-1))]
#[case(json!("3"))]
#[case(json!(2.5))]
#[tokio::test]
async fn invalid_sale_quantity_is_rejected(#[case] quantity: Value) {
    let app = TestApp::new().await;
    app.ingest(json!({"Ground Beef": 15})).await;

    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/sales",
            Some(json!({"item": "Ground Beef", "quantity": quantity})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn sale_of_unknown_item_is_not_found() {
    let app = TestApp::new().await;
    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/sales",
            Some(json!({"item": "Truffles", "quantity": 1})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn other_business_sees_nothing() {
    let app = TestApp::new().await;
    app.ingest(json!({"Eggs": 12})).await;

    let response = app
        .request_authenticated(Method::GET, "/api/v1/inventory", None)
        .await;
    let items = json_body(response).await["data"].clone();
    let eggs_id = item(&items, "Eggs")["id"].as_str().unwrap().to_string();

    let other = app.token_for(Uuid::new_v4());

    let response = app
        .request(Method::GET, "/api/v1/inventory", None, Some(&other))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(json_body(response).await["data"]
        .as_array()
        .unwrap()
        .is_empty());

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/inventory/{}", eggs_id),
            None,
            Some(&other),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    for reference in [eggs_id.as_str(), "Eggs"] {
        let response = app
            .request(
                Method::POST,
                "/api/v1/sales",
                Some(json!({"item": reference, "quantity": 1})),
                Some(&other),
            )
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    let response = app
        .request_authenticated(Method::GET, &format!("/api/v1/inventory/{}", eggs_id), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["data"]["current_quantity"], 12);
}

#[tokio::test]
async fn ledger_routes_require_a_token() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/api/v1/inventory", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .request(Method::GET, "/api/v1/inventory", None, Some("not-a-jwt"))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.request(Method::GET, "/api/v1/status", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn health_reports_database_status() {
    let app = TestApp::new().await;
    let response = app.request(Method::GET, "/api/v1/health", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["data"]["checks"]["database"], "healthy");
}

#[tokio::test]
async fn sample_feed_loads_items_and_writes_test_report() {
    let app = TestApp::new().await;

    let response = app
        .request_authenticated(Method::POST, "/api/v1/test-inventory-data", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let data = json_body(response).await["data"].clone();
    assert_eq!(data["updated_items"], 5);
    assert!(data["filename"]
        .as_str()
        .unwrap()
        .starts_with("inventory_report_test_"));

    let response = app
        .request_authenticated(Method::GET, "/api/v1/inventory", None)
        .await;
    let items = json_body(response).await["data"].clone();
    assert_eq!(item(&items, "Burger Buns")["current_quantity"], 24);
    assert_eq!(item(&items, "Tomatoes")["current_quantity"], 12);
}

#[tokio::test]
async fn reporting_settings_round_trip() {
    let app = TestApp::new().await;

    let response = app
        .request_authenticated(Method::GET, "/api/v1/settings/reporting", None)
        .await;
    assert_eq!(json_body(response).await["data"]["reporting_frequency"], "weekly");

    let response = app
        .request_authenticated(
            Method::PUT,
            "/api/v1/settings/reporting",
            Some(json!({"reporting_frequency": "custom", "custom_reporting_days": 14})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let data = json_body(response).await["data"].clone();
    assert_eq!(data["reporting_frequency"], "custom");
    assert_eq!(data["custom_reporting_days"], 14);

    let response = app
        .request_authenticated(
            Method::PUT,
            "/api/v1/settings/reporting",
            Some(json!({"reporting_frequency": "hourly"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .request_authenticated(
            Method::PUT,
            "/api/v1/settings/reporting",
            Some(json!({"reporting_frequency": "custom", "custom_reporting_days": 0})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn responses_echo_request_id() {
    let app = TestApp::new().await;
    let response = app
        .request_authenticated(Method::GET, "/api/v1/inventory/not-a-uuid", None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.headers().contains_key("x-request-id"));
    let body = json_body(response).await;
    assert!(body["request_id"].is_string());
}
