use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use featurewise::config::ServerConfig;
use featurewise::server::router;

fn app() -> Router {
    router(&ServerConfig::default())
}

async fn call(app: Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn post_json(path: &str, payload: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap();
    let (status, body) = call(app(), request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

fn table() -> Value {
    json!({
        "columns": [
            { "name": "g", "data": { "kind": "text", "values": ["A", "A", "B"] } },
            { "name": "x", "data": { "kind": "float", "values": [1.0, null, 5.0] } }
        ]
    })
}

#[tokio::test]
async fn health_and_scalers() {
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = call(app(), request).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["status"], "ok");

    let request = Request::builder().uri("/api/scalers").body(Body::empty()).unwrap();
    let (_, body) = call(app(), request).await;
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["methods"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn upload_parses_csv_and_suggests_strategies() {
    let request = Request::builder()
        .method("POST")
        .uri("/api/upload")
        .header(header::CONTENT_TYPE, "text/csv")
        .body(Body::from("city,temp\nParis,21.5\n,\nRome,25\n"))
        .unwrap();
    let (status, body) = call(app(), request).await;
    assert_eq!(status, StatusCode::OK);

    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["table"]["columns"][1]["data"]["kind"], "float");
    assert_eq!(body["suggested_imputation"]["city"], "mode");
    assert_eq!(body["suggested_imputation"]["temp"], "mean");
}

#[tokio::test]
async fn impute_then_aggregate() {
    let (status, imputed) = post_json(
        "/api/impute",
        json!({ "table": table(), "strategies": { "x": 0 } }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(imputed["columns"][1]["data"]["values"], json!([1.0, 0.0, 5.0]));

    let (status, grouped) = post_json(
        "/api/aggregate",
        json!({
            "table": imputed,
            "group_by": ["g"],
            "aggregations": [{ "column": "x", "func": "sum" }]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(grouped["columns"][1]["data"]["values"], json!([1.0, 5.0]));
}

#[tokio::test]
async fn schema_errors_map_to_unprocessable() {
    let (status, body) = post_json(
        "/api/drop-columns",
        json!({ "table": table(), "columns": ["missing"] }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["category"], "schema");
    assert!(body["error"].as_str().unwrap().contains("missing"));
}

#[tokio::test]
async fn unknown_scaler_is_a_bad_request() {
    let (status, body) = post_json(
        "/api/scale",
        json!({ "table": table(), "method": "log" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["category"], "config");
}

#[tokio::test]
async fn export_writes_csv() {
    let request = Request::builder()
        .method("POST")
        .uri("/api/export")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "table": table() }).to_string()))
        .unwrap();
    let (status, body) = call(app(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(String::from_utf8(body).unwrap(), "g,x\nA,1.0\nA,\nB,5.0\n");
}

#[tokio::test]
async fn select_k_best_over_http() {
    let payload = json!({
        "table": {
            "columns": [
                { "name": "a", "data": { "kind": "float", "values": [0.0, 1.0, 9.0, 10.0] } },
                { "name": "b", "data": { "kind": "float", "values": [1.0, 2.0, 1.0, 2.0] } },
                { "name": "y", "data": { "kind": "integer", "values": [0, 0, 1, 1] } }
            ]
        },
        "target": "y",
        "method": "k_best",
        "k": 1
    });
    let (status, body) = post_json("/api/select", payload).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["columns"][0]["name"], "a");
    assert_eq!(body["columns"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn datetime_fields_in_requested_order() {
    let payload = json!({
        "table": {
            "columns": [
                { "name": "d", "data": { "kind": "text", "values": ["2024-01-06", null] } }
            ]
        },
        "column": "d",
        "fields": ["month", "day_of_week"]
    });
    let (status, body) = post_json("/api/datetime", payload).await;
    assert_eq!(status, StatusCode::OK);

    let names: Vec<&str> = body["columns"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["d", "d_month", "d_day_of_week"]);
    assert_eq!(body["columns"][2]["data"]["values"], json!([5, null]));
}
