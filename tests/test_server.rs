//! Integration tests: REST endpoints through the router

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use common::{sample_record, sample_record_json, shared_artifact};
use kolosal_credit::inference::CreditScorer;
use kolosal_credit::server::{create_router, AppState, ServerConfig};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn ready_app() -> Router {
    let scorer = CreditScorer::from_artifact(shared_artifact().clone()).unwrap();
    create_router(Arc::new(AppState::with_scorer(ServerConfig::default(), scorer)))
}

fn unready_app() -> Router {
    create_router(Arc::new(AppState::unready(
        ServerConfig::default(),
        "Model artifact not found: artifacts/ensemble_model.bin",
    )))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_unready_server_answers_503() {
    let (status, body) = send(unready_app(), get("/health")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unavailable");

    let (status, body) = send(unready_app(), post_json("/predict", sample_record_json().to_string())).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], true);

    let (status, _) = send(unready_app(), get("/model_info")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, body) = send(unready_app(), get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], false);
}

#[tokio::test]
async fn test_health_when_ready() {
    let (status, body) = send(ready_app(), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_predict_single_record() {
    let (status, body) = send(ready_app(), post_json("/predict", sample_record_json().to_string())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ID"], 1);

    let p = body["default_probability"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&p));
    let tier = body["risk_level"].as_str().unwrap();
    assert!(["Low", "Medium", "High", "Very High"].contains(&tier));
}

#[tokio::test]
async fn test_batch_predict_preserves_order() {
    let records: Vec<Value> = [7, 3, 11]
        .into_iter()
        .map(|id| {
            let mut record = sample_record();
            record.id = id;
            serde_json::to_value(record).unwrap()
        })
        .collect();
    let request = post_json("/batch_predict", json!({ "data": records }).to_string());

    let (status, body) = send(ready_app(), request).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<i64> = body.as_array().unwrap().iter().map(|r| r["ID"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![7, 3, 11]);
}

#[tokio::test]
async fn test_empty_batch_rejected() {
    let (status, _) = send(ready_app(), post_json("/batch_predict", r#"{"data": []}"#.to_string())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_json_rejected() {
    let (status, body) = send(ready_app(), post_json("/predict", "{\"ID\": 1,".to_string())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], true);
}

#[tokio::test]
async fn test_missing_column_rejected() {
    let mut record = sample_record_json();
    record.as_object_mut().unwrap().remove("LIMIT_BAL");

    let (status, body) = send(ready_app(), post_json("/predict", record.to_string())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("LIMIT_BAL"));
}

#[tokio::test]
async fn test_model_info_endpoint() {
    let (status, body) = send(ready_app(), get("/model_info")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["n_features"], 25);
    assert_eq!(body["input_features"][0], "ID");
    assert_eq!(body["model_type"], "StackedEnsemble");
}

#[tokio::test]
async fn test_unknown_route_and_wrong_method() {
    let (status, _) = send(ready_app(), get("/does_not_exist")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(ready_app(), get("/predict")).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}
