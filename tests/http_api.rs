//! Tracking API handlers driven through the router

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use tracking_server::handlers::AppState;
use tracking_server::protocol::route;
use tracking_server::server::create_router;
use tracking_server::store::SqliteStore;

async fn create_app() -> Router {
    let store = SqliteStore::in_memory("./artifacts").await.unwrap();
    create_router(AppState::new(Arc::new(store), "./artifacts"), None)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, value)
}

async fn post(app: &Router, path: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(route(path))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

async fn get(app: &Router, path_and_query: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .uri(route(path_and_query))
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

async fn create_run(app: &Router) -> String {
    let (status, body) = post(
        app,
        "runs/create",
        json!({"experiment_id": "0", "user_id": "tester", "start_time": 1000}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["run"]["info"]["run_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_app().await;
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_experiment_endpoints() {
    let app = create_app().await;

    let (status, body) = post(&app, "experiments/create", json!({"name": "vision"})).await;
    assert_eq!(status, StatusCode::OK);
    let experiment_id = body["experiment_id"].as_str().unwrap().to_string();

    let (status, body) = post(&app, "experiments/create", json!({"name": "vision"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "RESOURCE_ALREADY_EXISTS");

    let (status, body) = get(&app, "experiments/get-by-name?experiment_name=vision").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["experiment"]["name"], "vision");

    let (status, body) = get(&app, "experiments/get-by-name?experiment_name=missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error_code"], "RESOURCE_DOES_NOT_EXIST");

    let (status, body) = post(
        &app,
        "experiments/delete",
        json!({"experiment_id": experiment_id}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({}));

    let (_, body) = get(&app, "experiments/list").await;
    assert_eq!(body["experiments"].as_array().unwrap().len(), 1);

    let (_, body) = get(&app, "experiments/list?view_type=ALL").await;
    assert_eq!(body["experiments"].as_array().unwrap().len(), 2);

    let (status, _) = get(&app, "experiments/get?experiment_id=abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_log_batch_and_get_run() {
    let app = create_app().await;
    let run_id = create_run(&app).await;

    let (status, body) = post(
        &app,
        "runs/log-batch",
        json!({
            "run_id": run_id,
            "metrics": [
                {"key": "loss", "value": 0.9, "timestamp": 1000, "step": 0},
                {"key": "loss", "value": 0.3, "timestamp": 2000, "step": 1}
            ],
            "params": [{"key": "lr", "value": "0.01"}],
            "tags": [{"key": "team", "value": "vision"}]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({}));

    let (status, body) = get(&app, &format!("runs/get?run_id={}", run_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["run"]["data"]["metrics"][0]["value"], 0.3);
    assert_eq!(body["run"]["data"]["params"][0]["value"], "0.01");
    assert_eq!(body["run"]["info"]["status"], "RUNNING");

    let (status, body) = get(
        &app,
        &format!("metrics/get-history?run_id={}&metric_key=loss", run_id),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["metrics"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_log_batch_errors() {
    let app = create_app().await;
    let run_id = create_run(&app).await;

    // Param value over 500 characters
    let (status, body) = post(
        &app,
        "runs/log-batch",
        json!({
            "run_id": run_id,
            "params": [{"key": "notes", "value": "x".repeat(501)}]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "INVALID_PARAMETER_VALUE");

    // Malformed JSON
    let request = Request::builder()
        .method("POST")
        .uri(route("runs/log-batch"))
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "INVALID_PARAMETER_VALUE");

    // Oversized body is rejected before parsing
    let request = Request::builder()
        .method("POST")
        .uri(route("runs/log-batch"))
        .body(Body::from(vec![b' '; 1_000_001]))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "INVALID_PARAMETER_VALUE");

    // Deleted run
    let (status, _) = post(&app, "runs/delete", json!({"run_id": run_id})).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = post(
        &app,
        "runs/log-batch",
        json!({"run_id": run_id, "tags": [{"key": "a", "value": "b"}]}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "INVALID_STATE");

    // Unknown run
    let (status, body) = post(
        &app,
        "runs/log-batch",
        json!({"run_id": "0123456789abcdef0123456789abcdef"}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error_code"], "RESOURCE_DOES_NOT_EXIST");
}

#[tokio::test]
async fn test_single_entity_logging_and_update() {
    let app = create_app().await;
    let run_id = create_run(&app).await;

    let (status, _) = post(
        &app,
        "runs/log-metric",
        json!({"run_id": run_id, "key": "acc", "value": 0.8, "timestamp": 1500}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = post(
        &app,
        "runs/log-parameter",
        json!({"run_id": run_id, "key": "lr", "value": "0.1"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = post(
        &app,
        "runs/log-parameter",
        json!({"run_id": run_id, "key": "lr", "value": "0.2"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "INVALID_PARAMETER_VALUE");

    let (status, _) = post(
        &app,
        "runs/set-tag",
        json!({"run_id": run_id, "key": "team", "value": "nlp"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = post(
        &app,
        "runs/update",
        json!({"run_id": run_id, "status": "FINISHED", "end_time": 3000}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["run_info"]["status"], "FINISHED");
    assert_eq!(body["run_info"]["end_time"], 3000);

    let (status, body) = post(
        &app,
        "runs/update",
        json!({"run_id": run_id, "status": "RUNNING"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "INVALID_STATE");
}

#[tokio::test]
async fn test_search_and_list_runs() {
    let app = create_app().await;
    let first = create_run(&app).await;
    let second = create_run(&app).await;

    for (run_id, loss) in [(&first, 0.9), (&second, 0.2)] {
        let (status, _) = post(
            &app,
            "runs/log-metric",
            json!({"run_id": run_id, "key": "loss", "value": loss, "timestamp": 1000}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = post(
        &app,
        "runs/search",
        json!({"experiment_ids": ["0"], "filter": "metrics.loss < 0.5"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let runs = body["runs"].as_array().unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0]["info"]["run_id"], second.as_str());

    let (status, body) = post(
        &app,
        "runs/search",
        json!({"experiment_ids": ["0"], "filter": "metrics.loss <"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "INVALID_PARAMETER_VALUE");

    let (status, _) = post(
        &app,
        "runs/search",
        json!({"experiment_ids": ["0"], "max_results": 0}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = get(&app, "runs/list?experiment_id=0").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["runs"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_list_artifacts_of_new_run_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_str().unwrap();
    let store = SqliteStore::in_memory(root).await.unwrap();
    let app = create_router(AppState::new(Arc::new(store), root), None);
    let run_id = create_run(&app).await;

    let (status, body) = get(&app, &format!("artifacts/list?run_id={}", run_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["files"].as_array().unwrap().is_empty());
    assert!(body["root_uri"].as_str().unwrap().ends_with("/artifacts"));
}

#[tokio::test]
async fn test_rename_experiment_endpoint() {
    let app = create_app().await;
    let (_, body) = post(&app, "experiments/create", json!({"name": "draft"})).await;
    let experiment_id = body["experiment_id"].as_str().unwrap().to_string();
    post(&app, "experiments/create", json!({"name": "taken"})).await;

    let (status, body) = post(
        &app,
        "experiments/update",
        json!({"experiment_id": experiment_id, "new_name": "final"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({}));

    let (_, body) = get(&app, &format!("experiments/get?experiment_id={}", experiment_id)).await;
    assert_eq!(body["experiment"]["name"], "final");

    let (status, body) = post(
        &app,
        "experiments/update",
        json!({"experiment_id": experiment_id, "new_name": "taken"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "RESOURCE_ALREADY_EXISTS");

    post(&app, "experiments/delete", json!({"experiment_id": experiment_id})).await;
    let (status, body) = post(
        &app,
        "experiments/update",
        json!({"experiment_id": experiment_id, "new_name": "again"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "INVALID_STATE");
}

#[tokio::test]
async fn test_create_nested_run() {
    let app = create_app().await;
    let parent = create_run(&app).await;

    let (status, body) = post(
        &app,
        "runs/create",
        json!({"experiment_id": "0", "parent_run_id": parent}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let tags = body["run"]["data"]["tags"].as_array().unwrap();
    assert!(tags.contains(&json!({"key": "mlflow.parentRunId", "value": parent})));
}

#[tokio::test]
async fn test_list_artifacts_outside_root_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_str().unwrap();
    let store = SqliteStore::in_memory(root).await.unwrap();
    let app = create_router(AppState::new(Arc::new(store), root), None);

    let (_, body) = post(
        &app,
        "experiments/create",
        json!({"name": "elsewhere", "artifact_location": "/etc"}),
    )
    .await;
    let experiment_id = body["experiment_id"].as_str().unwrap().to_string();
    let (status, body) = post(
        &app,
        "runs/create",
        json!({"experiment_id": experiment_id, "user_id": "tester"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let run_id = body["run"]["info"]["run_id"].as_str().unwrap().to_string();

    let (status, body) = get(&app, &format!("artifacts/list?run_id={}", run_id)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "INVALID_PARAMETER_VALUE");
    assert!(body.get("files").is_none());
}
