//! Remote store behavior against mocked tracking servers

use std::time::Duration;

use serde_json::json;
use wiremock::{
    matchers::{method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

use tracking_server::entities::{Metric, Param, RunStatus, RunTag};
use tracking_server::error::TrackingError;
use tracking_server::store::{RestStore, TrackingStore};

const RUN_ID: &str = "0123456789abcdef0123456789abcdef";

fn create_client(server: &MockServer, read_retries: u32) -> RestStore {
    RestStore::with_base_url(&server.uri(), Duration::from_secs(5), read_retries)
        .unwrap()
        .with_retry_backoff(Duration::from_millis(1))
}

fn run_json() -> serde_json::Value {
    json!({
        "run": {
            "info": {
                "run_id": RUN_ID,
                "experiment_id": 0,
                "user_id": "tester",
                "status": "RUNNING",
                "start_time": 1000,
                "end_time": null,
                "lifecycle_stage": "active",
                "artifact_uri": "./artifacts/0/0123456789abcdef0123456789abcdef/artifacts"
            },
            "data": {
                "metrics": [{"key": "loss", "value": 0.3, "timestamp": 2000, "step": 1}],
                "params": [],
                "tags": []
            }
        }
    })
}

#[tokio::test]
async fn test_server_error_is_surfaced_unchanged() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/2.0/mlflow/runs/log-batch"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error_code": "INVALID_STATE",
            "message": "The run must be in the 'active' state."
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = create_client(&server, 3);
    let err = store
        .batch_log(RUN_ID, &[Metric::new("loss", 0.1, 1, 0)], &[], &[])
        .await
        .unwrap_err();

    assert_eq!(
        err,
        TrackingError::InvalidState("The run must be in the 'active' state.".to_string())
    );
}

#[tokio::test]
async fn test_unstructured_error_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/2.0/mlflow/runs/set-tag"))
        .respond_with(ResponseTemplate::new(502).set_body_string("<html>Bad Gateway</html>"))
        .mount(&server)
        .await;

    let store = create_client(&server, 0);
    let err = store
        .set_tag(RUN_ID, &RunTag::new("team", "vision"))
        .await
        .unwrap_err();

    assert!(err.is_unavailable());
    assert!(err.message().contains("502"));
}

#[tokio::test]
async fn test_reads_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/2.0/mlflow/runs/get"))
        .and(query_param("run_id", RUN_ID))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/2.0/mlflow/runs/get"))
        .respond_with(ResponseTemplate::new(200).set_body_json(run_json()))
        .expect(1)
        .mount(&server)
        .await;

    let store = create_client(&server, 3);
    let run = store.get_run(RUN_ID).await.unwrap();

    assert_eq!(run.info.status, RunStatus::Running);
    assert_eq!(run.data.metric("loss"), Some(0.3));
}

#[tokio::test]
async fn test_read_retries_are_bounded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/2.0/mlflow/metrics/get-history"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let store = create_client(&server, 2);
    let err = store.get_metric_history(RUN_ID, "loss").await.unwrap_err();
    assert!(err.is_unavailable());
}

#[tokio::test]
async fn test_structured_read_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/2.0/mlflow/experiments/get-by-name"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error_code": "RESOURCE_DOES_NOT_EXIST",
            "message": "Could not find experiment with name 'missing'"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = create_client(&server, 3);
    assert!(store.get_experiment_by_name("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_mutations_are_never_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/2.0/mlflow/runs/log-metric"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let store = create_client(&server, 5);
    let err = store
        .log_metric(RUN_ID, &Metric::new("loss", 0.5, 1000, 0))
        .await
        .unwrap_err();
    assert!(err.is_unavailable());
}

#[tokio::test]
async fn test_batch_request_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/2.0/mlflow/runs/log-batch"))
        .and(wiremock::matchers::body_json(json!({
            "run_id": RUN_ID,
            "metrics": [{"key": "loss", "value": 0.5, "timestamp": 1000, "step": 2}],
            "params": [{"key": "lr", "value": "0.01"}],
            "tags": []
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let store = create_client(&server, 0);
    store
        .batch_log(
            RUN_ID,
            &[Metric::new("loss", 0.5, 1000, 2)],
            &[Param::new("lr", "0.01")],
            &[],
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_malformed_success_body_is_internal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/2.0/mlflow/experiments/create"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let store = create_client(&server, 0);
    let err = store.create_experiment("vision", None).await.unwrap_err();
    assert!(matches!(err, TrackingError::Internal(_)));
}

#[tokio::test]
async fn test_connection_refused_is_unavailable() {
    // Bind then drop to get a port nothing listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let store = RestStore::with_base_url(
        &format!("http://127.0.0.1:{}", port),
        Duration::from_secs(2),
        0,
    )
    .unwrap();

    let err = store.get_experiment(0).await.unwrap_err();
    assert!(err.is_unavailable());

    let err = store
        .log_param(RUN_ID, &Param::new("lr", "0.1"))
        .await
        .unwrap_err();
    assert!(err.is_unavailable());
}
