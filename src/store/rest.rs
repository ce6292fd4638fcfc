//! Remote tracking store
//!
//! Each store call becomes exactly one HTTP request to a tracking server.
//! Server errors are surfaced with their original code and message;
//! transport failures become `StoreUnavailable`. Only read-only (GET)
//! calls are retried.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use crate::config::ClientConfig;
use crate::entities::{Experiment, Metric, Param, Run, RunInfo, RunStatus, RunTag, ViewType};
use crate::error::{ErrorBody, Result, TrackingError};
use crate::logging::truncate_for_log;
use crate::protocol::{self, paths};
use crate::store::{RunCreate, TrackingStore};

/// Store that forwards every call to a tracking server over HTTP
#[derive(Clone)]
pub struct RestStore {
    client: reqwest::Client,
    base_url: String,
    read_retries: u32,
    retry_backoff: Duration,
}

impl RestStore {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        Self::with_base_url(
            &config.tracking_uri,
            Duration::from_secs(config.timeout_seconds),
            config.read_retries,
        )
    }

    pub fn with_base_url(base_url: &str, timeout: Duration, read_retries: u32) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TrackingError::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            read_retries,
            retry_backoff: Duration::from_millis(500),
        })
    }

    /// Base delay between read retries; attempt `n` waits `n * backoff`
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, protocol::route(path))
    }

    /// Mutating call: sent once, never retried
    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(path, e))?;

        decode_response(path, response).await
    }

    /// Read-only call, retried on `StoreUnavailable`
    async fn get<Q, T>(&self, path: &str, query: &Q) -> Result<T>
    where
        Q: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut attempt = 0;
        loop {
            let result = match self.client.get(self.url(path)).query(query).send().await {
                Ok(response) => decode_response(path, response).await,
                Err(e) => Err(transport_error(path, e)),
            };

            match result {
                Err(e) if e.is_unavailable() && attempt < self.read_retries => {
                    attempt += 1;
                    tracing::warn!(
                        endpoint = %path,
                        attempt,
                        max_retries = self.read_retries,
                        error = %e,
                        "Tracking server unavailable, retrying read"
                    );
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                }
                other => return other,
            }
        }
    }

    /// List artifacts of a run under `path` (relative to its artifact root)
    pub async fn list_artifacts(
        &self,
        run_id: &str,
        path: Option<&str>,
    ) -> Result<protocol::ListArtifactsResponse> {
        self.get(
            paths::LIST_ARTIFACTS,
            &protocol::ListArtifactsRequest {
                run_id: run_id.to_string(),
                path: path.map(str::to_string),
            },
        )
        .await
    }
}

fn transport_error(path: &str, err: reqwest::Error) -> TrackingError {
    let kind = if err.is_timeout() {
        "timed out"
    } else if err.is_connect() {
        "could not connect"
    } else {
        "failed"
    };
    tracing::warn!(endpoint = %path, error = %err, "Tracking server request {}", kind);
    TrackingError::unavailable(format!("Request to tracking server {} ({}): {}", kind, path, err))
}

async fn decode_response<T: DeserializeOwned>(path: &str, response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|e| transport_error(path, e))?;

    if status.is_success() {
        return serde_json::from_slice(&body).map_err(|e| {
            TrackingError::internal(format!(
                "Malformed response from tracking server ({}): {}",
                path, e
            ))
        });
    }

    match serde_json::from_slice::<ErrorBody>(&body) {
        Ok(error) => Err(TrackingError::from_wire(error)),
        Err(_) => {
            let text = String::from_utf8_lossy(&body);
            tracing::warn!(
                endpoint = %path,
                status = %status,
                body = %truncate_for_log(&text, 200),
                "Unstructured error response from tracking server"
            );
            Err(TrackingError::unavailable(format!(
                "Tracking server returned HTTP {} for {}: {}",
                status,
                path,
                truncate_for_log(&text, 200)
            )))
        }
    }
}

fn parse_returned_experiment_id(id: &str) -> Result<i64> {
    id.parse().map_err(|_| {
        TrackingError::internal(format!("Tracking server returned invalid experiment id '{}'", id))
    })
}

#[async_trait]
impl TrackingStore for RestStore {
    async fn create_experiment(&self, name: &str, artifact_location: Option<&str>) -> Result<i64> {
        let response: protocol::CreateExperimentResponse = self
            .post(
                paths::CREATE_EXPERIMENT,
                &protocol::CreateExperimentRequest {
                    name: name.to_string(),
                    artifact_location: artifact_location.map(str::to_string),
                },
            )
            .await?;
        parse_returned_experiment_id(&response.experiment_id)
    }

    async fn get_experiment(&self, experiment_id: i64) -> Result<Experiment> {
        let response: protocol::GetExperimentResponse = self
            .get(
                paths::GET_EXPERIMENT,
                &protocol::ExperimentIdRequest {
                    experiment_id: experiment_id.to_string(),
                },
            )
            .await?;
        Ok(response.experiment)
    }

    async fn get_experiment_by_name(&self, name: &str) -> Result<Option<Experiment>> {
        let result: Result<protocol::GetExperimentResponse> = self
            .get(
                paths::GET_EXPERIMENT_BY_NAME,
                &protocol::GetExperimentByNameRequest {
                    experiment_name: name.to_string(),
                },
            )
            .await;
        match result {
            Ok(response) => Ok(Some(response.experiment)),
            Err(TrackingError::ResourceDoesNotExist(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn list_experiments(&self, view_type: ViewType) -> Result<Vec<Experiment>> {
        let response: protocol::ListExperimentsResponse = self
            .get(paths::LIST_EXPERIMENTS, &protocol::ListExperimentsRequest { view_type })
            .await?;
        Ok(response.experiments)
    }

    async fn delete_experiment(&self, experiment_id: i64) -> Result<()> {
        let _: protocol::Empty = self
            .post(
                paths::DELETE_EXPERIMENT,
                &protocol::ExperimentIdRequest {
                    experiment_id: experiment_id.to_string(),
                },
            )
            .await?;
        Ok(())
    }

    async fn restore_experiment(&self, experiment_id: i64) -> Result<()> {
        let _: protocol::Empty = self
            .post(
                paths::RESTORE_EXPERIMENT,
                &protocol::ExperimentIdRequest {
                    experiment_id: experiment_id.to_string(),
                },
            )
            .await?;
        Ok(())
    }

    async fn rename_experiment(&self, experiment_id: i64, new_name: &str) -> Result<()> {
        let _: protocol::Empty = self
            .post(
                paths::UPDATE_EXPERIMENT,
                &protocol::UpdateExperimentRequest {
                    experiment_id: experiment_id.to_string(),
                    new_name: new_name.to_string(),
                },
            )
            .await?;
        Ok(())
    }

    async fn create_run(&self, request: RunCreate) -> Result<Run> {
        let response: protocol::RunResponse = self
            .post(
                paths::CREATE_RUN,
                &protocol::CreateRunRequest {
                    experiment_id: request.experiment_id.to_string(),
                    user_id: request.user_id,
                    start_time: request.start_time,
                    tags: request.tags,
                    run_name: request.run_name,
                    parent_run_id: request.parent_run_id,
                },
            )
            .await?;
        Ok(response.run)
    }

    async fn get_run(&self, run_id: &str) -> Result<Run> {
        let response: protocol::RunResponse = self
            .get(
                paths::GET_RUN,
                &protocol::RunIdRequest {
                    run_id: run_id.to_string(),
                },
            )
            .await?;
        Ok(response.run)
    }

    async fn update_run_info(
        &self,
        run_id: &str,
        status: RunStatus,
        end_time: Option<i64>,
    ) -> Result<RunInfo> {
        let response: protocol::UpdateRunResponse = self
            .post(
                paths::UPDATE_RUN,
                &protocol::UpdateRunRequest {
                    run_id: run_id.to_string(),
                    status,
                    end_time,
                },
            )
            .await?;
        Ok(response.run_info)
    }

    async fn delete_run(&self, run_id: &str) -> Result<()> {
        let _: protocol::Empty = self
            .post(
                paths::DELETE_RUN,
                &protocol::RunIdRequest {
                    run_id: run_id.to_string(),
                },
            )
            .await?;
        Ok(())
    }

    async fn restore_run(&self, run_id: &str) -> Result<()> {
        let _: protocol::Empty = self
            .post(
                paths::RESTORE_RUN,
                &protocol::RunIdRequest {
                    run_id: run_id.to_string(),
                },
            )
            .await?;
        Ok(())
    }

    async fn list_run_infos(&self, experiment_id: i64, view_type: ViewType) -> Result<Vec<RunInfo>> {
        let response: protocol::ListRunInfosResponse = self
            .get(
                paths::LIST_RUNS,
                &protocol::ListRunInfosRequest {
                    experiment_id: experiment_id.to_string(),
                    run_view_type: view_type,
                },
            )
            .await?;
        Ok(response.runs)
    }

    async fn log_metric(&self, run_id: &str, metric: &Metric) -> Result<()> {
        let _: protocol::Empty = self
            .post(
                paths::LOG_METRIC,
                &protocol::LogMetricRequest {
                    run_id: run_id.to_string(),
                    key: metric.key.clone(),
                    value: metric.value,
                    timestamp: metric.timestamp,
                    step: metric.step,
                },
            )
            .await?;
        Ok(())
    }

    async fn log_param(&self, run_id: &str, param: &Param) -> Result<()> {
        let _: protocol::Empty = self
            .post(
                paths::LOG_PARAM,
                &protocol::LogParamRequest {
                    run_id: run_id.to_string(),
                    key: param.key.clone(),
                    value: param.value.clone(),
                },
            )
            .await?;
        Ok(())
    }

    async fn set_tag(&self, run_id: &str, tag: &RunTag) -> Result<()> {
        let _: protocol::Empty = self
            .post(
                paths::SET_TAG,
                &protocol::SetTagRequest {
                    run_id: run_id.to_string(),
                    key: tag.key.clone(),
                    value: tag.value.clone(),
                },
            )
            .await?;
        Ok(())
    }

    async fn get_metric_history(&self, run_id: &str, metric_key: &str) -> Result<Vec<Metric>> {
        let response: protocol::GetMetricHistoryResponse = self
            .get(
                paths::GET_METRIC_HISTORY,
                &protocol::GetMetricHistoryRequest {
                    run_id: run_id.to_string(),
                    metric_key: metric_key.to_string(),
                },
            )
            .await?;
        Ok(response.metrics)
    }

    async fn search_runs(
        &self,
        experiment_ids: &[i64],
        filter: &str,
        view_type: ViewType,
        max_results: usize,
    ) -> Result<Vec<Run>> {
        let response: protocol::SearchRunsResponse = self
            .post(
                paths::SEARCH_RUNS,
                &protocol::SearchRunsRequest {
                    experiment_ids: experiment_ids.iter().map(i64::to_string).collect(),
                    filter: filter.to_string(),
                    run_view_type: view_type,
                    max_results: Some(max_results as i64),
                },
            )
            .await?;
        Ok(response.runs)
    }

    async fn batch_log(
        &self,
        run_id: &str,
        metrics: &[Metric],
        params: &[Param],
        tags: &[RunTag],
    ) -> Result<()> {
        let _: protocol::Empty = self
            .post(
                paths::LOG_BATCH,
                &protocol::LogBatchPayload {
                    run_id,
                    metrics,
                    params,
                    tags,
                },
            )
            .await?;
        Ok(())
    }
}
