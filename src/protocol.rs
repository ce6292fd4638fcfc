//! Wire messages of the tracking REST API
//!
//! POST endpoints take these structs as JSON bodies, GET endpoints as query
//! strings. Experiment ids travel as strings and are parsed on arrival.

use serde::{Deserialize, Serialize};

use crate::entities::{Experiment, FileInfo, Metric, Param, Run, RunInfo, RunStatus, RunTag, ViewType};

/// Common prefix of every tracking endpoint
pub const API_PREFIX: &str = "/api/2.0/mlflow";

/// Endpoint paths relative to [`API_PREFIX`]
pub mod paths {
    pub const CREATE_EXPERIMENT: &str = "experiments/create";
    pub const GET_EXPERIMENT: &str = "experiments/get";
    pub const GET_EXPERIMENT_BY_NAME: &str = "experiments/get-by-name";
    pub const LIST_EXPERIMENTS: &str = "experiments/list";
    pub const DELETE_EXPERIMENT: &str = "experiments/delete";
    pub const RESTORE_EXPERIMENT: &str = "experiments/restore";
    pub const UPDATE_EXPERIMENT: &str = "experiments/update";
    pub const CREATE_RUN: &str = "runs/create";
    pub const GET_RUN: &str = "runs/get";
    pub const UPDATE_RUN: &str = "runs/update";
    pub const DELETE_RUN: &str = "runs/delete";
    pub const RESTORE_RUN: &str = "runs/restore";
    pub const LIST_RUNS: &str = "runs/list";
    pub const LOG_METRIC: &str = "runs/log-metric";
    pub const LOG_PARAM: &str = "runs/log-parameter";
    pub const SET_TAG: &str = "runs/set-tag";
    pub const LOG_BATCH: &str = "runs/log-batch";
    pub const SEARCH_RUNS: &str = "runs/search";
    pub const GET_METRIC_HISTORY: &str = "metrics/get-history";
    pub const LIST_ARTIFACTS: &str = "artifacts/list";
}

/// Full route for an endpoint path
pub fn route(path: &str) -> String {
    format!("{}/{}", API_PREFIX, path)
}

/// Body of every successful mutation without a payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateExperimentRequest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_location: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateExperimentResponse {
    pub experiment_id: String,
}

/// Used by get, delete and restore
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentIdRequest {
    pub experiment_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateExperimentRequest {
    pub experiment_id: String,
    pub new_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetExperimentResponse {
    pub experiment: Experiment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetExperimentByNameRequest {
    pub experiment_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListExperimentsRequest {
    #[serde(default)]
    pub view_type: ViewType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListExperimentsResponse {
    #[serde(default)]
    pub experiments: Vec<Experiment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRunRequest {
    pub experiment_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    #[serde(default)]
    pub tags: Vec<RunTag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_run_id: Option<String>,
}

/// Response carrying a single run (create and get)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResponse {
    pub run: Run,
}

/// Used by get, delete and restore
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunIdRequest {
    pub run_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRunRequest {
    pub run_id: String,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRunResponse {
    pub run_info: RunInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListRunInfosRequest {
    pub experiment_id: String,
    #[serde(default)]
    pub run_view_type: ViewType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListRunInfosResponse {
    #[serde(default)]
    pub runs: Vec<RunInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogMetricRequest {
    pub run_id: String,
    pub key: String,
    pub value: f64,
    pub timestamp: i64,
    #[serde(default)]
    pub step: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogParamRequest {
    pub run_id: String,
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetTagRequest {
    pub run_id: String,
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogBatchRequest {
    pub run_id: String,
    #[serde(default)]
    pub metrics: Vec<Metric>,
    #[serde(default)]
    pub params: Vec<Param>,
    #[serde(default)]
    pub tags: Vec<RunTag>,
}

/// Borrowed form of [`LogBatchRequest`], serialized identically
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LogBatchPayload<'a> {
    pub run_id: &'a str,
    pub metrics: &'a [Metric],
    pub params: &'a [Param],
    pub tags: &'a [RunTag],
}

impl LogBatchPayload<'_> {
    /// Length in bytes of the JSON wire form
    pub fn serialized_len(&self) -> crate::error::Result<usize> {
        Ok(serde_json::to_vec(self)?.len())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetMetricHistoryRequest {
    pub run_id: String,
    pub metric_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetMetricHistoryResponse {
    #[serde(default)]
    pub metrics: Vec<Metric>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRunsRequest {
    #[serde(default)]
    pub experiment_ids: Vec<String>,
    #[serde(default)]
    pub filter: String,
    #[serde(default)]
    pub run_view_type: ViewType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_results: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRunsResponse {
    #[serde(default)]
    pub runs: Vec<Run>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListArtifactsRequest {
    pub run_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListArtifactsResponse {
    pub root_uri: String,
    #[serde(default)]
    pub files: Vec<FileInfo>,
}
