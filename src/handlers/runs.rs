//! Run endpoints: lifecycle, logging, history and search

use axum::{body::Bytes, extract::State, http::Uri, Json};

use crate::entities::{Metric, Param, RunTag};
use crate::error::{Result, TrackingError};
use crate::handlers::{parse_json, parse_query, AppState};
use crate::protocol::{
    CreateRunRequest, Empty, GetMetricHistoryRequest, GetMetricHistoryResponse,
    ListRunInfosRequest, ListRunInfosResponse, LogBatchRequest, LogMetricRequest, LogParamRequest,
    RunIdRequest, RunResponse, SearchRunsRequest, SearchRunsResponse, SetTagRequest,
    UpdateRunRequest, UpdateRunResponse,
};
use crate::store::{RunCreate, SEARCH_MAX_RESULTS_DEFAULT};
use crate::validation::{validate_experiment_id, validate_request_size};

/// POST runs/create
pub async fn create_run(State(state): State<AppState>, body: Bytes) -> Result<Json<RunResponse>> {
    let request: CreateRunRequest = parse_json(&body)?;
    let run = state
        .store
        .create_run(RunCreate {
            experiment_id: validate_experiment_id(&request.experiment_id)?,
            user_id: request.user_id,
            start_time: request.start_time,
            tags: request.tags,
            run_name: request.run_name,
            parent_run_id: request.parent_run_id,
        })
        .await?;
    Ok(Json(RunResponse { run }))
}

/// GET runs/get
pub async fn get_run(State(state): State<AppState>, uri: Uri) -> Result<Json<RunResponse>> {
    let request: RunIdRequest = parse_query(&uri)?;
    let run = state.store.get_run(&request.run_id).await?;
    Ok(Json(RunResponse { run }))
}

/// POST runs/update
pub async fn update_run(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<UpdateRunResponse>> {
    let request: UpdateRunRequest = parse_json(&body)?;
    let run_info = state
        .store
        .update_run_info(&request.run_id, request.status, request.end_time)
        .await?;
    Ok(Json(UpdateRunResponse { run_info }))
}

/// POST runs/delete
pub async fn delete_run(State(state): State<AppState>, body: Bytes) -> Result<Json<Empty>> {
    let request: RunIdRequest = parse_json(&body)?;
    state.store.delete_run(&request.run_id).await?;
    Ok(Json(Empty {}))
}

/// POST runs/restore
pub async fn restore_run(State(state): State<AppState>, body: Bytes) -> Result<Json<Empty>> {
    let request: RunIdRequest = parse_json(&body)?;
    state.store.restore_run(&request.run_id).await?;
    Ok(Json(Empty {}))
}

/// GET runs/list
pub async fn list_runs(
    State(state): State<AppState>,
    uri: Uri,
) -> Result<Json<ListRunInfosResponse>> {
    let request: ListRunInfosRequest = parse_query(&uri)?;
    let experiment_id = validate_experiment_id(&request.experiment_id)?;
    let runs = state
        .store
        .list_run_infos(experiment_id, request.run_view_type)
        .await?;
    Ok(Json(ListRunInfosResponse { runs }))
}

/// POST runs/log-metric
pub async fn log_metric(State(state): State<AppState>, body: Bytes) -> Result<Json<Empty>> {
    let request: LogMetricRequest = parse_json(&body)?;
    let metric = Metric::new(request.key, request.value, request.timestamp, request.step);
    state.store.log_metric(&request.run_id, &metric).await?;
    Ok(Json(Empty {}))
}

/// POST runs/log-parameter
pub async fn log_param(State(state): State<AppState>, body: Bytes) -> Result<Json<Empty>> {
    let request: LogParamRequest = parse_json(&body)?;
    let param = Param::new(request.key, request.value);
    state.store.log_param(&request.run_id, &param).await?;
    Ok(Json(Empty {}))
}

/// POST runs/set-tag
pub async fn set_tag(State(state): State<AppState>, body: Bytes) -> Result<Json<Empty>> {
    let request: SetTagRequest = parse_json(&body)?;
    let tag = RunTag::new(request.key, request.value);
    state.store.set_tag(&request.run_id, &tag).await?;
    Ok(Json(Empty {}))
}

/// POST runs/log-batch
///
/// The raw body is measured before it is parsed, so oversized requests are
/// rejected without decoding them.
pub async fn log_batch(State(state): State<AppState>, body: Bytes) -> Result<Json<Empty>> {
    validate_request_size(body.len())?;
    let request: LogBatchRequest = parse_json(&body)?;
    state
        .pipeline
        .log_batch(&request.run_id, &request.metrics, &request.params, &request.tags)
        .await?;
    Ok(Json(Empty {}))
}

/// GET metrics/get-history
pub async fn get_metric_history(
    State(state): State<AppState>,
    uri: Uri,
) -> Result<Json<GetMetricHistoryResponse>> {
    let request: GetMetricHistoryRequest = parse_query(&uri)?;
    let metrics = state
        .store
        .get_metric_history(&request.run_id, &request.metric_key)
        .await?;
    Ok(Json(GetMetricHistoryResponse { metrics }))
}

/// POST runs/search
pub async fn search_runs(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SearchRunsResponse>> {
    let request: SearchRunsRequest = parse_json(&body)?;

    let experiment_ids = request
        .experiment_ids
        .iter()
        .map(|id| validate_experiment_id(id))
        .collect::<Result<Vec<_>>>()?;

    let max_results = match request.max_results {
        None => SEARCH_MAX_RESULTS_DEFAULT,
        Some(n) if n > 0 => n as usize,
        Some(n) => {
            return Err(TrackingError::invalid_parameter(format!(
                "Invalid value {} for parameter 'max_results' supplied. It must be a positive integer",
                n
            )))
        }
    };

    let runs = state
        .store
        .search_runs(&experiment_ids, &request.filter, request.run_view_type, max_results)
        .await?;
    Ok(Json(SearchRunsResponse { runs }))
}
