use axum::{body::Bytes, extract::State, http::Uri, Json};

use crate::error::{Result, TrackingError};
use crate::handlers::{parse_json, parse_query, AppState};
use crate::protocol::{
    CreateExperimentRequest, CreateExperimentResponse, Empty, ExperimentIdRequest,
    GetExperimentByNameRequest, GetExperimentResponse, ListExperimentsRequest,
    ListExperimentsResponse, UpdateExperimentRequest,
};
use crate::validation::validate_experiment_id;

/// POST experiments/create
pub async fn create_experiment(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<CreateExperimentResponse>> {
    let request: CreateExperimentRequest = parse_json(&body)?;
    let experiment_id = state
        .store
        .create_experiment(&request.name, request.artifact_location.as_deref())
        .await?;

    Ok(Json(CreateExperimentResponse {
        experiment_id: experiment_id.to_string(),
    }))
}

/// GET experiments/get
pub async fn get_experiment(
    State(state): State<AppState>,
    uri: Uri,
) -> Result<Json<GetExperimentResponse>> {
    let request: ExperimentIdRequest = parse_query(&uri)?;
    let experiment_id = validate_experiment_id(&request.experiment_id)?;
    let experiment = state.store.get_experiment(experiment_id).await?;
    Ok(Json(GetExperimentResponse { experiment }))
}

/// GET experiments/get-by-name
pub async fn get_experiment_by_name(
    State(state): State<AppState>,
    uri: Uri,
) -> Result<Json<GetExperimentResponse>> {
    let request: GetExperimentByNameRequest = parse_query(&uri)?;
    match state.store.get_experiment_by_name(&request.experiment_name).await? {
        Some(experiment) => Ok(Json(GetExperimentResponse { experiment })),
        None => Err(TrackingError::not_found(format!(
            "Could not find experiment with name '{}'",
            request.experiment_name
        ))),
    }
}

/// GET experiments/list
pub async fn list_experiments(
    State(state): State<AppState>,
    uri: Uri,
) -> Result<Json<ListExperimentsResponse>> {
    let request: ListExperimentsRequest = parse_query(&uri)?;
    let experiments = state.store.list_experiments(request.view_type).await?;
    Ok(Json(ListExperimentsResponse { experiments }))
}

/// POST experiments/delete
pub async fn delete_experiment(State(state): State<AppState>, body: Bytes) -> Result<Json<Empty>> {
    let request: ExperimentIdRequest = parse_json(&body)?;
    let experiment_id = validate_experiment_id(&request.experiment_id)?;
    state.store.delete_experiment(experiment_id).await?;
    Ok(Json(Empty {}))
}

/// POST experiments/restore
pub async fn restore_experiment(State(state): State<AppState>, body: Bytes) -> Result<Json<Empty>> {
    let request: ExperimentIdRequest = parse_json(&body)?;
    let experiment_id = validate_experiment_id(&request.experiment_id)?;
    state.store.restore_experiment(experiment_id).await?;
    Ok(Json(Empty {}))
}

/// POST experiments/update
pub async fn update_experiment(State(state): State<AppState>, body: Bytes) -> Result<Json<Empty>> {
    let request: UpdateExperimentRequest = parse_json(&body)?;
    let experiment_id = validate_experiment_id(&request.experiment_id)?;
    state
        .store
        .rename_experiment(experiment_id, &request.new_name)
        .await?;
    Ok(Json(Empty {}))
}
