use axum::{extract::State, http::Uri, Json};

use crate::artifacts::{ArtifactRepository, LocalArtifactRepository};
use crate::error::{Result, TrackingError};
use crate::handlers::{parse_query, AppState};
use crate::protocol::{ListArtifactsRequest, ListArtifactsResponse};

/// GET artifacts/list
///
/// Only local artifact locations under the server's artifact root can be
/// listed.
pub async fn list_artifacts(
    State(state): State<AppState>,
    uri: Uri,
) -> Result<Json<ListArtifactsResponse>> {
    let request: ListArtifactsRequest = parse_query(&uri)?;
    let info = state.store.get_run_info(&request.run_id).await?;

    let repository = LocalArtifactRepository::from_uri(&info.artifact_uri).ok_or_else(|| {
        TrackingError::invalid_parameter(format!(
            "Artifact location '{}' of run {} is not a local path",
            info.artifact_uri, info.run_id
        ))
    })?;
    if !repository.is_within(&state.artifact_root) {
        tracing::warn!(
            run_id = %info.run_id,
            artifact_uri = %info.artifact_uri,
            "Refusing to list artifacts outside the artifact root"
        );
        return Err(TrackingError::invalid_parameter(format!(
            "Artifact location '{}' of run {} is outside the artifact root",
            info.artifact_uri, info.run_id
        )));
    }

    let files = repository.list(request.path.as_deref()).await?;
    Ok(Json(ListArtifactsResponse {
        root_uri: info.artifact_uri,
        files,
    }))
}
