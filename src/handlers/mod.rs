pub mod artifacts;
pub mod experiments;
pub mod health;
pub mod metrics_handler;
pub mod runs;

use axum::body::Bytes;
use axum::extract::Query;
use axum::http::Uri;
use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::error::{Result, TrackingError};
use crate::pipeline::BatchLogPipeline;
use crate::store::TrackingStore;

/// Shared state of the tracking API handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TrackingStore>,
    pub pipeline: BatchLogPipeline,
    /// Local directory that `artifacts/list` is allowed to read under
    pub artifact_root: Arc<str>,
}

impl AppState {
    pub fn new(store: Arc<dyn TrackingStore>, artifact_root: &str) -> Self {
        Self {
            pipeline: BatchLogPipeline::new(store.clone()),
            store,
            artifact_root: Arc::from(artifact_root),
        }
    }
}

/// Decode a JSON request body, reporting failures as `INVALID_PARAMETER_VALUE`
pub(crate) fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T> {
    Ok(serde_json::from_slice(body)?)
}

/// Decode a query string, reporting failures as `INVALID_PARAMETER_VALUE`
pub(crate) fn parse_query<T: DeserializeOwned>(uri: &Uri) -> Result<T> {
    Query::<T>::try_from_uri(uri)
        .map(|Query(query)| query)
        .map_err(|e| TrackingError::invalid_parameter(format!("Invalid query parameters: {}", e.body_text())))
}
