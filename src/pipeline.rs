//! Batch log pipeline
//!
//! Single entry point for writing metrics, params and tags of one run:
//! resolve the run, validate the whole batch, then hand it to the store as
//! one write. A rejected batch has no side effects.

use std::sync::Arc;
use std::time::Instant;

use crate::entities::{LifecycleStage, Metric, Param, RunTag};
use crate::error::{Result, TrackingError};
use crate::protocol::LogBatchPayload;
use crate::store::TrackingStore;
use crate::validation;

#[derive(Clone)]
pub struct BatchLogPipeline {
    store: Arc<dyn TrackingStore>,
}

impl BatchLogPipeline {
    pub fn new(store: Arc<dyn TrackingStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn TrackingStore> {
        &self.store
    }

    /// Validate and persist a batch for `run_id`.
    ///
    /// On error, no entity of the batch was persisted, except for
    /// `StoreUnavailable` where the outcome is unknown.
    pub async fn log_batch(
        &self,
        run_id: &str,
        metrics: &[Metric],
        params: &[Param],
        tags: &[RunTag],
    ) -> Result<()> {
        let started = Instant::now();
        let result = self.run(run_id, metrics, params, tags).await;

        let outcome = match &result {
            Ok(()) => "success",
            Err(TrackingError::InvalidParameter(_)) | Err(TrackingError::InvalidState(_)) => {
                "rejected"
            }
            Err(TrackingError::ResourceDoesNotExist(_)) => "not_found",
            Err(TrackingError::StoreUnavailable(_)) => "unavailable",
            Err(_) => "error",
        };
        crate::metrics::record_batch(outcome, started.elapsed());

        match &result {
            Ok(()) => {
                crate::metrics::record_entities("metric", metrics.len());
                crate::metrics::record_entities("param", params.len());
                crate::metrics::record_entities("tag", tags.len());
                tracing::info!(
                    run_id = %run_id,
                    metrics = metrics.len(),
                    params = params.len(),
                    tags = tags.len(),
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Batch logged"
                );
            }
            Err(e) if e.is_unavailable() => {
                tracing::warn!(run_id = %run_id, error = %e, "Batch outcome unknown, store unavailable");
            }
            Err(e) => {
                tracing::debug!(
                    run_id = %run_id,
                    error_code = e.error_code(),
                    error = %crate::logging::truncate_for_log(e.message(), 256),
                    "Batch rejected"
                );
            }
        }

        result
    }

    async fn run(
        &self,
        run_id: &str,
        metrics: &[Metric],
        params: &[Param],
        tags: &[RunTag],
    ) -> Result<()> {
        validation::validate_run_id(run_id)?;

        // A deleted run rejects any payload, valid or not
        let info = self.store.get_run_info(run_id).await?;
        if info.lifecycle_stage != LifecycleStage::Active {
            return Err(TrackingError::invalid_state(format!(
                "The run {} must be in the 'active' state. Current state is {}.",
                run_id, info.lifecycle_stage
            )));
        }

        validation::validate_batch_shape(metrics.len(), params.len(), tags.len())?;
        let payload = LogBatchPayload {
            run_id,
            metrics,
            params,
            tags,
        };
        validation::validate_request_size(payload.serialized_len()?)?;
        validation::validate_batch_entities(metrics, params, tags)?;

        self.store.batch_log(run_id, metrics, params, tags).await
    }
}
