//! Tracking store contract and its realizations
//!
//! - [`SqliteStore`] persists directly, one transaction per mutating call.
//! - [`RestStore`] forwards every call as one HTTP request to a tracking
//!   server, which executes it against its own local store.

pub mod rest;
pub mod sqlite;

pub use rest::RestStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;

use crate::entities::{Experiment, Metric, Param, Run, RunInfo, RunStatus, RunTag, ViewType};
use crate::error::Result;

/// Default and upper bound for `search_runs` page sizes
pub const SEARCH_MAX_RESULTS_DEFAULT: usize = 1000;
pub const SEARCH_MAX_RESULTS_THRESHOLD: usize = 50000;

/// Arguments of [`TrackingStore::create_run`]
#[derive(Debug, Clone, Default)]
pub struct RunCreate {
    pub experiment_id: i64,
    pub user_id: String,
    /// Milliseconds since epoch; the store uses the current time when absent
    pub start_time: Option<i64>,
    pub tags: Vec<RunTag>,
    /// Stored as the `mlflow.runName` tag
    pub run_name: Option<String>,
    /// Stored as the `mlflow.parentRunId` tag
    pub parent_run_id: Option<String>,
}

/// Persistence contract shared by the local and remote stores.
///
/// Every mutating call is atomic: it either fully applies or leaves no trace.
/// A `StoreUnavailable` error means the outcome is unknown.
#[async_trait]
pub trait TrackingStore: Send + Sync + 'static {
    /// Create an experiment and return its id
    async fn create_experiment(&self, name: &str, artifact_location: Option<&str>) -> Result<i64>;

    async fn get_experiment(&self, experiment_id: i64) -> Result<Experiment>;

    async fn get_experiment_by_name(&self, name: &str) -> Result<Option<Experiment>>;

    async fn list_experiments(&self, view_type: ViewType) -> Result<Vec<Experiment>>;

    async fn delete_experiment(&self, experiment_id: i64) -> Result<()>;

    async fn restore_experiment(&self, experiment_id: i64) -> Result<()>;

    /// Rename an active experiment; the new name must be unused
    async fn rename_experiment(&self, experiment_id: i64, new_name: &str) -> Result<()>;

    /// Create a RUNNING run with a store-generated id
    async fn create_run(&self, request: RunCreate) -> Result<Run>;

    /// Run info plus the latest value of each metric, all params and all tags
    async fn get_run(&self, run_id: &str) -> Result<Run>;

    /// Run info only; stores that can skip loading run data override this
    async fn get_run_info(&self, run_id: &str) -> Result<RunInfo> {
        Ok(self.get_run(run_id).await?.info)
    }

    /// Apply a status transition; see [`crate::lifecycle::plan_transition`]
    async fn update_run_info(
        &self,
        run_id: &str,
        status: RunStatus,
        end_time: Option<i64>,
    ) -> Result<RunInfo>;

    async fn delete_run(&self, run_id: &str) -> Result<()>;

    async fn restore_run(&self, run_id: &str) -> Result<()>;

    async fn list_run_infos(&self, experiment_id: i64, view_type: ViewType) -> Result<Vec<RunInfo>>;

    /// Append one history entry
    async fn log_metric(&self, run_id: &str, metric: &Metric) -> Result<()>;

    /// Insert a param; re-logging the same value is a no-op, a different
    /// value is rejected
    async fn log_param(&self, run_id: &str, param: &Param) -> Result<()>;

    /// Insert or overwrite a tag
    async fn set_tag(&self, run_id: &str, tag: &RunTag) -> Result<()>;

    /// Every logged value of a metric key, in no particular order
    async fn get_metric_history(&self, run_id: &str, metric_key: &str) -> Result<Vec<Metric>>;

    async fn search_runs(
        &self,
        experiment_ids: &[i64],
        filter: &str,
        view_type: ViewType,
        max_results: usize,
    ) -> Result<Vec<Run>>;

    /// Persist metrics, params and tags of one run as a single write.
    ///
    /// Callers go through [`crate::pipeline::BatchLogPipeline`], which
    /// validates the batch first.
    async fn batch_log(
        &self,
        run_id: &str,
        metrics: &[Metric],
        params: &[Param],
        tags: &[RunTag],
    ) -> Result<()>;
}

/// Check a requested page size against the search bounds
pub fn validate_max_results(max_results: usize) -> Result<usize> {
    if max_results == 0 || max_results > SEARCH_MAX_RESULTS_THRESHOLD {
        return Err(crate::error::TrackingError::invalid_parameter(format!(
            "Invalid value {} for parameter 'max_results' supplied. It must be a positive \
             integer at most {}",
            max_results, SEARCH_MAX_RESULTS_THRESHOLD
        )));
    }
    Ok(max_results)
}
