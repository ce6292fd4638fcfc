//! Run lifecycle: status transitions and the explicit run context
//!
//! Status machine: SCHEDULED -> RUNNING -> {FINISHED, FAILED, KILLED}.
//! Terminal statuses are final; re-finishing with the same status is
//! accepted as a no-op.

use std::sync::Arc;

use crate::entities::{
    now_millis, LifecycleStage, Metric, Param, Run, RunInfo, RunStatus, RunTag,
};
use crate::error::{Result, TrackingError};
use crate::pipeline::BatchLogPipeline;
use crate::store::{RunCreate, TrackingStore};

/// Decide the effect of moving `current` to `status`.
///
/// Returns `None` when nothing changes, otherwise the status and end time
/// to store. Entering a terminal status records `end_time`, falling back to
/// an end time already on the run, then to `now`.
pub fn plan_transition(
    current: &RunInfo,
    status: RunStatus,
    end_time: Option<i64>,
    now: i64,
) -> Result<Option<(RunStatus, Option<i64>)>> {
    if current.lifecycle_stage != LifecycleStage::Active {
        return Err(TrackingError::invalid_state(format!(
            "The run {} must be in the 'active' state. Current state is {}.",
            current.run_id, current.lifecycle_stage
        )));
    }

    if current.status == status {
        return Ok(None);
    }

    if current.status.is_terminal() {
        return Err(TrackingError::invalid_state(format!(
            "Run {} is already {} and cannot transition to {}",
            current.run_id, current.status, status
        )));
    }

    if current.status == RunStatus::Running && status == RunStatus::Scheduled {
        return Err(TrackingError::invalid_state(format!(
            "Run {} is RUNNING and cannot return to SCHEDULED",
            current.run_id
        )));
    }

    let end = if status.is_terminal() {
        Some(end_time.or(current.end_time).unwrap_or(now))
    } else {
        current.end_time
    };
    Ok(Some((status, end)))
}

/// Starts and terminates runs through a store
#[derive(Clone)]
pub struct RunLifecycle {
    store: Arc<dyn TrackingStore>,
}

impl RunLifecycle {
    pub fn new(store: Arc<dyn TrackingStore>) -> Self {
        Self { store }
    }

    /// Create a RUNNING run starting now
    pub async fn start_run(
        &self,
        experiment_id: i64,
        user_id: &str,
        tags: Vec<RunTag>,
        run_name: Option<String>,
    ) -> Result<Run> {
        let run = self
            .store
            .create_run(RunCreate {
                experiment_id,
                user_id: user_id.to_string(),
                start_time: Some(now_millis()),
                tags,
                run_name,
                parent_run_id: None,
            })
            .await?;

        tracing::info!(run_id = %run.info.run_id, experiment_id, "Run started");
        Ok(run)
    }

    /// Move a run to a terminal status, FINISHED by default
    pub async fn set_terminated(
        &self,
        run_id: &str,
        status: Option<RunStatus>,
        end_time: Option<i64>,
    ) -> Result<RunInfo> {
        let status = status.unwrap_or(RunStatus::Finished);
        if !status.is_terminal() {
            return Err(TrackingError::invalid_parameter(format!(
                "Cannot terminate run {} with non-terminal status {}",
                run_id, status
            )));
        }

        let info = self
            .store
            .update_run_info(run_id, status, Some(end_time.unwrap_or_else(now_millis)))
            .await?;

        tracing::info!(run_id = %run_id, status = %info.status, "Run terminated");
        Ok(info)
    }
}

/// Handle on one run, passed explicitly to whatever logs into it.
///
/// Consumed by [`RunContext::end`], so a finished context cannot log.
pub struct RunContext {
    run_id: String,
    lifecycle: RunLifecycle,
    pipeline: BatchLogPipeline,
}

impl RunContext {
    /// Start a new run in `experiment_id`
    pub async fn start(
        store: Arc<dyn TrackingStore>,
        experiment_id: i64,
        user_id: &str,
        run_name: Option<String>,
    ) -> Result<Self> {
        let lifecycle = RunLifecycle::new(store.clone());
        let run = lifecycle
            .start_run(experiment_id, user_id, Vec::new(), run_name)
            .await?;

        Ok(Self {
            run_id: run.info.run_id,
            lifecycle,
            pipeline: BatchLogPipeline::new(store),
        })
    }

    /// Attach to an existing run
    pub fn attach(store: Arc<dyn TrackingStore>, run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            lifecycle: RunLifecycle::new(store.clone()),
            pipeline: BatchLogPipeline::new(store),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Log one metric value stamped with the current time
    pub async fn log_metric(&self, key: &str, value: f64, step: i64) -> Result<()> {
        let metric = Metric::new(key, value, now_millis(), step);
        self.pipeline.store().log_metric(&self.run_id, &metric).await
    }

    pub async fn log_param(&self, key: &str, value: &str) -> Result<()> {
        self.pipeline
            .store()
            .log_param(&self.run_id, &Param::new(key, value))
            .await
    }

    pub async fn set_tag(&self, key: &str, value: &str) -> Result<()> {
        self.pipeline
            .store()
            .set_tag(&self.run_id, &RunTag::new(key, value))
            .await
    }

    pub async fn log_batch(&self, metrics: &[Metric], params: &[Param], tags: &[RunTag]) -> Result<()> {
        self.pipeline
            .log_batch(&self.run_id, metrics, params, tags)
            .await
    }

    /// Terminate the run, FINISHED unless another status is given
    pub async fn end(self, status: Option<RunStatus>) -> Result<RunInfo> {
        self.lifecycle.set_terminated(&self.run_id, status, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(status: RunStatus, end_time: Option<i64>) -> RunInfo {
        RunInfo {
            run_id: "0123456789abcdef0123456789abcdef".to_string(),
            experiment_id: 0,
            user_id: "tester".to_string(),
            status,
            start_time: 100,
            end_time,
            lifecycle_stage: LifecycleStage::Active,
            artifact_uri: "./artifacts/0/run/artifacts".to_string(),
        }
    }

    #[test]
    fn test_finish_running_sets_end_time() {
        let plan = plan_transition(&info(RunStatus::Running, None), RunStatus::Finished, None, 500)
            .unwrap();
        assert_eq!(plan, Some((RunStatus::Finished, Some(500))));

        let plan = plan_transition(&info(RunStatus::Running, None), RunStatus::Killed, Some(300), 500)
            .unwrap();
        assert_eq!(plan, Some((RunStatus::Killed, Some(300))));
    }

    #[test]
    fn test_scheduled_to_running() {
        let plan = plan_transition(&info(RunStatus::Scheduled, None), RunStatus::Running, None, 500)
            .unwrap();
        assert_eq!(plan, Some((RunStatus::Running, None)));
    }

    #[test]
    fn test_same_terminal_status_is_noop() {
        let plan = plan_transition(
            &info(RunStatus::Finished, Some(200)),
            RunStatus::Finished,
            Some(900),
            1000,
        )
        .unwrap();
        assert_eq!(plan, None);
    }

    #[test]
    fn test_conflicting_refinish_rejected() {
        let err = plan_transition(&info(RunStatus::Finished, Some(200)), RunStatus::Failed, None, 1000)
            .unwrap_err();
        assert!(matches!(err, TrackingError::InvalidState(_)));

        let err = plan_transition(&info(RunStatus::Killed, Some(200)), RunStatus::Running, None, 1000)
            .unwrap_err();
        assert!(matches!(err, TrackingError::InvalidState(_)));
    }

    #[test]
    fn test_running_cannot_return_to_scheduled() {
        let err = plan_transition(&info(RunStatus::Running, None), RunStatus::Scheduled, None, 1)
            .unwrap_err();
        assert!(matches!(err, TrackingError::InvalidState(_)));
    }

    #[test]
    fn test_deleted_run_rejects_transition() {
        let mut deleted = info(RunStatus::Running, None);
        deleted.lifecycle_stage = LifecycleStage::Deleted;
        let err = plan_transition(&deleted, RunStatus::Finished, None, 1).unwrap_err();
        assert!(matches!(err, TrackingError::InvalidState(_)));
    }
}
