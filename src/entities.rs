//! Tracking entities: experiments, runs and the metrics, params and tags
//! attached to them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::error::TrackingError;

/// Tag key under which a run's display name is stored
pub const RUN_NAME_TAG: &str = "mlflow.runName";

/// Tag key linking a nested run to its parent
pub const PARENT_RUN_ID_TAG: &str = "mlflow.parentRunId";

/// Id of the experiment created by the schema migration
pub const DEFAULT_EXPERIMENT_ID: i64 = 0;

/// Current time in milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A single measurement of a metric key
///
/// Values are compared bitwise so that `Eq` and `Hash` agree. Non-finite
/// values never pass validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metric {
    pub key: String,
    pub value: f64,
    pub timestamp: i64,
    #[serde(default)]
    pub step: i64,
}

impl Metric {
    pub fn new(key: impl Into<String>, value: f64, timestamp: i64, step: i64) -> Self {
        Self {
            key: key.into(),
            value,
            timestamp,
            step,
        }
    }
}

impl PartialEq for Metric {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
            && self.value.to_bits() == other.value.to_bits()
            && self.timestamp == other.timestamp
            && self.step == other.step
    }
}

impl Eq for Metric {}

impl Hash for Metric {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
        self.value.to_bits().hash(state);
        self.timestamp.hash(state);
        self.step.hash(state);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Param {
    pub key: String,
    pub value: String,
}

impl Param {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunTag {
    pub key: String,
    pub value: String,
}

impl RunTag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Execution status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Scheduled,
    Running,
    Finished,
    Failed,
    Killed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "SCHEDULED",
            Self::Running => "RUNNING",
            Self::Finished => "FINISHED",
            Self::Failed => "FAILED",
            Self::Killed => "KILLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed | Self::Killed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = TrackingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SCHEDULED" => Ok(Self::Scheduled),
            "RUNNING" => Ok(Self::Running),
            "FINISHED" => Ok(Self::Finished),
            "FAILED" => Ok(Self::Failed),
            "KILLED" => Ok(Self::Killed),
            other => Err(TrackingError::invalid_parameter(format!(
                "Invalid run status '{}'",
                other
            ))),
        }
    }
}

/// Soft-delete state, independent of run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleStage {
    Active,
    Deleted,
}

impl LifecycleStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleStage {
    type Err = TrackingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "deleted" => Ok(Self::Deleted),
            other => Err(TrackingError::internal(format!(
                "Unknown lifecycle stage '{}'",
                other
            ))),
        }
    }
}

/// Which lifecycle stages a listing includes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViewType {
    #[default]
    ActiveOnly,
    DeletedOnly,
    All,
}

impl ViewType {
    pub fn stages(&self) -> &'static [LifecycleStage] {
        match self {
            Self::ActiveOnly => &[LifecycleStage::Active],
            Self::DeletedOnly => &[LifecycleStage::Deleted],
            Self::All => &[LifecycleStage::Active, LifecycleStage::Deleted],
        }
    }

    pub fn includes(&self, stage: LifecycleStage) -> bool {
        self.stages().contains(&stage)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Experiment {
    pub experiment_id: i64,
    pub name: String,
    pub artifact_location: String,
    pub lifecycle_stage: LifecycleStage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: String,
    pub experiment_id: i64,
    pub user_id: String,
    pub status: RunStatus,
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub lifecycle_stage: LifecycleStage,
    pub artifact_uri: String,
}

/// Current view of a run's data: the latest value of each metric key plus
/// all params and tags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunData {
    #[serde(default)]
    pub metrics: Vec<Metric>,
    #[serde(default)]
    pub params: Vec<Param>,
    #[serde(default)]
    pub tags: Vec<RunTag>,
}

impl RunData {
    pub fn metric(&self, key: &str) -> Option<f64> {
        self.metrics.iter().find(|m| m.key == key).map(|m| m.value)
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|p| p.key == key)
            .map(|p| p.value.as_str())
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.key == key)
            .map(|t| t.value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub info: RunInfo,
    pub data: RunData,
}

/// Reduce a metric history to the latest entry per key.
///
/// Entries must be supplied in insertion order. The latest entry has the
/// greatest timestamp; ties go to the greatest step, then to the entry
/// inserted last. Output is sorted by key.
pub fn latest_metrics(history: impl IntoIterator<Item = Metric>) -> Vec<Metric> {
    let mut latest: HashMap<String, Metric> = HashMap::new();
    for metric in history {
        match latest.get(&metric.key) {
            Some(current) if (current.timestamp, current.step) > (metric.timestamp, metric.step) => {}
            _ => {
                latest.insert(metric.key.clone(), metric);
            }
        }
    }
    let mut metrics: Vec<Metric> = latest.into_values().collect();
    metrics.sort_by(|a, b| a.key.cmp(&b.key));
    metrics
}

/// Artifact listing entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub path: String,
    pub is_dir: bool,
    pub file_size: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_latest_metric_uses_latest_timestamp() {
        let history = vec![
            Metric::new("loss", 0.9, 1000, 0),
            Metric::new("loss", 0.3, 2000, 1),
            Metric::new("acc", 0.5, 1500, 0),
        ];
        let latest = latest_metrics(history);
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].key, "acc");
        assert_eq!(latest[1].value, 0.3);
    }

    #[test]
    fn test_latest_metric_tie_breaks_on_step_then_insertion() {
        let history = vec![
            Metric::new("loss", 0.5, 1000, 7),
            Metric::new("loss", 0.4, 1000, 2),
        ];
        assert_eq!(latest_metrics(history)[0].value, 0.5);

        let history = vec![
            Metric::new("loss", 0.5, 1000, 2),
            Metric::new("loss", 0.4, 1000, 2),
        ];
        assert_eq!(latest_metrics(history)[0].value, 0.4);
    }

    #[test]
    fn test_metric_equality_and_hash() {
        let mut set = HashSet::new();
        set.insert(Metric::new("acc", 0.9, 1, 0));
        set.insert(Metric::new("acc", 0.9, 1, 0));
        set.insert(Metric::new("acc", 0.9, 1, 1));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_run_status_wire_names() {
        assert_eq!(serde_json::to_string(&RunStatus::Killed).unwrap(), "\"KILLED\"");
        assert_eq!("FINISHED".parse::<RunStatus>().unwrap(), RunStatus::Finished);
        assert!("DONE".parse::<RunStatus>().is_err());
        assert!(RunStatus::Failed.is_terminal());
        assert!(!RunStatus::Scheduled.is_terminal());
    }

    #[test]
    fn test_view_type_stages() {
        assert!(ViewType::All.includes(LifecycleStage::Deleted));
        assert!(!ViewType::ActiveOnly.includes(LifecycleStage::Deleted));
        assert_eq!(
            serde_json::to_string(&ViewType::DeletedOnly).unwrap(),
            "\"DELETED_ONLY\""
        );
    }
}
