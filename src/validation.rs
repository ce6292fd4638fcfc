//! Input validation for tracking entities and batch requests.
//!
//! Every function here is pure: no I/O, no state, and each call either
//! returns the checked value or an `InvalidParameter` error naming the
//! offending field.

use regex::Regex;
use std::sync::LazyLock;

use crate::entities::{Metric, Param, RunTag};
use crate::error::{Result, TrackingError};

pub const MAX_PARAMS_TAGS_PER_BATCH: usize = 100;
pub const MAX_METRICS_PER_BATCH: usize = 1000;
pub const MAX_ENTITIES_PER_BATCH: usize = 1000;
pub const MAX_BATCH_LOG_REQUEST_SIZE: usize = 1_000_000;
pub const MAX_PARAM_VALUE_LENGTH: usize = 500;
pub const MAX_TAG_VALUE_LENGTH: usize = (1 << 16) - 1;
pub const MAX_ENTITY_KEY_LENGTH: usize = 250;

static VALID_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[/\w.\- ]*$").expect("key pattern is valid"));

static RUN_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-f]{32}$").expect("run id pattern is valid"));

const BAD_CHARACTERS_MESSAGE: &str = "Names may only contain alphanumerics, underscores (_), \
     dashes (-), periods (.), spaces ( ), and slashes (/).";

/// Normalize a slash-separated path lexically: collapse repeated and
/// trailing separators, drop `.` segments and fold `..` into its parent.
pub fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }

    let leading = path.len() - path.trim_start_matches('/').len();
    let prefix = match leading {
        0 => "",
        2 => "//",
        _ => "/",
    };

    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|last| *last != "..") {
                    parts.pop();
                } else if prefix.is_empty() {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }

    let joined = format!("{}{}", prefix, parts.join("/"));
    if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

/// A key is path-ambiguous when using it as a relative file name would make
/// it resolve to some other name.
pub fn is_path_ambiguous(key: &str) -> bool {
    let normalized = normalize_path(key);
    normalized != key
        || normalized == "."
        || normalized.starts_with("..")
        || normalized.starts_with('/')
}

fn validate_length_limit(entity: &str, limit: usize, value: &str) -> Result<()> {
    let length = value.chars().count();
    if length > limit {
        return Err(TrackingError::invalid_parameter(format!(
            "{} '{}' had length {}, which exceeded length limit of {}",
            entity,
            crate::logging::truncate_for_log(value, 64),
            length,
            limit
        )));
    }
    Ok(())
}

/// Shared key constraint for metric, param and tag names
pub fn validate_entity_key(entity: &str, key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(TrackingError::invalid_parameter(format!(
            "Invalid {} name: ''. Names must be non-empty.",
            entity
        )));
    }
    if !VALID_KEY.is_match(key) {
        return Err(TrackingError::invalid_parameter(format!(
            "Invalid {} name: '{}'. {}",
            entity, key, BAD_CHARACTERS_MESSAGE
        )));
    }
    if is_path_ambiguous(key) {
        return Err(TrackingError::invalid_parameter(format!(
            "Invalid {} name: '{}'. Names may be treated as files in certain cases, and must \
             not resolve to other names when treated as such. This name would resolve to '{}'",
            entity,
            key,
            normalize_path(key)
        )));
    }
    validate_length_limit(&format!("{} name", entity), MAX_ENTITY_KEY_LENGTH, key)
}

/// Check one metric observation.
///
/// NaN and infinite values are rejected: they cannot be represented in the
/// JSON wire format and have no ordering for the latest-value view.
pub fn validate_metric(key: &str, value: f64, timestamp: i64) -> Result<()> {
    validate_entity_key("metric", key)?;
    if !value.is_finite() {
        return Err(TrackingError::invalid_parameter(format!(
            "Got invalid value {} for metric '{}' (timestamp={}). Please specify value as a \
             finite double (64-bit floating point)",
            value, key, timestamp
        )));
    }
    if timestamp < 0 {
        return Err(TrackingError::invalid_parameter(format!(
            "Got invalid timestamp {} for metric '{}' (value={}). Timestamp must be a \
             nonnegative long (64-bit integer)",
            timestamp, key, value
        )));
    }
    Ok(())
}

pub fn validate_param(key: &str, value: &str) -> Result<()> {
    validate_entity_key("param", key)?;
    validate_length_limit("Param value", MAX_PARAM_VALUE_LENGTH, value)
}

pub fn validate_tag(key: &str, value: &str) -> Result<()> {
    validate_entity_key("tag", key)?;
    validate_length_limit("Tag value", MAX_TAG_VALUE_LENGTH, value)
}

fn validate_batch_limit(entity: &str, limit: usize, count: usize) -> Result<()> {
    if count > limit {
        return Err(TrackingError::invalid_parameter(format!(
            "A batch logging request can contain at most {limit} {entity}. Got {count} \
             {entity}. Please split up {entity} across multiple requests and try again."
        )));
    }
    Ok(())
}

/// Per-kind and combined entity ceilings for one batch
pub fn validate_batch_shape(metrics: usize, params: usize, tags: usize) -> Result<()> {
    validate_batch_limit("metrics", MAX_METRICS_PER_BATCH, metrics)?;
    validate_batch_limit("params", MAX_PARAMS_TAGS_PER_BATCH, params)?;
    validate_batch_limit("tags", MAX_PARAMS_TAGS_PER_BATCH, tags)?;
    validate_batch_limit(
        "metrics, params, and tags",
        MAX_ENTITIES_PER_BATCH,
        metrics + params + tags,
    )
}

pub fn validate_request_size(serialized_len: usize) -> Result<()> {
    if serialized_len > MAX_BATCH_LOG_REQUEST_SIZE {
        return Err(TrackingError::invalid_parameter(format!(
            "Batched logging API requests must be at most {} bytes, got request of size {}.",
            MAX_BATCH_LOG_REQUEST_SIZE, serialized_len
        )));
    }
    Ok(())
}

/// Validate every entity of a batch, stopping at the first failure
pub fn validate_batch_entities(metrics: &[Metric], params: &[Param], tags: &[RunTag]) -> Result<()> {
    for metric in metrics {
        validate_metric(&metric.key, metric.value, metric.timestamp)?;
    }
    for param in params {
        validate_param(&param.key, &param.value)?;
    }
    for tag in tags {
        validate_tag(&tag.key, &tag.value)?;
    }
    Ok(())
}

pub fn validate_run_id(run_id: &str) -> Result<()> {
    if !RUN_ID.is_match(run_id) {
        return Err(TrackingError::invalid_parameter(format!(
            "Invalid run ID: '{}'",
            crate::logging::truncate_for_log(run_id, 64)
        )));
    }
    Ok(())
}

pub fn validate_experiment_id(experiment_id: &str) -> Result<i64> {
    experiment_id.trim().parse::<i64>().map_err(|_| {
        TrackingError::invalid_parameter(format!("Invalid experiment ID: '{}'", experiment_id))
    })
}

pub fn validate_experiment_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(TrackingError::invalid_parameter(format!(
            "Invalid experiment name: '{}'",
            name
        )));
    }
    Ok(())
}
