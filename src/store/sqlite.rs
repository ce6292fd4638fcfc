//! SQLite tracking store
//!
//! - One pooled database, migrated on open
//! - Every mutating call runs in its own transaction; dropping the
//!   transaction on an error path rolls it back
//! - WAL mode for file databases so readers do not block the writer

use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteRow,
};
use sqlx::{Row, Sqlite, Transaction};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::entities::{
    latest_metrics, now_millis, Experiment, LifecycleStage, Metric, Param, Run, RunData, RunInfo,
    RunStatus, RunTag, ViewType, DEFAULT_EXPERIMENT_ID, PARENT_RUN_ID_TAG, RUN_NAME_TAG,
};
use crate::error::{Result, TrackingError};
use crate::lifecycle::plan_transition;
use crate::logging::truncate_for_log;
use crate::search::SearchFilter;
use crate::store::{validate_max_results, RunCreate, TrackingStore};
use crate::validation;

const RUN_COLUMNS: &str =
    "run_uuid, experiment_id, user_id, status, start_time, end_time, lifecycle_stage, artifact_uri";

const EXPERIMENT_COLUMNS: &str = "experiment_id, name, artifact_location, lifecycle_stage";

/// Local transactional store
pub struct SqliteStore {
    pool: SqlitePool,
    artifact_root: String,
}

impl SqliteStore {
    /// Open (creating if needed) the database described by `config`
    pub async fn open(config: &StoreConfig) -> Result<Self> {
        Self::connect(
            &config.database_url,
            &config.default_artifact_root,
            config.max_connections,
            Duration::from_secs(config.busy_timeout_seconds),
        )
        .await
    }

    /// Private in-memory database, used by tests and `tracking-server test`
    pub async fn in_memory(artifact_root: &str) -> Result<Self> {
        Self::connect("sqlite::memory:", artifact_root, 1, Duration::from_secs(5)).await
    }

    async fn connect(
        database_url: &str,
        artifact_root: &str,
        max_connections: u32,
        busy_timeout: Duration,
    ) -> Result<Self> {
        let in_memory = database_url.contains(":memory:");

        let mut options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(busy_timeout);

        let mut pool_options = SqlitePoolOptions::new().acquire_timeout(busy_timeout);

        if in_memory {
            // The database lives as long as its single connection does
            pool_options = pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        } else {
            if let Some(parent) = options.get_filename().parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
            options = options
                .journal_mode(SqliteJournalMode::Wal)
                .pragma("synchronous", "NORMAL");
            pool_options = pool_options.max_connections(max_connections);
        }

        let pool = pool_options.connect_with(options).await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        let artifact_root = artifact_root.trim_end_matches('/').to_string();
        sqlx::query(
            "UPDATE experiments SET artifact_location = ?
             WHERE experiment_id = ? AND artifact_location = ''",
        )
        .bind(artifact_location_for(&artifact_root, DEFAULT_EXPERIMENT_ID))
        .bind(DEFAULT_EXPERIMENT_ID)
        .execute(&pool)
        .await?;

        tracing::info!(
            database_url = %database_url,
            artifact_root = %artifact_root,
            "Tracking store opened"
        );

        Ok(Self {
            pool,
            artifact_root,
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Check that the database answers
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn artifact_location_for(root: &str, experiment_id: i64) -> String {
    format!("{}/{}", root, experiment_id)
}

fn stage_filter(view_type: ViewType) -> &'static str {
    match view_type {
        ViewType::ActiveOnly => "('active')",
        ViewType::DeletedOnly => "('deleted')",
        ViewType::All => "('active', 'deleted')",
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn parse_stage(value: &str) -> Result<LifecycleStage> {
    value.parse()
}

fn parse_status(value: &str) -> Result<RunStatus> {
    value
        .parse()
        .map_err(|_| TrackingError::internal(format!("Corrupt run status '{}' in database", value)))
}

fn experiment_from_row(row: &SqliteRow) -> Result<Experiment> {
    Ok(Experiment {
        experiment_id: row.try_get("experiment_id")?,
        name: row.try_get("name")?,
        artifact_location: row.try_get("artifact_location")?,
        lifecycle_stage: parse_stage(row.try_get("lifecycle_stage")?)?,
    })
}

fn run_info_from_row(row: &SqliteRow) -> Result<RunInfo> {
    Ok(RunInfo {
        run_id: row.try_get("run_uuid")?,
        experiment_id: row.try_get("experiment_id")?,
        user_id: row.try_get("user_id")?,
        status: parse_status(row.try_get("status")?)?,
        start_time: row.try_get("start_time")?,
        end_time: row.try_get("end_time")?,
        lifecycle_stage: parse_stage(row.try_get("lifecycle_stage")?)?,
        artifact_uri: row.try_get("artifact_uri")?,
    })
}

fn metric_from_row(row: &SqliteRow) -> Result<Metric> {
    Ok(Metric {
        key: row.try_get("key")?,
        value: row.try_get("value")?,
        timestamp: row.try_get("timestamp")?,
        step: row.try_get("step")?,
    })
}

fn param_from_row(row: &SqliteRow) -> Result<Param> {
    Ok(Param {
        key: row.try_get("key")?,
        value: row.try_get("value")?,
    })
}

fn tag_from_row(row: &SqliteRow) -> Result<RunTag> {
    Ok(RunTag {
        key: row.try_get("key")?,
        value: row.try_get("value")?,
    })
}

async fn fetch_experiment(conn: &mut SqliteConnection, experiment_id: i64) -> Result<Experiment> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM experiments WHERE experiment_id = ?",
        EXPERIMENT_COLUMNS
    ))
    .bind(experiment_id)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => experiment_from_row(&row),
        None => Err(TrackingError::not_found(format!(
            "No Experiment with id={} exists",
            experiment_id
        ))),
    }
}

async fn fetch_run_info(conn: &mut SqliteConnection, run_id: &str) -> Result<RunInfo> {
    let row = sqlx::query(&format!("SELECT {} FROM runs WHERE run_uuid = ?", RUN_COLUMNS))
        .bind(run_id)
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => run_info_from_row(&row),
        None => Err(TrackingError::not_found(format!(
            "Run with id={} not found",
            truncate_for_log(run_id, 64)
        ))),
    }
}

async fn fetch_run_data(conn: &mut SqliteConnection, run_id: &str) -> Result<RunData> {
    let history = sqlx::query(
        "SELECT key, value, timestamp, step FROM metrics WHERE run_uuid = ? ORDER BY seq",
    )
    .bind(run_id)
    .fetch_all(&mut *conn)
    .await?
    .iter()
    .map(metric_from_row)
    .collect::<Result<Vec<_>>>()?;

    let params = sqlx::query("SELECT key, value FROM params WHERE run_uuid = ? ORDER BY key")
        .bind(run_id)
        .fetch_all(&mut *conn)
        .await?
        .iter()
        .map(param_from_row)
        .collect::<Result<Vec<_>>>()?;

    let tags = sqlx::query("SELECT key, value FROM tags WHERE run_uuid = ? ORDER BY key")
        .bind(run_id)
        .fetch_all(&mut *conn)
        .await?
        .iter()
        .map(tag_from_row)
        .collect::<Result<Vec<_>>>()?;

    Ok(RunData {
        metrics: latest_metrics(history),
        params,
        tags,
    })
}

fn require_active_run(info: &RunInfo) -> Result<()> {
    if info.lifecycle_stage != LifecycleStage::Active {
        return Err(TrackingError::invalid_state(format!(
            "The run {} must be in the 'active' state. Current state is {}.",
            info.run_id, info.lifecycle_stage
        )));
    }
    Ok(())
}

async fn insert_metric(conn: &mut SqliteConnection, run_id: &str, metric: &Metric) -> Result<()> {
    sqlx::query("INSERT INTO metrics (run_uuid, key, value, timestamp, step) VALUES (?, ?, ?, ?, ?)")
        .bind(run_id)
        .bind(&metric.key)
        .bind(metric.value)
        .bind(metric.timestamp)
        .bind(metric.step)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// First write wins: an identical re-log is a no-op, a different value fails
async fn insert_param(conn: &mut SqliteConnection, run_id: &str, param: &Param) -> Result<()> {
    let inserted = sqlx::query(
        "INSERT INTO params (key, value, run_uuid) VALUES (?, ?, ?)
         ON CONFLICT(key, run_uuid) DO NOTHING",
    )
    .bind(&param.key)
    .bind(&param.value)
    .bind(run_id)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if inserted == 0 {
        let existing: String =
            sqlx::query_scalar("SELECT value FROM params WHERE key = ? AND run_uuid = ?")
                .bind(&param.key)
                .bind(run_id)
                .fetch_one(&mut *conn)
                .await?;

        if existing != param.value {
            return Err(TrackingError::invalid_parameter(format!(
                "Changing param values is not allowed. Param with key='{}' was already logged \
                 with value='{}' for run ID='{}'. Attempted logging new value '{}'.",
                param.key,
                truncate_for_log(&existing, 100),
                run_id,
                truncate_for_log(&param.value, 100)
            )));
        }
    }
    Ok(())
}

/// Last write wins
async fn upsert_tag(conn: &mut SqliteConnection, run_id: &str, tag: &RunTag) -> Result<()> {
    sqlx::query(
        "INSERT INTO tags (key, value, run_uuid) VALUES (?, ?, ?)
         ON CONFLICT(key, run_uuid) DO UPDATE SET value = excluded.value",
    )
    .bind(&tag.key)
    .bind(&tag.value)
    .bind(run_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Add a tag derived from a `create_run` argument, unless the caller already
/// passed the same tag with the same value
fn merge_system_tag(
    tags: &mut Vec<RunTag>,
    argument: &str,
    key: &str,
    value: String,
) -> Result<()> {
    match tags.iter().find(|t| t.key == key) {
        Some(tag) if tag.value != value => Err(TrackingError::invalid_parameter(format!(
            "Both '{}' argument and '{}' tag are specified, but with different values \
             ({}='{}', {}='{}').",
            argument, key, argument, value, key, tag.value
        ))),
        Some(_) => Ok(()),
        None => {
            tags.push(RunTag::new(key, value));
            Ok(())
        }
    }
}

/// Write transaction that takes the database write lock up front, so
/// concurrent writers queue on `busy_timeout` instead of failing to upgrade
/// a read lock
async fn begin_write(pool: &SqlitePool) -> Result<Transaction<'static, Sqlite>> {
    Ok(pool.begin_with("BEGIN IMMEDIATE").await?)
}

async fn set_run_stage(
    pool: &SqlitePool,
    run_id: &str,
    from: LifecycleStage,
    to: LifecycleStage,
) -> Result<()> {
    let mut tx = begin_write(pool).await?;
    let info = fetch_run_info(&mut tx, run_id).await?;
    if info.lifecycle_stage != from {
        return Err(TrackingError::invalid_state(format!(
            "The run {} must be in the '{}' state. Current state is {}.",
            run_id, from, info.lifecycle_stage
        )));
    }
    sqlx::query("UPDATE runs SET lifecycle_stage = ? WHERE run_uuid = ?")
        .bind(to.as_str())
        .bind(run_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(run_id = %run_id, lifecycle_stage = %to, "Run lifecycle stage changed");
    Ok(())
}

async fn set_experiment_stage(
    pool: &SqlitePool,
    experiment_id: i64,
    from: LifecycleStage,
    to: LifecycleStage,
) -> Result<()> {
    let mut tx = begin_write(pool).await?;
    let experiment = fetch_experiment(&mut tx, experiment_id).await?;
    if experiment.lifecycle_stage != from {
        return Err(TrackingError::invalid_state(format!(
            "The experiment {} must be in the '{}' state. Current state is {}.",
            experiment_id, from, experiment.lifecycle_stage
        )));
    }
    sqlx::query("UPDATE experiments SET lifecycle_stage = ? WHERE experiment_id = ?")
        .bind(to.as_str())
        .bind(experiment_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(experiment_id, lifecycle_stage = %to, "Experiment lifecycle stage changed");
    Ok(())
}

#[async_trait]
impl TrackingStore for SqliteStore {
    async fn create_experiment(&self, name: &str, artifact_location: Option<&str>) -> Result<i64> {
        validation::validate_experiment_name(name)?;

        let mut tx = begin_write(&self.pool).await?;

        let existing: Option<i64> =
            sqlx::query_scalar("SELECT experiment_id FROM experiments WHERE name = ?")
                .bind(name)
                .fetch_optional(&mut *tx)
                .await?;
        if existing.is_some() {
            return Err(TrackingError::already_exists(format!(
                "Experiment '{}' already exists.",
                name
            )));
        }

        let result = sqlx::query("INSERT INTO experiments (name, artifact_location) VALUES (?, ?)")
            .bind(name)
            .bind(artifact_location.unwrap_or(""))
            .execute(&mut *tx)
            .await;
        let experiment_id = match result {
            Ok(done) => done.last_insert_rowid(),
            Err(e) if is_unique_violation(&e) => {
                return Err(TrackingError::already_exists(format!(
                    "Experiment '{}' already exists.",
                    name
                )))
            }
            Err(e) => return Err(e.into()),
        };

        if artifact_location.is_none() {
            sqlx::query("UPDATE experiments SET artifact_location = ? WHERE experiment_id = ?")
                .bind(artifact_location_for(&self.artifact_root, experiment_id))
                .bind(experiment_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        tracing::info!(experiment_id, name = %name, "Experiment created");
        Ok(experiment_id)
    }

    async fn get_experiment(&self, experiment_id: i64) -> Result<Experiment> {
        let mut conn = self.pool.acquire().await?;
        fetch_experiment(&mut conn, experiment_id).await
    }

    async fn get_experiment_by_name(&self, name: &str) -> Result<Option<Experiment>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM experiments WHERE name = ?",
            EXPERIMENT_COLUMNS
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(experiment_from_row).transpose()
    }

    async fn list_experiments(&self, view_type: ViewType) -> Result<Vec<Experiment>> {
        sqlx::query(&format!(
            "SELECT {} FROM experiments WHERE lifecycle_stage IN {} ORDER BY experiment_id",
            EXPERIMENT_COLUMNS,
            stage_filter(view_type)
        ))
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(experiment_from_row)
        .collect()
    }

    async fn delete_experiment(&self, experiment_id: i64) -> Result<()> {
        if experiment_id == DEFAULT_EXPERIMENT_ID {
            return Err(TrackingError::invalid_parameter(
                "Cannot delete the default experiment '0'.",
            ));
        }
        set_experiment_stage(
            &self.pool,
            experiment_id,
            LifecycleStage::Active,
            LifecycleStage::Deleted,
        )
        .await
    }

    async fn restore_experiment(&self, experiment_id: i64) -> Result<()> {
        set_experiment_stage(
            &self.pool,
            experiment_id,
            LifecycleStage::Deleted,
            LifecycleStage::Active,
        )
        .await
    }

    async fn rename_experiment(&self, experiment_id: i64, new_name: &str) -> Result<()> {
        validation::validate_experiment_name(new_name)?;

        let mut tx = begin_write(&self.pool).await?;
        let experiment = fetch_experiment(&mut tx, experiment_id).await?;
        if experiment.lifecycle_stage != LifecycleStage::Active {
            return Err(TrackingError::invalid_state(
                "Cannot rename a non-active experiment.",
            ));
        }

        let result = sqlx::query("UPDATE experiments SET name = ? WHERE experiment_id = ?")
            .bind(new_name)
            .bind(experiment_id)
            .execute(&mut *tx)
            .await;
        match result {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(TrackingError::already_exists(format!(
                    "Experiment '{}' already exists.",
                    new_name
                )))
            }
            Err(e) => return Err(e.into()),
        }
        tx.commit().await?;

        tracing::info!(
            experiment_id,
            old_name = %experiment.name,
            new_name = %new_name,
            "Experiment renamed"
        );
        Ok(())
    }

    async fn create_run(&self, request: RunCreate) -> Result<Run> {
        let mut tags = request.tags;
        for tag in &tags {
            validation::validate_tag(&tag.key, &tag.value)?;
        }
        if let Some(parent_run_id) = request.parent_run_id {
            validation::validate_run_id(&parent_run_id)?;
            merge_system_tag(&mut tags, "parent_run_id", PARENT_RUN_ID_TAG, parent_run_id)?;
        }
        if let Some(run_name) = request.run_name {
            validation::validate_tag(RUN_NAME_TAG, &run_name)?;
            merge_system_tag(&mut tags, "run_name", RUN_NAME_TAG, run_name)?;
        }
        let start_time = request.start_time.unwrap_or_else(now_millis);
        if start_time < 0 {
            return Err(TrackingError::invalid_parameter(format!(
                "Invalid start_time {}: must be non-negative",
                start_time
            )));
        }

        let mut tx = begin_write(&self.pool).await?;

        let experiment = fetch_experiment(&mut tx, request.experiment_id).await?;
        if experiment.lifecycle_stage != LifecycleStage::Active {
            return Err(TrackingError::invalid_state(format!(
                "The experiment {} must be in the 'active' state. Current state is {}.",
                experiment.experiment_id, experiment.lifecycle_stage
            )));
        }

        let run_id = Uuid::new_v4().simple().to_string();
        let artifact_uri = format!(
            "{}/{}/artifacts",
            experiment.artifact_location.trim_end_matches('/'),
            run_id
        );

        sqlx::query(
            "INSERT INTO runs (run_uuid, experiment_id, user_id, status, start_time, end_time, lifecycle_stage, artifact_uri)
             VALUES (?, ?, ?, ?, ?, NULL, ?, ?)",
        )
        .bind(&run_id)
        .bind(experiment.experiment_id)
        .bind(&request.user_id)
        .bind(RunStatus::Running.as_str())
        .bind(start_time)
        .bind(LifecycleStage::Active.as_str())
        .bind(&artifact_uri)
        .execute(&mut *tx)
        .await?;

        for tag in &tags {
            upsert_tag(&mut tx, &run_id, tag).await?;
        }

        let info = fetch_run_info(&mut tx, &run_id).await?;
        let data = fetch_run_data(&mut tx, &run_id).await?;
        tx.commit().await?;

        tracing::info!(
            run_id = %run_id,
            experiment_id = experiment.experiment_id,
            user_id = %request.user_id,
            "Run created"
        );
        Ok(Run { info, data })
    }

    async fn get_run(&self, run_id: &str) -> Result<Run> {
        let mut conn = self.pool.acquire().await?;
        let info = fetch_run_info(&mut conn, run_id).await?;
        let data = fetch_run_data(&mut conn, run_id).await?;
        Ok(Run { info, data })
    }

    async fn get_run_info(&self, run_id: &str) -> Result<RunInfo> {
        let mut conn = self.pool.acquire().await?;
        fetch_run_info(&mut conn, run_id).await
    }

    async fn update_run_info(
        &self,
        run_id: &str,
        status: RunStatus,
        end_time: Option<i64>,
    ) -> Result<RunInfo> {
        let mut tx = begin_write(&self.pool).await?;
        let info = fetch_run_info(&mut tx, run_id).await?;

        let Some((new_status, new_end_time)) = plan_transition(&info, status, end_time, now_millis())?
        else {
            return Ok(info);
        };

        sqlx::query("UPDATE runs SET status = ?, end_time = ? WHERE run_uuid = ?")
            .bind(new_status.as_str())
            .bind(new_end_time)
            .bind(run_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(run_id = %run_id, from = %info.status, to = %new_status, "Run status changed");
        Ok(RunInfo {
            status: new_status,
            end_time: new_end_time,
            ..info
        })
    }

    async fn delete_run(&self, run_id: &str) -> Result<()> {
        set_run_stage(&self.pool, run_id, LifecycleStage::Active, LifecycleStage::Deleted).await
    }

    async fn restore_run(&self, run_id: &str) -> Result<()> {
        set_run_stage(&self.pool, run_id, LifecycleStage::Deleted, LifecycleStage::Active).await
    }

    async fn list_run_infos(&self, experiment_id: i64, view_type: ViewType) -> Result<Vec<RunInfo>> {
        let mut conn = self.pool.acquire().await?;
        fetch_experiment(&mut conn, experiment_id).await?;

        sqlx::query(&format!(
            "SELECT {} FROM runs WHERE experiment_id = ? AND lifecycle_stage IN {}
             ORDER BY start_time DESC, run_uuid",
            RUN_COLUMNS,
            stage_filter(view_type)
        ))
        .bind(experiment_id)
        .fetch_all(&mut *conn)
        .await?
        .iter()
        .map(run_info_from_row)
        .collect()
    }

    async fn log_metric(&self, run_id: &str, metric: &Metric) -> Result<()> {
        validation::validate_metric(&metric.key, metric.value, metric.timestamp)?;

        let mut tx = begin_write(&self.pool).await?;
        require_active_run(&fetch_run_info(&mut tx, run_id).await?)?;
        insert_metric(&mut tx, run_id, metric).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn log_param(&self, run_id: &str, param: &Param) -> Result<()> {
        validation::validate_param(&param.key, &param.value)?;

        let mut tx = begin_write(&self.pool).await?;
        require_active_run(&fetch_run_info(&mut tx, run_id).await?)?;
        insert_param(&mut tx, run_id, param).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn set_tag(&self, run_id: &str, tag: &RunTag) -> Result<()> {
        validation::validate_tag(&tag.key, &tag.value)?;

        let mut tx = begin_write(&self.pool).await?;
        require_active_run(&fetch_run_info(&mut tx, run_id).await?)?;
        upsert_tag(&mut tx, run_id, tag).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_metric_history(&self, run_id: &str, metric_key: &str) -> Result<Vec<Metric>> {
        let mut conn = self.pool.acquire().await?;
        fetch_run_info(&mut conn, run_id).await?;

        sqlx::query(
            "SELECT key, value, timestamp, step FROM metrics
             WHERE run_uuid = ? AND key = ? ORDER BY seq",
        )
        .bind(run_id)
        .bind(metric_key)
        .fetch_all(&mut *conn)
        .await?
        .iter()
        .map(metric_from_row)
        .collect()
    }

    async fn search_runs(
        &self,
        experiment_ids: &[i64],
        filter: &str,
        view_type: ViewType,
        max_results: usize,
    ) -> Result<Vec<Run>> {
        let max_results = validate_max_results(max_results)?;
        let filter = SearchFilter::parse(filter)?;
        if experiment_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; experiment_ids.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM runs WHERE experiment_id IN ({}) AND lifecycle_stage IN {}
             ORDER BY start_time DESC, run_uuid",
            RUN_COLUMNS,
            placeholders,
            stage_filter(view_type)
        );
        let mut query = sqlx::query(&sql);
        for experiment_id in experiment_ids {
            query = query.bind(*experiment_id);
        }

        let mut conn = self.pool.acquire().await?;
        let infos = query
            .fetch_all(&mut *conn)
            .await?
            .iter()
            .map(run_info_from_row)
            .collect::<Result<Vec<_>>>()?;

        let mut runs = Vec::new();
        for info in infos {
            let data = fetch_run_data(&mut conn, &info.run_id).await?;
            let run = Run { info, data };
            if filter.matches(&run) {
                runs.push(run);
                if runs.len() == max_results {
                    break;
                }
            }
        }
        Ok(runs)
    }

    async fn batch_log(
        &self,
        run_id: &str,
        metrics: &[Metric],
        params: &[Param],
        tags: &[RunTag],
    ) -> Result<()> {
        let mut tx = begin_write(&self.pool).await?;
        require_active_run(&fetch_run_info(&mut tx, run_id).await?)?;

        for metric in metrics {
            insert_metric(&mut tx, run_id, metric).await?;
        }
        for param in params {
            insert_param(&mut tx, run_id, param).await?;
        }
        for tag in tags {
            upsert_tag(&mut tx, run_id, tag).await?;
        }

        tx.commit().await?;

        tracing::debug!(
            run_id = %run_id,
            metrics = metrics.len(),
            params = params.len(),
            tags = tags.len(),
            "Batch committed"
        );
        Ok(())
    }
}
