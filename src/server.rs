use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::{net::SocketAddr, sync::Arc};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    config::Config,
    handlers::{self, AppState},
    metrics,
    protocol::{paths, route},
    signals::shutdown_signal,
    store::SqliteStore,
};

/// Start the tracking server
///
/// This function:
/// 1. Initializes metrics (when enabled)
/// 2. Opens and migrates the SQLite store
/// 3. Binds to the configured address
/// 4. Serves requests until SIGTERM/SIGINT, then drains connections
pub async fn start_server(config: Config) -> Result<()> {
    let metrics_handle = if config.metrics.enabled {
        info!("Initializing Prometheus metrics...");
        Some(Arc::new(metrics::init_metrics()?))
    } else {
        None
    };

    let store = SqliteStore::open(&config.store).await?;
    let state = AppState::new(Arc::new(store), &config.store.default_artifact_root);

    let app = create_router(
        state,
        metrics_handle.map(|handle| (config.metrics.endpoint.clone(), handle)),
    );

    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));

    info!("Starting tracking server on {}", addr);
    info!(
        "Store: {}, artifact root: {}",
        config.store.database_url, config.store.default_artifact_root
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_signal().await;
            info!("Shutdown signal received, draining connections...");
        })
        .await?;

    info!("Server stopped gracefully");
    Ok(())
}

/// Build the router with all tracking API routes and middleware.
///
/// `metrics` is the exposition path and handle, when metrics are enabled.
pub fn create_router(state: AppState, metrics: Option<(String, Arc<PrometheusHandle>)>) -> Router {
    use handlers::{artifacts, experiments, runs};

    let api = Router::new()
        .route(&route(paths::CREATE_EXPERIMENT), post(experiments::create_experiment))
        .route(&route(paths::GET_EXPERIMENT), get(experiments::get_experiment))
        .route(&route(paths::GET_EXPERIMENT_BY_NAME), get(experiments::get_experiment_by_name))
        .route(&route(paths::LIST_EXPERIMENTS), get(experiments::list_experiments))
        .route(&route(paths::DELETE_EXPERIMENT), post(experiments::delete_experiment))
        .route(&route(paths::RESTORE_EXPERIMENT), post(experiments::restore_experiment))
        .route(&route(paths::UPDATE_EXPERIMENT), post(experiments::update_experiment))
        .route(&route(paths::CREATE_RUN), post(runs::create_run))
        .route(&route(paths::GET_RUN), get(runs::get_run))
        .route(&route(paths::UPDATE_RUN), post(runs::update_run))
        .route(&route(paths::DELETE_RUN), post(runs::delete_run))
        .route(&route(paths::RESTORE_RUN), post(runs::restore_run))
        .route(&route(paths::LIST_RUNS), get(runs::list_runs))
        .route(&route(paths::LOG_METRIC), post(runs::log_metric))
        .route(&route(paths::LOG_PARAM), post(runs::log_param))
        .route(&route(paths::SET_TAG), post(runs::set_tag))
        .route(&route(paths::LOG_BATCH), post(runs::log_batch))
        .route(&route(paths::SEARCH_RUNS), post(runs::search_runs))
        .route(&route(paths::GET_METRIC_HISTORY), get(runs::get_metric_history))
        .route(&route(paths::LIST_ARTIFACTS), get(artifacts::list_artifacts))
        .route("/ready", get(handlers::health::readiness_check))
        .with_state(state);

    let mut app = Router::new()
        .route("/health", get(handlers::health::health_check))
        .merge(api);

    if let Some((endpoint, handle)) = metrics {
        app = app.merge(
            Router::new()
                .route(&endpoint, get(handlers::metrics_handler::metrics))
                .with_state(handle),
        );
    }

    // Oversized batches must reach the handler to get a structured error
    app.layer(DefaultBodyLimit::max(10 * 1024 * 1024))
        .layer(TraceLayer::new_for_http())
}
