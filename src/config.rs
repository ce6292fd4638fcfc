use serde::{Deserialize, Serialize};

/// Default config file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "tracking.toml";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// `text` or `json`
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

/// Local SQLite store settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    /// Parent of per-experiment artifact locations
    #[serde(default = "default_artifact_root")]
    pub default_artifact_root: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_seconds: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            default_artifact_root: default_artifact_root(),
            max_connections: default_max_connections(),
            busy_timeout_seconds: default_busy_timeout(),
        }
    }
}

/// Remote store (REST client) settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    #[serde(default = "default_tracking_uri")]
    pub tracking_uri: String,
    #[serde(default = "default_client_timeout")]
    pub timeout_seconds: u64,
    /// Retries for read-only calls; mutations are never retried
    #[serde(default = "default_read_retries")]
    pub read_retries: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            tracking_uri: default_tracking_uri(),
            timeout_seconds: default_client_timeout(),
            read_retries: default_read_retries(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_endpoint")]
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            endpoint: default_metrics_endpoint(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_database_url() -> String {
    "sqlite:./data/tracking.db".to_string()
}

fn default_artifact_root() -> String {
    "./artifacts".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout() -> u64 {
    30
}

fn default_tracking_uri() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_client_timeout() -> u64 {
    60
}

fn default_read_retries() -> u32 {
    3
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_endpoint() -> String {
    "/metrics".to_string()
}

/// Load configuration from `path` (or `tracking.toml` when absent) and the
/// `TRACKING_SERVER__*` environment.
///
/// An explicitly given file must exist; the default file is optional.
pub fn load_config(path: Option<&str>) -> anyhow::Result<Config> {
    let file = match path {
        Some(path) => config::File::with_name(path).required(true),
        None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
    };

    let config = config::Config::builder()
        .add_source(file)
        .add_source(config::Environment::with_prefix("TRACKING_SERVER").separator("__"))
        .build()?;

    let cfg: Config = config.try_deserialize()?;
    validate_config(&cfg)?;

    Ok(cfg)
}

pub fn validate_config(cfg: &Config) -> anyhow::Result<()> {
    if cfg.server.host.trim().is_empty() {
        anyhow::bail!("server.host cannot be empty");
    }

    if cfg.server.port == 0 {
        anyhow::bail!("server.port must be non-zero");
    }

    if !matches!(cfg.server.log_format.as_str(), "text" | "json") {
        anyhow::bail!(
            "server.log_format must be 'text' or 'json', got '{}'",
            cfg.server.log_format
        );
    }

    if !cfg.store.database_url.starts_with("sqlite:") {
        anyhow::bail!(
            "store.database_url must be a sqlite: URL, got '{}'",
            cfg.store.database_url
        );
    }

    if cfg.store.max_connections == 0 {
        anyhow::bail!("store.max_connections must be at least 1");
    }

    let uri = &cfg.client.tracking_uri;
    if !(uri.starts_with("http://") || uri.starts_with("https://")) {
        anyhow::bail!("client.tracking_uri must start with http:// or https://, got '{}'", uri);
    }

    Ok(())
}
