pub mod artifacts;
pub mod config;
pub mod entities;
pub mod error;
pub mod handlers;
pub mod lifecycle;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod protocol;
pub mod search;
pub mod server;
pub mod signals;
pub mod store;
pub mod validation;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing/logging
///
/// `RUST_LOG` wins over `log_level`. `log_format` is `text` or `json`.
pub fn init_tracing(log_level: &str, log_format: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(filter);

    // A subscriber may already be installed (tests, repeated CLI setup)
    let _ = if log_format == "json" {
        registry
            .with(fmt::layer().json().with_target(true))
            .try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };
}
