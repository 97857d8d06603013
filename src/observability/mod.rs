//! Tracing and metrics initialisation

pub mod metrics;

use crate::utils::config::ObservabilityConfig;
use crate::utils::errors::{EngineError, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global tracing subscriber
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| EngineError::ObservabilityError(format!("Invalid log filter: {}", e)))?;

    let registry = tracing_subscriber::registry().with(filter);

    let installed = if config.json_logs {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().with_thread_names(true)).try_init()
    };

    installed.map_err(|e| {
        EngineError::ObservabilityError(format!("Failed to install tracing subscriber: {}", e))
    })
}

/// Install the Prometheus exporter when a listen address is configured
pub fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    let Some(addr) = config.metrics_addr.as_deref() else {
        return Ok(());
    };

    let addr: SocketAddr = addr.parse().map_err(|e| {
        EngineError::ObservabilityError(format!("Invalid metrics address '{}': {}", addr, e))
    })?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| {
            EngineError::ObservabilityError(format!("Failed to install metrics exporter: {}", e))
        })?;

    info!("Prometheus metrics listening on {}", addr);
    Ok(())
}
