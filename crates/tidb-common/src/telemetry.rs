//! Structured logging setup
//!
//! The control client and status updater only emit `tracing` events; the
//! hosting controller decides where they go. This module is the default way
//! to wire them up: JSON lines on stdout, filtered by `RUST_LOG`.

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or invalid
pub const DEFAULT_FILTER: &str = "info,tidb_controller=debug,kube=info,hyper=warn,reqwest=warn";

/// Errors that can occur during logging initialization
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global subscriber was already installed
    #[error("failed to initialize tracing subscriber: {0}")]
    SubscriberInit(String),
}

/// Configuration for logging initialization
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Service name attached to every log line
    pub service_name: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            service_name: "tidb-controller-manager".to_string(),
            json: true,
        }
    }
}

/// Build the env filter from `RUST_LOG`, falling back to [`DEFAULT_FILTER`]
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global tracing subscriber
///
/// # Example
///
/// ```ignore
/// use tidb_common::telemetry::{init_logging, LoggingConfig};
///
/// init_logging(LoggingConfig::default())?;
/// ```
pub fn init_logging(config: LoggingConfig) -> Result<(), TelemetryError> {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_file(false)
        .with_line_number(false);

    let result = if config.json {
        tracing_subscriber::registry()
            .with(env_filter())
            .with(fmt_layer.json().with_current_span(true).with_span_list(false))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter())
            .with(fmt_layer)
            .try_init()
    };
    result.map_err(|e| TelemetryError::SubscriberInit(e.to_string()))?;

    tracing::info!(service = %config.service_name, "Logging initialized");
    Ok(())
}
