//! # ragline-telemetry
//!
//! Logging setup shared by Ragline binaries, plus an in-memory event
//! capture for tests.
//!
//! ```rust,ignore
//! ragline_telemetry::init_logging("rag-indexer")?;
//! tracing::info!(collection = "gdpr_collection", "indexing started");
//! ```
//!
//! Both initializers read `RUST_LOG` (default `info`) and are idempotent:
//! only the first call in a process installs a subscriber.

mod capture;

pub use capture::{CaptureLayer, CapturedEvent, EventCapture};

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info";

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid log filter '{filter}': {message}")]
    InvalidFilter { filter: String, message: String },
}

/// Output format of the global subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    Pretty,
    /// One JSON object per event.
    Json,
}

fn env_filter() -> Result<EnvFilter, TelemetryError> {
    match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(filter) if !filter.trim().is_empty() => EnvFilter::try_new(&filter)
            .map_err(|e| TelemetryError::InvalidFilter { filter, message: e.to_string() }),
        _ => Ok(EnvFilter::new(DEFAULT_FILTER)),
    }
}

/// Install the global subscriber for `service`.
///
/// Returns `Ok(false)` if a global subscriber was already installed.
pub fn init(service: &str, format: LogFormat) -> Result<bool, TelemetryError> {
    let filter = env_filter()?;
    let installed = match format {
        LogFormat::Pretty => {
            tracing_subscriber::fmt().with_env_filter(filter).with_target(false).try_init().is_ok()
        }
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .try_init()
            .is_ok(),
    };
    if installed {
        tracing::info!(service, ?format, "logging initialized");
    }
    Ok(installed)
}

/// [`init`] with human-readable output.
pub fn init_logging(service: &str) -> Result<bool, TelemetryError> {
    init(service, LogFormat::Pretty)
}

/// [`init`] with JSON-lines output.
pub fn init_json_logging(service: &str) -> Result<bool, TelemetryError> {
    init(service, LogFormat::Json)
}
