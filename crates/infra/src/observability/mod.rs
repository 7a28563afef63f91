//! Tracing subscriber setup
//!
//! Library code only emits `tracing` events. The hosting application calls
//! [`init_tracing`] once at start-up to decide where they go.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use clinicflow_domain::{ClinicFlowError, Result};

/// Output format for log lines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, multi-line output for development
    #[default]
    Pretty,
    /// One JSON object per line for log shippers
    Json,
}

/// Install the global subscriber
///
/// Filtering follows `RUST_LOG`, defaulting to `info`. Noisy transport crates
/// are capped at `warn`.
///
/// # Errors
/// Returns `ClinicFlowError::Config` if a subscriber is already installed or
/// the filter directives are invalid.
pub fn init_tracing(format: LogFormat) -> Result<()> {
    let filter = build_filter()?;

    let result = match format {
        LogFormat::Pretty => Registry::default()
            .with(filter)
            .with(fmt::layer().with_target(false).pretty())
            .try_init(),
        LogFormat::Json => Registry::default()
            .with(filter)
            .with(fmt::layer().json().with_current_span(true))
            .try_init(),
    };

    result.map_err(|e| ClinicFlowError::Config(format!("Failed to install tracing subscriber: {}", e)))
}

fn build_filter() -> Result<EnvFilter> {
    let directive = |raw: &str| {
        raw.parse()
            .map_err(|e| ClinicFlowError::Config(format!("Invalid log directive '{}': {}", raw, e)))
    };

    Ok(EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy()
        .add_directive(directive("hyper=warn")?)
        .add_directive(directive("reqwest=warn")?))
}
