//! Logging setup
//!
//! The library only emits `tracing` events; hosts decide where they go.
//! [`init_tracing`] is a convenience for binaries and demos.

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Output format of the installed subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable, multi-line
    #[default]
    Pretty,
    /// Single-line compact text
    Compact,
    /// One JSON object per event
    Json,
}

/// Install a global subscriber filtered by `RUST_LOG` (default `info`).
///
/// Returns `false` when a global subscriber was already installed.
pub fn init_tracing(format: LogFormat) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let layer = match format {
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
        LogFormat::Json => fmt::layer().json().with_current_span(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()
        .is_ok()
}
