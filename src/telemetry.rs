//! Tracing subscriber setup for the binary.
//!
//! `RUST_LOG` wins when set; otherwise the configured filter applies.
//! Logs go to stderr so command output on stdout stays clean.

use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::{LogFormat, LoggingConfig};

/// Installs the global subscriber.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init(config: &LoggingConfig) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    tracing_subscriber::registry()
        .with(stderr_layer(config.format))
        .with(filter)
        .try_init()
}

fn stderr_layer(format: LogFormat) -> Box<dyn Layer<Registry> + Send + Sync> {
    match format {
        LogFormat::Compact => Box::new(fmt::layer().compact().with_writer(std::io::stderr)),
        LogFormat::Pretty => Box::new(fmt::layer().pretty().with_writer(std::io::stderr)),
        LogFormat::Json => Box::new(
            fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(true)
                .with_span_list(true),
        ),
    }
}
