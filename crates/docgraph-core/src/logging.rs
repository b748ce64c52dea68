//! Tracing subscriber setup for applications embedding `docgraph`.
//!
//! The library itself only emits `tracing` events. Binaries and demos call
//! [`init_tracing`] once at startup to see them.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{Error, Result};

/// Installs the global tracing subscriber.
///
/// The filter comes from `RUST_LOG` when set, else from `config.level`.
/// `config.format` selects plain text or JSON lines.
///
/// # Errors
///
/// Returns [`Error::Config`] if a global subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if config.format == "json" {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };

    installed.map_err(|e| Error::Config(format!("tracing subscriber: {e}")))
}
