//! Tracing setup for the command line tools.
//!
//! The filter is read from `RELPATCH_LOG`, then `RUST_LOG`, and defaults to `info`.

use std::sync::Once;
use tracing::debug;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "RELPATCH_LOG";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber with human readable output on stderr.
/// Later calls do nothing.
pub fn init_tracing() {
    INIT.call_once(|| {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false);

        tracing_subscriber::registry()
            .with(env_filter())
            .with(fmt_layer)
            .init();

        debug!("Tracing initialized");
    });
}

/// Like [`init_tracing`], but emits one JSON object per event.
pub fn init_tracing_json() {
    INIT.call_once(|| {
        let fmt_layer = fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true);

        tracing_subscriber::registry()
            .with(env_filter())
            .with(fmt_layer)
            .init();

        debug!("Tracing initialized (JSON mode)");
    });
}
