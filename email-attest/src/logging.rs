//! Tracing subscriber setup for the binary

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when `RUST_LOG` isn't set
pub const DEFAULT_LOG_FILTER: &str = "email_attest=info";

/// Log to stderr, filtered by `RUST_LOG`.
///
/// With `json`, every event is one JSON object per line, otherwise
/// human-readable output, colored if `ansi`.
pub fn setup_tracing(ansi: bool, json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| fmt::layer().with_ansi(ansi).with_writer(std::io::stderr)))
        .with(filter)
        .init();
}
