//! Logging setup for the provider binary.
//!
//! All logs go to **stderr**: stdout is reserved for the handshake line the
//! plugin host reads at startup. Filtering follows `RUST_LOG`, e.g.
//! `RUST_LOG=hemmer_provider_elasticstack=debug`.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the logging subscriber.
///
/// Writes to stderr, respects `RUST_LOG`, defaults to `info`.
///
/// # Panics
///
/// Panics if a global subscriber has already been set. Use
/// [`try_init_logging`] when initialization may happen more than once.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer())
        .init();
}

/// Try to initialize logging; returns `false` if a subscriber was already set.
pub fn try_init_logging() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer())
        .try_init()
        .is_ok()
}

fn stderr_layer<S>() -> impl tracing_subscriber::Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
}
