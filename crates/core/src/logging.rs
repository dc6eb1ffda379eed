//! Structured logging infrastructure for Meshage.
//!
//! Centralized `tracing` subscriber setup with plain or JSON output and
//! `RUST_LOG` based filtering.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn filter_or(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Initialize the logging system with human-readable output.
///
/// Log level can be configured via the `RUST_LOG` environment variable.
/// If not set, defaults to `info` level.
///
/// # Example
/// ```no_run
/// use meshage_core::logging;
///
/// logging::init();
/// tracing::info!("Node started");
/// ```
pub fn init() {
    init_with_default("info");
}

/// Like [`init`], but with a caller-chosen directive when `RUST_LOG` is unset.
pub fn init_with_default(default_directive: &str) {
    tracing_subscriber::registry()
        .with(filter_or(default_directive))
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

/// Initialize the logging system with JSON output for log aggregation.
///
/// # Example
/// ```no_run
/// use meshage_core::logging;
///
/// logging::init_json();
/// tracing::info!(node = "alice", "Presence started");
/// ```
pub fn init_json() {
    tracing_subscriber::registry()
        .with(filter_or("info"))
        .with(fmt::layer().json().with_target(true).with_thread_ids(true))
        .init();
}

/// Install a test-friendly subscriber; repeated calls are ignored.
pub fn try_init_for_tests() {
    let _ = tracing_subscriber::registry()
        .with(filter_or("debug"))
        .with(fmt::layer().with_test_writer())
        .try_init();
}
