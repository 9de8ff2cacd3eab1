//! Logging and tracing setup for the provider.
//!
//! All logs are written to **stderr**: stdout carries only the handshake line.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: full filter directives (e.g. `info`, `overseerr_provider=debug`)
//! - `TF_LOG_PROVIDER`: host-provided level, used when `RUST_LOG` is unset
//! - `TF_LOG`: host-wide level, used when neither of the above is set
//!
//! `TF_LOG*` accept the level names `TRACE`, `DEBUG`, `INFO`, `WARN`, `ERROR`
//! and `OFF` in any case. `JSON` is treated as `TRACE`.
//!
//! # Examples
//!
//! ```bash
//! # Show debug logs for the provider only
//! RUST_LOG=overseerr_provider=debug terraform-provider-overseerr
//!
//! # Let the host decide
//! TF_LOG_PROVIDER=DEBUG terraform-provider-overseerr
//! ```

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Host variable naming the provider log level.
pub const TF_LOG_PROVIDER_ENV: &str = "TF_LOG_PROVIDER";

/// Host variable naming the global log level.
pub const TF_LOG_ENV: &str = "TF_LOG";

/// Initialize the default logging subscriber.
///
/// Defaults to `info` when no variable selects a level.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    init_logging_with_default("info");
}

/// Initialize logging with a custom default level.
///
/// Like [`init_logging`], but `default_level` is used when no variable
/// selects a level.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging_with_default(default_level: &str) {
    subscriber(build_filter(default_level)).init();
}

/// Try to initialize logging, returning false if already initialized.
///
/// Unlike [`init_logging`], this function does not panic if a subscriber
/// has already been set, which makes it safe to call from tests.
pub fn try_init_logging() -> bool {
    subscriber(build_filter("info")).try_init().is_ok()
}

fn subscriber(filter: EnvFilter) -> impl tracing::Subscriber + Send + Sync + 'static {
    tracing_subscriber::registry().with(filter).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false),
    )
}

fn build_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let tf_log_provider = std::env::var(TF_LOG_PROVIDER_ENV).ok();
        let tf_log = std::env::var(TF_LOG_ENV).ok();
        let directive =
            fallback_directive(tf_log_provider.as_deref(), tf_log.as_deref(), default_level);
        EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info"))
    })
}

/// Pick the filter directive used when `RUST_LOG` is unset.
pub(crate) fn fallback_directive<'a>(
    tf_log_provider: Option<&str>,
    tf_log: Option<&str>,
    default_level: &'a str,
) -> &'a str {
    tf_log_provider
        .and_then(tf_log_level)
        .or_else(|| tf_log.and_then(tf_log_level))
        .unwrap_or(default_level)
}

fn tf_log_level(value: &str) -> Option<&'static str> {
    match value.trim().to_ascii_lowercase().as_str() {
        "trace" | "json" => Some("trace"),
        "debug" => Some("debug"),
        "info" => Some("info"),
        "warn" => Some("warn"),
        "error" => Some("error"),
        "off" => Some("off"),
        _ => None,
    }
}
