//! Logging setup.
//!
//! Logs are written to **stderr**: stdout carries the handshake line the
//! host reads to find the provider's address.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Controls log levels (e.g., `info`, `debug`, `minecraft_provider=debug`)
//!
//! ```bash
//! # Show drift decisions and hashing
//! RUST_LOG=minecraft_provider=debug ./minecraft-provider
//! ```

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_LEVEL: &str = "info";

fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
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

/// Initialize logging at [`DEFAULT_LEVEL`] unless `RUST_LOG` says otherwise.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    init_logging_with_default(DEFAULT_LEVEL);
}

/// Initialize logging with a custom default level.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging_with_default(default_level: &str) {
    tracing_subscriber::registry()
        .with(filter(default_level))
        .with(stderr_layer())
        .init();
}

/// Try to initialize logging, returning false if already initialized.
pub fn try_init_logging() -> bool {
    tracing_subscriber::registry()
        .with(filter(DEFAULT_LEVEL))
        .with(stderr_layer())
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    // The global subscriber can only be set once per process, so only
    // filter parsing is checked here.

    use super::*;

    #[test]
    fn test_env_filter_parsing() {
        assert!(EnvFilter::try_new(DEFAULT_LEVEL).is_ok());
        assert!(EnvFilter::try_new("minecraft_provider=debug").is_ok());
        assert!(EnvFilter::try_new("warn,minecraft_provider::drift=debug").is_ok());
    }
}
