//! Logging setup for the relay binaries.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber with the given default log level.
///
/// The level applies to both the library crate and the binary and can be
/// overridden with the `RUST_LOG` environment variable.
///
/// # Arguments
///
/// * `binary_name` - Name of the binary (e.g. "server")
/// * `default_level` - Default log level (e.g. "debug", "info")
pub fn setup_logger(binary_name: &str, default_level: &str) {
    let fallback = || {
        let lib_target = env!("CARGO_PKG_NAME").replace('-', "_");
        EnvFilter::new(format!(
            "{lib_target}={default_level},{binary_name}={default_level}"
        ))
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
