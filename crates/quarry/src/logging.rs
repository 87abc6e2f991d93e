//! Log subscriber setup for the binary and for ad-hoc tools.

use tracing_subscriber::EnvFilter;

use crate::QuarryError;

/// Filter used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_FILTER: &str = "info";

/// Installs a `fmt` subscriber writing to stderr.
///
/// `RUST_LOG` wins over `default_filter`. Stdout stays free for
/// machine-readable output such as the `ping` summary line.
pub fn init_tracing(default_filter: &str) -> Result<(), QuarryError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| QuarryError::Logging(e.to_string()))
}
