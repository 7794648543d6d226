//! Tracing initialization.
//!
//! Logs are JSON lines with timestamps, filtered by `RUST_LOG` (default `info`).

use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "info";

/// `RUST_LOG` if it is set and valid, otherwise `default`.
pub fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Initialize tracing for the process with the default filter.
pub fn init() {
    init_with(DEFAULT_FILTER);
}

/// Initialize tracing, falling back to `default_filter` when `RUST_LOG` is unset.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_with(default_filter: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_filter))
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init();
        assert!(!init_with("debug"));
        ::tracing::info!(stage = "test", "still logging");
    }

    #[test]
    fn default_filter_is_used_without_rust_log() {
        if std::env::var("RUST_LOG").is_err() {
            assert_eq!(env_filter("warn").to_string(), "warn");
        }
    }
}
