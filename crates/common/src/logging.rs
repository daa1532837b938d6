//! Tracing subscriber setup

use tracing_subscriber::{fmt, EnvFilter};

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global formatter. `RUST_LOG` overrides the default `info` level.
pub fn init() {
    fmt().with_env_filter(filter()).init();
}

/// Like [`init`], but tolerates a subscriber that is already installed.
pub fn try_init() -> bool {
    fmt().with_env_filter(filter()).with_test_writer().try_init().is_ok()
}
