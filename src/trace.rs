//! Log output for the `handoff` binary and for debugging tests.
//!
//! The library only emits `tracing` events; nothing is printed unless a
//! subscriber is installed through one of these functions.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs a global subscriber writing to stderr.
///
/// `RUST_LOG` takes precedence; otherwise `default_directive` is used, e.g.
/// `"bounded_handoff=info"`. Calling this twice is a no-op.
pub fn init_tracing(default_directive: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_names(true)
                .with_timer(fmt::time::uptime()),
        )
        .with(filter)
        .try_init();
}

/// Subscriber for tests: captured by the test harness, off unless `RUST_LOG`
/// is set.
#[cfg(test)]
pub(crate) fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .with_thread_names(true)
        .try_init();
}
