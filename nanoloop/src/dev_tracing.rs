//! Tracing setup for demos and tests.

/// Development helper: initialize tracing subscriber when `RUST_LOG` is set.
///
/// Demos and tests can call `nanoloop::dev_tracing::init_tracing()` to enable
/// the `[SOCKET]`, `[LOOP]`, `[INPROC]`, `[SUB]` and `[RPC]` logs. This is a
/// no-op when `RUST_LOG` is not set or when a global subscriber is already
/// installed.
pub fn init_tracing() {
    use std::env;

    if env::var("RUST_LOG").is_ok() {
        // Best-effort: a subscriber may already be installed.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_target(false)
            .try_init();
    }
}

/// Initialize tracing at `level` unless `RUST_LOG` overrides it.
pub fn init_tracing_with_default(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
