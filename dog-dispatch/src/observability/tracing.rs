//! Subscriber bootstrap for binaries embedding dispatchers or workers.
//!
//! Both functions read `RUST_LOG` and fall back to `info`. Calling either one
//! after a global subscriber is installed does nothing.

use tracing_subscriber::EnvFilter;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Human-readable logs on stdout
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_target(true)
        .try_init();
}

/// One JSON object per event, for log shippers
pub fn init_json_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .json()
        .with_current_span(true)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_tracing();
        init_json_tracing();
        ::tracing::info!("still logging");
    }
}
