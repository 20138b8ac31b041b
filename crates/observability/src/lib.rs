//! Tracing/logging initialization shared by binaries and tests.
//!
//! Configured the same way applications are: environment-shaped keys, with
//! chronicle-specific keys consulted before the generic ones.

use tracing_subscriber::EnvFilter;

/// Filter directives, consulted before `RUST_LOG` (e.g.
/// `chronicle_persistence=debug,info`).
pub const LOG_FILTER: &str = "CHRONICLE_LOG";

/// Output format: "json" for machine-readable logs, anything else (or
/// unset) for compact text.
pub const LOG_FORMAT: &str = "CHRONICLE_LOG_FORMAT";

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init() {
    let filter = std::env::var(LOG_FILTER)
        .map(EnvFilter::new)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if wants_json() {
        // One flat JSON object per line, for log shippers.
        let _ = builder.json().flatten_event(true).try_init();
    } else {
        let _ = builder.compact().try_init();
    }
}

fn wants_json() -> bool {
    std::env::var(LOG_FORMAT).is_ok_and(|v| v.eq_ignore_ascii_case("json"))
}
