//! Tracing setup for runners and tests
//!
//! The engine only emits `tracing` events. A runner that wants them printed
//! calls [`init_tracing`] once; later calls are no-ops.

use std::sync::Once;
use tracing_subscriber::EnvFilter;

static GLOBAL_INIT: Once = Once::new();

/// Environment variable holding the filter directives for nestrun output.
pub const LOG_ENV: &str = "NESTRUN_LOG";

const DEFAULT_DIRECTIVES: &str = "warn";

/// Install a global fmt subscriber filtered by `NESTRUN_LOG` or `RUST_LOG`.
///
/// Does nothing when a global subscriber is already installed.
pub fn init_tracing() {
    GLOBAL_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter())
            .with_target(true)
            .try_init();
    });
}

fn env_filter() -> EnvFilter {
    let directives = std::env::var(LOG_ENV)
        .or_else(|_| std::env::var(EnvFilter::DEFAULT_ENV))
        .unwrap_or_else(|_| DEFAULT_DIRECTIVES.to_string());
    EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}
