//! Process-wide tracing subscriber installation.

use std::sync::OnceLock;
use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global `tracing` subscriber. Idempotent — safe to call more
/// than once (useful from integration tests that each spin up the engine).
pub fn init_tracing() {
    static INSTALLED: OnceLock<()> = OnceLock::new();
    INSTALLED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = fmt().with_env_filter(filter).try_init();
    });
}
