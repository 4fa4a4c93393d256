//! Process-local `tracing` initialisation (§4.8). The supervisor and each
//! worker binary independently call this once at startup, since they are
//! separate OS processes and share no subscriber state.

use gateway_core::LogFormat;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer};

/// Installs a global subscriber filtered by `RUST_LOG` (falling back to
/// `info`), formatted as human-readable text or compact JSON depending on
/// `format` (§4.8, §4.9).
pub fn init(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Pretty => {
            registry.with(tracing_subscriber::fmt::layer()).init();
        }
        LogFormat::Json => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }
}
