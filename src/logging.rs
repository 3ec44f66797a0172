use crate::config::AppConfig;
use tracing_subscriber::{fmt, EnvFilter};

/// Initializes the global tracing subscriber from configuration.
///
/// `RUST_LOG` overrides `config.log_level` when set. Safe to call once;
/// subsequent calls return an error from the subscriber registry which we
/// swallow so tests can share a process.
pub fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true);

    let result = if config.log_json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if let Err(e) = result {
        tracing::debug!("tracing subscriber already initialized: {}", e);
    }
}
