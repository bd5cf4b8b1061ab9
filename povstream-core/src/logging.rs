use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

use crate::config::LoggingConfig;

/// Initialize structured logging based on configuration.
///
/// Supports JSON (production) and pretty (development) formats with the level
/// taken from `RUST_LOG` when set, the config otherwise.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| anyhow::anyhow!("Invalid log level {:?}: {e}", config.level))?;

    let registry = tracing_subscriber::registry().with(env_filter);

    if config.format.as_str() == "json" {
        registry
            .with(fmt::layer().json().with_target(true).with_line_number(true))
            .init();
    } else {
        registry
            .with(fmt::layer().pretty().with_target(true))
            .init();
    }

    Ok(())
}
