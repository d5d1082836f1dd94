use anyhow::{Result, anyhow};
use parkway_config::AppConfig;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// configured level.
pub fn init(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_filter()))
        .map_err(|e| anyhow!("invalid log filter {:?}: {e}", config.log_filter()))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.debug);

    if config.log.json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    }
    .map_err(|err| anyhow!(err))
}
