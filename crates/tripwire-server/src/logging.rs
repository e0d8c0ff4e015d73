use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

/// Directive used when `RUST_LOG` is unset. Targets are matched by prefix,
/// so `tripwire` covers every crate of the workspace.
pub fn default_directive(level: &str) -> String {
    format!("tripwire={level}")
}

/// Installs the global subscriber. `RUST_LOG` wins over `[log] level`.
pub fn init_tracing(config: &LogConfig) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directive(&config.level))?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {e}"))
}
