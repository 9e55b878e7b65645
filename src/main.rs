//! sopel-ng - an asynchronous IRC bot
//!
//! Connects to one server, negotiates IRCv3 capabilities, tracks channel
//! state and dispatches lines to rules.

mod backend;
mod bot;
mod builtins;
mod channels;
mod config;
mod dispatch;
mod error;
mod telemetry;
mod trigger;

use crate::bot::Bot;
use crate::config::validation::validate;
use crate::config::{Config, LoggingConfig};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            telemetry::init(&LoggingConfig::default());
            error!(path = %config_path, error = %e, "Failed to load config");
            return Err(e.into());
        }
    };
    telemetry::init(&config.logging);

    if let Err(errors) = validate(&config) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        anyhow::bail!("{} configuration error(s) in {}", errors.len(), config_path);
    }

    info!(
        nick = %config.core.nick,
        host = %config.core.host,
        port = config.core.port(),
        tls = config.core.use_ssl,
        "Starting sopel-ng"
    );

    let registry = builtins::registry(&config.core)?;
    info!(rules = registry.len(), "Rules registered");

    let mut bot = Bot::new(config.core, registry);
    bot.run().await?;

    info!("Shutdown complete");
    Ok(())
}
