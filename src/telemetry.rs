//! Log setup and standard spans.

use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    match logging.format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Log a raw line in direction `>>` (sent) or `<<` (received).
pub fn log_raw(line: &str, direction: &str) {
    tracing::info!(target: "sopel::raw", "{}\t{:?}", direction, line.trim_end_matches(['\r', '\n']));
}

/// Standardized span constructors for bot observability.
pub mod spans {
    use tracing::{Span, debug_span, info_span};

    /// Span for one connection to a server.
    pub fn connection(host: &str, port: u16) -> Span {
        info_span!("connection", host = %host, port = port)
    }

    /// Span for one rule invocation.
    pub fn rule(label: &str, command: &str, sender: Option<&str>) -> Span {
        if let Some(sender) = sender {
            debug_span!("rule", rule = %label, command = %command, sender = %sender)
        } else {
            debug_span!("rule", rule = %label, command = %command)
        }
    }
}
