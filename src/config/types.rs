//! Core configuration types and loading.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use super::defaults::*;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Bot configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Identity, connection and behaviour settings.
    pub core: CoreConfig,
    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// How the bot authenticates its account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    /// `PRIVMSG NickServ :IDENTIFY <password>` after registration.
    Nickserv,
    /// `AUTHSERV auth <account> <password>` after registration.
    Authserv,
    /// `AUTH <account> <password>` to Q after registration.
    #[serde(rename = "Q", alias = "q")]
    Q,
    /// `PRIVMSG UserServ :LOGIN <account> <password>` after registration.
    Userserv,
    /// SASL during capability negotiation.
    Sasl,
    /// `PASS` before registration.
    Server,
}

/// How the bot authenticates to the server itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerAuthMethod {
    /// SASL during capability negotiation.
    Sasl,
    /// `PASS` before registration.
    Server,
}

/// Credentials used for SASL, whichever setting they came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaslCredentials {
    /// Account name; the current nick when unset.
    pub username: Option<String>,
    /// Password; required by PLAIN only.
    pub password: Option<String>,
    /// Mechanism name, `PLAIN` by default.
    pub mechanism: String,
}

/// The `[core]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct CoreConfig {
    /// Nickname to register with.
    pub nick: String,
    /// Ident; defaults to the nick.
    pub user: Option<String>,
    /// Real name.
    #[serde(default = "default_name")]
    pub name: String,
    /// Server host name.
    pub host: String,
    /// Server port; 6667, or 6697 with TLS.
    pub port: Option<u16>,
    /// Local address to connect from.
    pub bind_host: Option<String>,
    #[serde(default)]
    pub use_ssl: bool,
    #[serde(default = "default_true")]
    pub verify_ssl: bool,
    /// PEM bundle used instead of the system roots.
    pub ca_certs: Option<PathBuf>,
    /// Client certificate (for SASL EXTERNAL or CertFP).
    pub client_cert_file: Option<PathBuf>,
    /// Key for `client_cert_file`; the cert file itself when unset.
    pub client_cert_key: Option<PathBuf>,

    /// Channels to join after registration, `"#chan"` or `"#chan key"`.
    #[serde(default)]
    pub channels: Vec<String>,
    /// Owner nick, shown by the help command.
    pub owner: Option<String>,
    /// Command prefix, as a regular expression.
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Prefix shown in help output.
    #[serde(default = "default_help_prefix")]
    pub help_prefix: String,
    /// User modes set after registration.
    #[serde(default = "default_user_modes")]
    pub modes: String,

    /// Seconds without any inbound line before the connection is dropped.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Seconds of silence before a PING is sent; 0 means 45% of `timeout`.
    #[serde(default)]
    pub timeout_ping_interval: u64,
    /// Seconds to wait before reconnecting.
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay: u64,

    pub auth_method: Option<AuthMethod>,
    pub auth_username: Option<String>,
    pub auth_password: Option<String>,
    /// Service nick for account auth, or the SASL mechanism.
    pub auth_target: Option<String>,
    pub server_auth_method: Option<ServerAuthMethod>,
    pub server_auth_username: Option<String>,
    pub server_auth_password: Option<String>,
    pub server_auth_sasl_mechanism: Option<String>,

    /// Log every line sent and received at target `sopel::raw`.
    #[serde(default)]
    pub log_raw: bool,

    #[serde(default = "default_flood_burst_lines")]
    pub flood_burst_lines: u32,
    #[serde(default = "default_flood_empty_wait")]
    pub flood_empty_wait: f64,
    #[serde(default = "default_flood_refill_rate")]
    pub flood_refill_rate: u32,
    #[serde(default = "default_flood_max_wait")]
    pub flood_max_wait: f64,
    #[serde(default = "default_flood_text_length")]
    pub flood_text_length: usize,
    #[serde(default = "default_flood_penalty_ratio")]
    pub flood_penalty_ratio: f64,

    #[serde(default = "default_antiloop_threshold")]
    pub antiloop_threshold: usize,
    #[serde(default = "default_antiloop_window")]
    pub antiloop_window: f64,
    #[serde(default = "default_antiloop_repeat_text")]
    pub antiloop_repeat_text: String,
    #[serde(default = "default_antiloop_silent_after")]
    pub antiloop_silent_after: usize,
}

impl CoreConfig {
    /// Minimal settings for `nick` on `host`, everything else defaulted.
    pub fn new(nick: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            nick: nick.into(),
            user: None,
            name: default_name(),
            host: host.into(),
            port: None,
            bind_host: None,
            use_ssl: false,
            verify_ssl: true,
            ca_certs: None,
            client_cert_file: None,
            client_cert_key: None,
            channels: Vec::new(),
            owner: None,
            prefix: default_prefix(),
            help_prefix: default_help_prefix(),
            modes: default_user_modes(),
            timeout: default_timeout(),
            timeout_ping_interval: 0,
            reconnect_delay: default_reconnect_delay(),
            auth_method: None,
            auth_username: None,
            auth_password: None,
            auth_target: None,
            server_auth_method: None,
            server_auth_username: None,
            server_auth_password: None,
            server_auth_sasl_mechanism: None,
            log_raw: false,
            flood_burst_lines: default_flood_burst_lines(),
            flood_empty_wait: default_flood_empty_wait(),
            flood_refill_rate: default_flood_refill_rate(),
            flood_max_wait: default_flood_max_wait(),
            flood_text_length: default_flood_text_length(),
            flood_penalty_ratio: default_flood_penalty_ratio(),
            antiloop_threshold: default_antiloop_threshold(),
            antiloop_window: default_antiloop_window(),
            antiloop_repeat_text: default_antiloop_repeat_text(),
            antiloop_silent_after: default_antiloop_silent_after(),
        }
    }

    /// Ident to register with.
    pub fn user(&self) -> &str {
        self.user.as_deref().unwrap_or(&self.nick)
    }

    /// Port to connect to.
    pub fn port(&self) -> u16 {
        match self.port {
            Some(port) => port,
            None if self.use_ssl => DEFAULT_TLS_PORT,
            None => DEFAULT_PORT,
        }
    }

    /// Server timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Idle time before a PING is sent.
    pub fn ping_interval(&self) -> Duration {
        if self.timeout_ping_interval == 0 {
            self.timeout().mul_f64(0.45)
        } else {
            Duration::from_secs(self.timeout_ping_interval)
        }
    }

    /// Password to send with `PASS`, when server auth is configured.
    pub fn server_password(&self) -> Option<&str> {
        if self.auth_method == Some(AuthMethod::Server) {
            self.auth_password.as_deref()
        } else if self.server_auth_method == Some(ServerAuthMethod::Server) {
            self.server_auth_password.as_deref()
        } else {
            None
        }
    }

    /// SASL settings, when SASL is configured.
    ///
    /// `auth_method = "sasl"` wins over `server_auth_method = "sasl"`.
    pub fn sasl(&self) -> Option<SaslCredentials> {
        if self.auth_method == Some(AuthMethod::Sasl) {
            Some(SaslCredentials {
                username: self.auth_username.clone(),
                password: self.auth_password.clone(),
                mechanism: self.auth_target.clone().unwrap_or_else(|| "PLAIN".into()),
            })
        } else if self.server_auth_method == Some(ServerAuthMethod::Sasl) {
            Some(SaslCredentials {
                username: self.server_auth_username.clone(),
                password: self.server_auth_password.clone(),
                mechanism: self
                    .server_auth_sasl_mechanism
                    .clone()
                    .unwrap_or_else(|| "PLAIN".into()),
            })
        } else {
            None
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// The `[logging]` section. `RUST_LOG` overrides `level`.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}
