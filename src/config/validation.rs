//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use std::path::Path;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("core.nick is required")]
    MissingNick,
    #[error("core.host is required")]
    MissingHost,
    #[error("core.nick must not contain spaces, got '{0}'")]
    InvalidNick(String),
    #[error("core.prefix is not a valid regular expression: {0}")]
    InvalidPrefix(String),
    #[error("core.ca_certs does not exist: {0}")]
    CaCertsNotFound(String),
    #[error("core.client_cert_file does not exist: {0}")]
    ClientCertNotFound(String),
    #[error("core.client_cert_key does not exist: {0}")]
    ClientKeyNotFound(String),
    #[error("SASL PLAIN requires a password")]
    SaslPasswordMissing,
    #[error("core.flood_burst_lines must be at least 1")]
    InvalidFloodBurst,
    #[error("core.{0} must be a finite number of at least 0")]
    InvalidDuration(&'static str),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let core = &config.core;

    // Required fields
    if core.nick.is_empty() {
        errors.push(ValidationError::MissingNick);
    } else if core.nick.contains(' ') {
        errors.push(ValidationError::InvalidNick(core.nick.clone()));
    }
    if core.host.is_empty() {
        errors.push(ValidationError::MissingHost);
    }

    if let Err(e) = regex::Regex::new(&core.prefix) {
        errors.push(ValidationError::InvalidPrefix(e.to_string()));
    }

    // TLS files
    if let Some(ref path) = core.ca_certs
        && !Path::new(path).exists()
    {
        errors.push(ValidationError::CaCertsNotFound(path.display().to_string()));
    }
    if let Some(ref path) = core.client_cert_file
        && !Path::new(path).exists()
    {
        errors.push(ValidationError::ClientCertNotFound(
            path.display().to_string(),
        ));
    }
    if let Some(ref path) = core.client_cert_key
        && !Path::new(path).exists()
    {
        errors.push(ValidationError::ClientKeyNotFound(path.display().to_string()));
    }

    if let Some(sasl) = core.sasl()
        && sasl.mechanism.eq_ignore_ascii_case("PLAIN")
        && sasl.password.as_deref().is_none_or(str::is_empty)
    {
        errors.push(ValidationError::SaslPasswordMissing);
    }

    if core.flood_burst_lines == 0 {
        errors.push(ValidationError::InvalidFloodBurst);
    }
    for (name, value) in [
        ("flood_empty_wait", core.flood_empty_wait),
        ("flood_max_wait", core.flood_max_wait),
        ("flood_penalty_ratio", core.flood_penalty_ratio),
        ("antiloop_window", core.antiloop_window),
    ] {
        if !value.is_finite() || value < 0.0 {
            errors.push(ValidationError::InvalidDuration(name));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
