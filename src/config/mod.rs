//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Config struct definitions (Config, CoreConfig, LoggingConfig)
//! - [`defaults`]: serde default values
//! - [`validation`]: startup checks

pub mod defaults;
mod types;
pub mod validation;

pub use types::{AuthMethod, Config, CoreConfig, LogFormat, LoggingConfig};
