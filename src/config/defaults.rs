//! Default value functions for configuration.
//!
//! Separated into its own module for clarity and reuse.

/// Returns `true` (for serde defaults).
pub fn default_true() -> bool {
    true
}

// =============================================================================
// Identity Defaults
// =============================================================================

pub fn default_name() -> String {
    "Sopel: https://sopel.chat/".to_string()
}

pub fn default_prefix() -> String {
    r"\.".to_string()
}

pub fn default_help_prefix() -> String {
    ".".to_string()
}

pub fn default_user_modes() -> String {
    "B".to_string()
}

// =============================================================================
// Connection Defaults
// =============================================================================

pub const DEFAULT_PORT: u16 = 6667;
pub const DEFAULT_TLS_PORT: u16 = 6697;

pub fn default_timeout() -> u64 {
    120
}

pub fn default_reconnect_delay() -> u64 {
    20
}

// =============================================================================
// Flood Defaults
// =============================================================================

pub fn default_flood_burst_lines() -> u32 {
    4
}

pub fn default_flood_empty_wait() -> f64 {
    0.7
}

pub fn default_flood_refill_rate() -> u32 {
    1
}

pub fn default_flood_max_wait() -> f64 {
    2.0
}

pub fn default_flood_text_length() -> usize {
    50
}

pub fn default_flood_penalty_ratio() -> f64 {
    1.4
}

// =============================================================================
// Anti-loop Defaults
// =============================================================================

pub fn default_antiloop_threshold() -> usize {
    5
}

pub fn default_antiloop_window() -> f64 {
    10.0
}

pub fn default_antiloop_repeat_text() -> String {
    "…".to_string()
}

pub fn default_antiloop_silent_after() -> usize {
    3
}

// =============================================================================
// Logging Defaults
// =============================================================================

pub fn default_log_level() -> String {
    "info".to_string()
}
