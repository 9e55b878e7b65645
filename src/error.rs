//! Unified error handling for sopel-ng.
//!
//! Backend failures, bot-level misuse, handler failures and capability
//! negotiation failures each get their own type.

use sopel_proto::ProtocolError;
use thiserror::Error;

// ============================================================================
// Backend Errors (transport)
// ============================================================================

/// Errors raised by an IRC backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend is not connected")]
    NotConnected,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("tls error: {0}")]
    Tls(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<ProtocolError> for BackendError {
    fn from(e: ProtocolError) -> Self {
        match e {
            ProtocolError::Io(e) => Self::Io(e),
            ProtocolError::Tls(msg) => Self::Tls(msg),
            other => Self::Protocol(other.to_string()),
        }
    }
}

// ============================================================================
// Bot Errors
// ============================================================================

/// Errors raised by the bot core.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("backend not initialized; is the bot running?")]
    BackendNotInitialized,

    #[error("capability conflict: {0}")]
    CapabilityConflict(String),

    #[error("cannot change capability {0} after the connection is registered")]
    CapabilityLocked(String),

    #[error("too many errors, can't continue")]
    TooManyErrors,

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("handler error: {0}")]
    Handler(String),
}

// ============================================================================
// Handler Errors (rule processing)
// ============================================================================

/// Errors that can occur while a rule handles a trigger.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("not enough arguments")]
    NeedMoreParams,

    #[error(transparent)]
    Bot(#[from] BotError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl HandlerError {
    /// Get a static error code string for log fields.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NeedMoreParams => "need_more_params",
            Self::Bot(_) => "bot_error",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl From<BackendError> for HandlerError {
    fn from(e: BackendError) -> Self {
        Self::Bot(BotError::Backend(e))
    }
}

/// Result type for rule handlers.
pub type HandlerResult = Result<(), HandlerError>;

// ============================================================================
// Capability Callback Errors
// ============================================================================

/// Failure reported by a plugin's capability callback.
///
/// A configuration error quits with `Configuration error.`; anything else
/// with `Error negotiating capabilities.`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapCallbackError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("{0}")]
    Other(String),
}

impl CapCallbackError {
    /// QUIT reason sent when negotiation is aborted.
    pub fn quit_reason(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "Configuration error.",
            Self::Other(_) => "Error negotiating capabilities.",
        }
    }
}
