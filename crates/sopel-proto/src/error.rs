//! Error types for the IRC protocol library.
//!
//! This module defines error types for protocol-level errors,
//! message parsing failures, mode parsing issues and ISUPPORT tokens.

use thiserror::Error;

/// Convenience type alias for Results using [`ProtocolError`].
pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;

/// Top-level protocol errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// I/O error during reading or writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Message exceeded maximum allowed length.
    #[error("message too long: {actual} bytes (limit: {limit})")]
    MessageTooLong {
        /// Actual message length.
        actual: usize,
        /// Maximum allowed length.
        limit: usize,
    },

    /// Failed to parse an IRC message.
    #[error("invalid message: {string}")]
    InvalidMessage {
        /// The invalid message string.
        string: String,
        /// The underlying parse error.
        #[source]
        cause: MessageParseError,
    },

    /// TLS configuration could not be built.
    #[error("tls error: {0}")]
    Tls(String),
}

/// Errors encountered when parsing IRC messages.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum MessageParseError {
    /// Message was empty.
    #[error("empty message")]
    EmptyMessage,

    /// Command was invalid or missing.
    #[error("invalid command")]
    InvalidCommand,

    /// Invalid message prefix.
    #[error("invalid prefix: {0}")]
    InvalidPrefix(String),

    /// Parsing error with position information.
    #[error("parsing failed at position {position}: {context}")]
    ParseContext {
        /// Character position where parsing failed.
        position: usize,
        /// Description of what was being parsed.
        context: String,
    },
}

/// Errors raised by a [`ModeParser`](crate::mode::ModeParser) lookup.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ModeParseError {
    /// The mode letter does not belong to any configured mode type.
    #[error("unknown type for mode {0:?}")]
    ModeTypeUnknown(char),

    /// The mode type exists but has no parameter rule configured.
    #[error("no parameter rule configured for mode type {0:?}")]
    ModeTypeImproperlyConfigured(char),
}

/// Errors raised while decoding an ISUPPORT token.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum IsupportError {
    /// The token key is empty or contains characters outside `[A-Z0-9]`.
    #[error("invalid ISUPPORT token: {0:?}")]
    InvalidToken(String),

    /// The value of a typed parameter could not be decoded.
    #[error("invalid value for ISUPPORT parameter {key}: {value:?}")]
    InvalidValue {
        /// Upper-cased parameter name.
        key: String,
        /// Raw value as received.
        value: String,
    },
}
