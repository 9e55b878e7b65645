//! # sopel-proto
//!
//! Client-side IRC protocol primitives for the sopel bot.
//!
//! ## Features
//!
//! - IRC message parsing with tags, prefixes, commands and parameters
//! - Case mapping aware nick and channel identifiers
//! - Channel MODE decoding driven by the server's ISUPPORT
//! - ISUPPORT (`RPL_ISUPPORT`) parsing into typed values
//! - IRCv3 capability bookkeeping and SASL payload helpers
//! - Optional Tokio integration: line codec and TCP/TLS transport

#![deny(clippy::all)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! ## Quick Start
//!
//! ```rust
//! use sopel_proto::{Message, mode::ModeParser};
//!
//! let message: Message = ":ChanServ!cs@services MODE #sopel +ov Alice Bob"
//!     .parse()
//!     .expect("Valid IRC message");
//! let parser = ModeParser::default();
//! let modes = parser.parse(&message.params[1], &message.params[2..]);
//!
//! assert_eq!(modes.privileges.len(), 2);
//! assert_eq!(modes.privileges[0].target, "Alice");
//! ```

pub mod casemap;
pub mod caps;
pub mod error;
pub mod identifier;
pub mod isupport;
pub mod line;
pub mod message;
pub mod mode;
pub mod prefix;
pub mod sasl;
#[cfg(feature = "tokio")]
pub mod transport;
pub mod util;

pub use self::casemap::{irc_eq, irc_to_lower, CaseMapping};
pub use self::caps::{Capabilities, CapabilityInfo};
pub use self::error::{
    IsupportError, MessageParseError, ModeParseError, ProtocolError, Result,
};
pub use self::identifier::Identifier;
pub use self::isupport::{ISupport, IsupportValue};
pub use self::line::decode_line;
#[cfg(feature = "tokio")]
pub use self::line::LineCodec;
pub use self::message::{Message, Tag};
pub use self::mode::{ModeMessage, ModeParser};
pub use self::prefix::Prefix;
pub use self::sasl::SaslMechanism;
#[cfg(feature = "tokio")]
pub use self::transport::{ConnectOptions, LineSink, LineStream, Transport};
pub use self::util::{get_sendable_message, prepare_command, safe};
