//! IRC message types and parsing.

mod nom_parser;
mod parse;
mod serialize;
/// IRCv3 tag utilities.
pub mod tags;
mod types;

pub use self::types::{Message, Tag};
