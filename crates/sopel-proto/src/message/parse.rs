//! Message parsing implementation.
//!
//! This module implements `FromStr` for `Message` using the nom-based parser.

use std::str::FromStr;

use crate::error::{MessageParseError, ProtocolError};
use crate::prefix::Prefix;

use super::nom_parser::ParsedMessage;
use super::tags::unescape_tag_value;
use super::types::{Message, Tag};

/// Parse a raw tags string into a vector of `Tag` structs.
///
/// The input should be the tags portion without the leading `@`. An empty
/// value (`key=`) is treated the same as a missing one.
fn parse_tags_string(tags_str: &str) -> Vec<Tag> {
    tags_str
        .split(';')
        .filter(|s| !s.is_empty())
        .map(|tag| {
            let mut iter = tag.splitn(2, '=');
            let key = iter.next().unwrap_or("");
            let value = iter
                .next()
                .filter(|v| !v.is_empty())
                .map(unescape_tag_value);
            Tag(key.to_owned(), value)
        })
        .collect()
}

impl FromStr for Message {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Message, Self::Err> {
        let line = s.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Err(ProtocolError::InvalidMessage {
                string: s.to_owned(),
                cause: MessageParseError::EmptyMessage,
            });
        }

        let parsed = ParsedMessage::parse(line).map_err(|(position, kind)| {
            ProtocolError::InvalidMessage {
                string: s.to_owned(),
                cause: MessageParseError::ParseContext {
                    position,
                    context: format!("{:?}", kind),
                },
            }
        })?;

        Ok(Message {
            tags: parsed.tags.map(parse_tags_string),
            prefix: parsed.prefix.map(Prefix::new_from_str),
            command: parsed.command.to_ascii_uppercase(),
            params: parsed.params.iter().map(|p| (*p).to_owned()).collect(),
        })
    }
}
