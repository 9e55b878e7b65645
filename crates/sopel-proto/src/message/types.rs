use chrono::{DateTime, Utc};

use crate::prefix::Prefix;

/// An owned IRC message.
///
/// Contains the complete parsed representation of an IRC line: optional
/// IRCv3 tags, optional source prefix, the command verb (upper-cased, or a
/// three-digit numeric) and its parameters. The last parameter holds the
/// trailing text when the line had one.
///
/// # Example
///
/// ```
/// use sopel_proto::Message;
///
/// let msg: Message = ":nick!user@host PRIVMSG #channel :Hello!".parse().unwrap();
/// assert_eq!(msg.command, "PRIVMSG");
/// assert_eq!(msg.params, vec!["#channel", "Hello!"]);
/// ```
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Message {
    /// IRCv3 message tags (e.g., `time`, `account`).
    pub tags: Option<Vec<Tag>>,
    /// Message prefix/source (e.g., `nick!user@host`).
    pub prefix: Option<Prefix>,
    /// Command verb or numeric.
    pub command: String,
    /// Command parameters, trailing included.
    pub params: Vec<String>,
}

impl Message {
    /// Build a message from its parts.
    pub fn new<C, I, S>(prefix: Option<Prefix>, command: C, params: I) -> Self
    where
        C: Into<String>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Message {
            tags: None,
            prefix,
            command: command.into().to_ascii_uppercase(),
            params: params.into_iter().map(Into::into).collect(),
        }
    }

    /// Get the nickname from the message prefix, if present.
    pub fn source_nickname(&self) -> Option<&str> {
        self.prefix.as_ref().and_then(|p| p.nick())
    }

    /// Get the value of an IRCv3 tag by key.
    ///
    /// Returns `None` both when the tag is absent and when it has no value;
    /// use [`Message::has_tag`] to tell the two apart.
    pub fn tag_value(&self, key: &str) -> Option<&str> {
        self.tags
            .as_ref()?
            .iter()
            .find(|Tag(k, _)| k == key)
            .and_then(|Tag(_, v)| v.as_deref())
    }

    /// Whether a tag with this key is attached, with or without value.
    pub fn has_tag(&self, key: &str) -> bool {
        self.tags
            .as_ref()
            .is_some_and(|tags| tags.iter().any(|Tag(k, _)| k == key))
    }

    /// Remove a tag, returning its value if it had one.
    pub fn remove_tag(&mut self, key: &str) -> Option<Option<String>> {
        let tags = self.tags.as_mut()?;
        let index = tags.iter().position(|Tag(k, _)| k == key)?;
        let Tag(_, value) = tags.remove(index);
        if tags.is_empty() {
            self.tags = None;
        }
        Some(value)
    }

    /// Get a parameter by position.
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }

    /// Get the last parameter, which is the trailing text when present.
    pub fn trailing(&self) -> Option<&str> {
        self.params.last().map(String::as_str)
    }

    /// Whether the command is a three-digit numeric reply.
    pub fn is_numeric(&self) -> bool {
        self.command.len() == 3 && self.command.bytes().all(|b| b.is_ascii_digit())
    }

    /// Attach a tag to this message.
    #[must_use]
    pub fn with_tag<K, V>(mut self, key: K, value: Option<V>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let tag = Tag::new(key, value.map(Into::into));
        self.tags.get_or_insert_with(Vec::new).push(tag);
        self
    }

    /// Timestamp from the `time` tag (`server-time`), if present and valid.
    pub fn server_time(&self) -> Option<DateTime<Utc>> {
        let raw = self.tag_value("time")?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|time| time.with_timezone(&Utc))
    }
}

/// An IRCv3 message tag.
///
/// Tags are key-value pairs attached to messages; the value is optional.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Tag(
    /// Tag key (e.g., `time`, `batch`).
    pub String,
    /// Optional unescaped tag value.
    pub Option<String>,
);

impl Tag {
    /// Create a new tag with a key and optional value.
    pub fn new(key: impl Into<String>, value: Option<String>) -> Self {
        Tag(key.into(), value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_server_time() {
        let msg = Message::new(None, "PING", ["x"]).with_tag("time", Some("2011-10-19T16:40:51.620Z"));
        assert_eq!(
            msg.server_time().map(|t| t.timestamp_millis()),
            Some(Utc.with_ymd_and_hms(2011, 10, 19, 16, 40, 51).unwrap().timestamp_millis() + 620)
        );

        let bad = Message::new(None, "PING", ["x"]).with_tag("time", Some("yesterday"));
        assert_eq!(bad.server_time(), None);
        assert_eq!(Message::new(None, "PING", ["x"]).server_time(), None);
    }

    #[test]
    fn test_new_uppercases_command() {
        let msg = Message::new(None, "privmsg", ["#chan", "hi"]);
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.arg(0), Some("#chan"));
        assert_eq!(msg.trailing(), Some("hi"));
        assert!(!msg.is_numeric());
    }

    #[test]
    fn test_remove_tag() {
        let mut msg = Message::new(None, "PING", ["x"])
            .with_tag("account", Some("alice"))
            .with_tag("draft/flag", None::<String>);

        assert!(msg.has_tag("draft/flag"));
        assert_eq!(msg.tag_value("draft/flag"), None);
        assert_eq!(msg.remove_tag("account"), Some(Some("alice".to_string())));
        assert_eq!(msg.remove_tag("account"), None);
        assert_eq!(msg.remove_tag("draft/flag"), Some(None));
        assert!(msg.tags.is_none());
    }

    #[test]
    fn test_source_nickname() {
        let msg: Message = ":irc.example.com 001 Bot :Welcome".parse().unwrap();
        assert_eq!(msg.source_nickname(), None);
        assert!(msg.is_numeric());

        let msg: Message = ":Alice!a@host QUIT :bye".parse().unwrap();
        assert_eq!(msg.source_nickname(), Some("Alice"));
    }
}
