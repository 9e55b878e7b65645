//! Incoming messages as seen by rules.

use chrono::{DateTime, Utc};
use sopel_proto::{Identifier, Message, Prefix};

const CTCP_DELIMITER: char = '\x01';

/// A parsed line plus what rules usually want to know about it.
#[derive(Debug, Clone)]
pub struct Trigger {
    /// The line as received, without CR-LF.
    pub raw: String,
    pub message: Message,
    /// Command or numeric, upper-case.
    pub event: String,
    pub args: Vec<String>,
    /// Source nick; `None` for server messages.
    pub nick: Option<Identifier>,
    pub user: Option<String>,
    pub host: Option<String>,
    /// Full `nick!user@host` of the source.
    pub hostmask: Option<String>,
    /// Channel the line was sent to, or the sender's nick for private lines.
    pub sender: Option<Identifier>,
    /// Last argument, without the CTCP wrapper.
    pub text: String,
    /// CTCP command, upper-case (`ACTION`, `VERSION`, ...).
    pub ctcp: Option<String>,
    /// Sent privately rather than to a channel.
    #[allow(dead_code)] // read by plugins
    pub is_privmsg: bool,
    /// A PRIVMSG or NOTICE sent by the bot itself.
    pub is_echo: bool,
    /// Services account from the `account` tag.
    pub account: Option<String>,
    /// `server-time` when tagged, arrival time otherwise.
    #[allow(dead_code)] // read by plugins
    pub time: DateTime<Utc>,
    groups: Vec<Option<String>>,
}

impl Trigger {
    /// Derive a trigger from `message`, using `make_identifier` for names.
    pub fn new(
        raw: &str,
        message: Message,
        own_nick: &Identifier,
        make_identifier: impl Fn(&str) -> Identifier,
    ) -> Self {
        let (nick, user, host, hostmask) = match &message.prefix {
            Some(prefix @ Prefix::Nickname(nick, user, host)) => (
                Some(make_identifier(nick)),
                (!user.is_empty()).then(|| user.clone()),
                (!host.is_empty()).then(|| host.clone()),
                Some(prefix.to_string()),
            ),
            _ => (None, None, None, None),
        };

        let sender = match message.params.first() {
            Some(target) if own_nick.matches(target) => nick.clone(),
            Some(target) => Some(make_identifier(target)),
            None => None,
        };
        let is_privmsg = sender.as_ref().is_some_and(Identifier::is_nick);

        let event = message.command.clone();
        let is_text_event = event == "PRIVMSG" || event == "NOTICE";
        let mut text = message.trailing().unwrap_or_default().to_owned();
        let mut ctcp = None;
        if is_text_event && let Some((command, rest)) = parse_ctcp(&text) {
            ctcp = Some(command);
            text = rest;
        }

        let is_echo = is_text_event && nick.as_ref().is_some_and(|nick| nick == own_nick);
        let account = message.tag_value("account").map(str::to_owned);
        let time = message.server_time().unwrap_or_else(Utc::now);

        Self {
            raw: raw.trim_end_matches(['\r', '\n']).to_owned(),
            args: message.params.clone(),
            event,
            message,
            nick,
            user,
            host,
            hostmask,
            sender,
            text,
            ctcp,
            is_privmsg,
            is_echo,
            account,
            time,
            groups: Vec::new(),
        }
    }

    /// Copy of this trigger carrying the groups of a rule match.
    pub(crate) fn with_groups(&self, groups: Vec<Option<String>>) -> Self {
        Self {
            groups,
            ..self.clone()
        }
    }

    /// Capture group `index` of the rule that matched; 0 is the whole match.
    pub fn group(&self, index: usize) -> Option<&str> {
        self.groups.get(index).and_then(Option::as_deref)
    }

    /// Whether this is a `/me` line.
    #[allow(dead_code)] // plugin API
    pub fn is_action(&self) -> bool {
        self.ctcp.as_deref() == Some("ACTION")
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.message.tag_value(key)
    }
}

/// Split `\x01COMMAND args\x01` into `("COMMAND", "args")`.
///
/// The closing delimiter is optional, as some clients omit it.
fn parse_ctcp(text: &str) -> Option<(String, String)> {
    let inner = text.strip_prefix(CTCP_DELIMITER)?;
    let inner = inner.strip_suffix(CTCP_DELIMITER).unwrap_or(inner);
    let (command, rest) = inner.split_once(' ').unwrap_or((inner, ""));
    if command.is_empty() {
        return None;
    }
    Some((command.to_ascii_uppercase(), rest.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trigger(raw: &str) -> Trigger {
        let message: Message = raw.parse().unwrap();
        Trigger::new(raw, message, &Identifier::new("Sopel"), |n| Identifier::new(n))
    }

    #[test]
    fn test_channel_message() {
        let t = trigger(":Foo!foo@example.com PRIVMSG #Sopel :Hello, world");
        assert_eq!(t.event, "PRIVMSG");
        assert_eq!(t.nick.as_ref().unwrap().as_str(), "Foo");
        assert_eq!(t.user.as_deref(), Some("foo"));
        assert_eq!(t.host.as_deref(), Some("example.com"));
        assert_eq!(t.hostmask.as_deref(), Some("Foo!foo@example.com"));
        assert_eq!(t.sender.as_ref().unwrap().as_str(), "#Sopel");
        assert_eq!(t.text, "Hello, world");
        assert!(!t.is_privmsg);
        assert!(!t.is_echo);
        assert_eq!(t.ctcp, None);
    }

    #[test]
    fn test_private_message_sender_is_nick() {
        let t = trigger(":Foo!foo@example.com PRIVMSG sopel :psst");
        assert_eq!(t.sender.as_ref().unwrap().as_str(), "Foo");
        assert!(t.is_privmsg);
    }

    #[test]
    fn test_action() {
        let t = trigger(":Foo!foo@example.com PRIVMSG #sopel :\x01ACTION waves\x01");
        assert!(t.is_action());
        assert_eq!(t.text, "waves");

        let t = trigger(":Foo!foo@example.com PRIVMSG Sopel :\x01version\x01");
        assert_eq!(t.ctcp.as_deref(), Some("VERSION"));
        assert_eq!(t.text, "");
    }

    #[test]
    fn test_echo_and_tags() {
        let t = trigger(
            "@account=Sopel;time=2024-01-02T03:04:05.000Z :Sopel!sopel@bot PRIVMSG #sopel :hi",
        );
        assert!(t.is_echo);
        assert_eq!(t.account.as_deref(), Some("Sopel"));
        assert_eq!(t.time.to_rfc3339(), "2024-01-02T03:04:05+00:00");
        assert_eq!(t.tag("account"), Some("Sopel"));
    }

    #[test]
    fn test_server_numeric() {
        let t = trigger(":irc.example.net 001 Sopel :Welcome");
        assert!(t.nick.is_none());
        assert!(t.sender.is_none());
        assert_eq!(t.text, "Welcome");
    }

    #[test]
    fn test_groups() {
        let t = trigger(":Foo!foo@example.com PRIVMSG #sopel :.help me");
        assert_eq!(t.group(0), None);
        let t = t.with_groups(vec![Some(".help me".into()), Some("help".into()), None]);
        assert_eq!(t.group(1), Some("help"));
        assert_eq!(t.group(2), None);
    }
}
