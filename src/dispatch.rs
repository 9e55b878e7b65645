//! Rule registry and dispatch.
//!
//! A [`Rule`] pairs a [`Matcher`] with an async [`Handler`]. The
//! [`Registry`] keeps rules ordered by priority, then registration order,
//! and runs every rule that matches a [`Trigger`].

use async_trait::async_trait;
use regex::{Captures, Regex, RegexBuilder};
use sopel_proto::Identifier;
use std::sync::Arc;
use tracing::{Instrument, error};

use crate::bot::Bot;
use crate::error::{BotError, HandlerResult};
use crate::telemetry::spans;
use crate::trigger::Trigger;

/// Code run when a rule matches.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, bot: &mut Bot, trigger: &Trigger) -> HandlerResult;
}

/// How a rule decides it applies to a trigger's text.
#[derive(Debug, Clone)]
#[allow(dead_code)] // plugin API
pub enum Matcher {
    /// Every trigger of the rule's events.
    Any,
    /// Prefixed commands: group 1 is the command, group 2 the arguments.
    Commands(Vec<String>),
    /// Regex anchored at the start of the text.
    Rule(Regex),
    /// Regex anywhere in the text.
    Search(Regex),
    /// Regex; the handler runs once per non-overlapping match.
    Find(Regex),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
#[allow(dead_code)] // plugin API
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

/// A handler plus the conditions for running it.
pub struct Rule {
    label: String,
    events: Vec<String>,
    matcher: Matcher,
    ctcp: Vec<String>,
    allow_echo: bool,
    priority: Priority,
    doc: Option<String>,
    handler: Arc<dyn Handler>,
}

impl Rule {
    /// A rule on PRIVMSG lines that are not CTCP.
    pub fn new(label: impl Into<String>, matcher: Matcher, handler: impl Handler + 'static) -> Self {
        Self {
            label: label.into(),
            events: vec!["PRIVMSG".to_owned()],
            matcher,
            ctcp: Vec::new(),
            allow_echo: false,
            priority: Priority::default(),
            doc: None,
            handler: Arc::new(handler),
        }
    }

    /// Shorthand for a [`Matcher::Commands`] rule.
    pub fn command(names: &[&str], handler: impl Handler + 'static) -> Self {
        let label = names.first().copied().unwrap_or_default().to_owned();
        let names = names.iter().map(|name| (*name).to_owned()).collect();
        Self::new(label, Matcher::Commands(names), handler)
    }

    /// Events this rule listens to, replacing the default PRIVMSG.
    pub fn events(mut self, events: &[&str]) -> Self {
        self.events = events.iter().map(|e| e.to_ascii_uppercase()).collect();
        self
    }

    /// Only run for these CTCP commands.
    pub fn ctcp(mut self, commands: &[&str]) -> Self {
        self.ctcp = commands.iter().map(|c| c.to_ascii_uppercase()).collect();
        self
    }

    /// Also run for the bot's own messages.
    pub fn allow_echo(mut self) -> Self {
        self.allow_echo = true;
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn documentation(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    fn accepts(&self, trigger: &Trigger) -> bool {
        if !self.events.iter().any(|event| *event == trigger.event) {
            return false;
        }
        if trigger.is_echo && !self.allow_echo {
            return false;
        }
        match &trigger.ctcp {
            Some(ctcp) => self.ctcp.iter().any(|c| c == ctcp),
            None => self.ctcp.is_empty(),
        }
    }
}

/// Rule plus its compiled command pattern.
struct Entry {
    rule: Rule,
    commands: Option<Regex>,
}

impl Entry {
    /// Capture groups for each handler invocation, empty if nothing matched.
    fn matches(&self, text: &str) -> Vec<Vec<Option<String>>> {
        match (&self.rule.matcher, &self.commands) {
            (Matcher::Any, _) => vec![vec![Some(text.to_owned())]],
            (Matcher::Commands(_), Some(regex)) => regex.captures(text).map(groups).into_iter().collect(),
            (Matcher::Commands(_), None) => Vec::new(),
            (Matcher::Rule(regex), _) => regex
                .captures(text)
                .filter(|caps| caps.get(0).is_some_and(|m| m.start() == 0))
                .map(groups)
                .into_iter()
                .collect(),
            (Matcher::Search(regex), _) => regex.captures(text).map(groups).into_iter().collect(),
            (Matcher::Find(regex), _) => regex.captures_iter(text).map(groups).collect(),
        }
    }
}

fn groups(caps: Captures<'_>) -> Vec<Option<String>> {
    caps.iter()
        .map(|group| group.map(|m| m.as_str().to_owned()))
        .collect()
}

/// Registered rules.
pub struct Registry {
    prefix: String,
    entries: Vec<Entry>,
}

impl Registry {
    /// Create an empty registry; `prefix` is the command prefix regex.
    pub fn new(prefix: &str) -> Result<Self, regex::Error> {
        Regex::new(prefix)?;
        Ok(Self {
            prefix: prefix.to_owned(),
            entries: Vec::new(),
        })
    }

    /// Add a rule after the others of the same priority.
    pub fn register(&mut self, rule: Rule) -> Result<(), regex::Error> {
        let commands = match &rule.matcher {
            Matcher::Commands(names) => {
                let names: Vec<String> = names.iter().map(|name| regex::escape(name)).collect();
                let pattern = format!(r"^{}({})(?:\s+(.*))?$", self.prefix, names.join("|"));
                Some(RegexBuilder::new(&pattern).case_insensitive(true).build()?)
            }
            _ => None,
        };

        let index = self
            .entries
            .iter()
            .position(|entry| entry.rule.priority > rule.priority)
            .unwrap_or(self.entries.len());
        self.entries.insert(index, Entry { rule, commands });
        Ok(())
    }

    /// Labels of all rules, in dispatch order.
    #[allow(dead_code)] // plugin API
    pub fn labels(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.rule.label()).collect()
    }

    /// All command names, sorted.
    pub fn commands(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .entries
            .iter()
            .filter_map(|entry| match &entry.rule.matcher {
                Matcher::Commands(names) => Some(names.iter().map(String::as_str)),
                _ => None,
            })
            .flatten()
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    /// The rule answering to command `name`.
    pub fn find_command(&self, name: &str) -> Option<&Rule> {
        self.entries
            .iter()
            .map(|entry| &entry.rule)
            .find(|rule| match &rule.matcher {
                Matcher::Commands(names) => names.iter().any(|n| n.eq_ignore_ascii_case(name)),
                _ => false,
            })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run every matching rule.
    ///
    /// A failing handler is logged and counted against the bot's error
    /// budget; only an exhausted budget is returned as an error.
    pub async fn dispatch(&self, bot: &mut Bot, trigger: &Trigger) -> Result<(), BotError> {
        for entry in &self.entries {
            let rule = &entry.rule;
            if !rule.accepts(trigger) {
                continue;
            }

            for groups in entry.matches(&trigger.text) {
                let trigger = trigger.with_groups(groups);
                let span = spans::rule(
                    rule.label(),
                    &trigger.event,
                    trigger.sender.as_ref().map(Identifier::as_str),
                );
                if let Err(e) = rule.handler.handle(bot, &trigger).instrument(span).await {
                    error!(
                        rule = %rule.label(),
                        code = e.error_code(),
                        error = %e,
                        "Rule failed"
                    );
                    bot.on_error()?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerError;
    use sopel_proto::Message;

    struct Noop;

    #[async_trait]
    impl Handler for Noop {
        async fn handle(&self, _bot: &mut Bot, _trigger: &Trigger) -> HandlerResult {
            Ok(())
        }
    }

    struct Fails;

    #[async_trait]
    impl Handler for Fails {
        async fn handle(&self, _bot: &mut Bot, _trigger: &Trigger) -> HandlerResult {
            Err(HandlerError::Internal("nope".into()))
        }
    }

    fn trigger(raw: &str) -> Trigger {
        let message: Message = raw.parse().unwrap();
        Trigger::new(raw, message, &Identifier::new("Sopel"), |n| Identifier::new(n))
    }

    fn entry(registry: &Registry, label: &str) -> usize {
        registry.labels().iter().position(|l| *l == label).unwrap()
    }

    #[test]
    fn test_priority_order() {
        let mut registry = Registry::new(r"\.").unwrap();
        registry.register(Rule::new("low", Matcher::Any, Noop).priority(Priority::Low)).unwrap();
        registry.register(Rule::new("medium", Matcher::Any, Noop)).unwrap();
        registry.register(Rule::new("high", Matcher::Any, Noop).priority(Priority::High)).unwrap();
        registry.register(Rule::new("medium2", Matcher::Any, Noop)).unwrap();

        assert_eq!(registry.labels(), vec!["high", "medium", "medium2", "low"]);
    }

    #[test]
    fn test_command_matching() {
        let mut registry = Registry::new(r"[.!]").unwrap();
        registry.register(Rule::command(&["help", "commands"], Noop)).unwrap();
        let e = &registry.entries[entry(&registry, "help")];

        let found = e.matches(".help  me please");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0][1].as_deref(), Some("help"));
        assert_eq!(found[0][2].as_deref(), Some("me please"));

        let found = e.matches("!COMMANDS");
        assert_eq!(found[0][1].as_deref(), Some("COMMANDS"));
        assert_eq!(found[0][2], None);

        assert!(e.matches("help").is_empty());
        assert!(e.matches(".helpme").is_empty());
        assert_eq!(registry.commands(), vec!["commands", "help"]);
        assert!(registry.find_command("HELP").is_some());
        assert!(registry.find_command("nope").is_none());
    }

    #[test]
    fn test_regex_matchers() {
        let mut registry = Registry::new(r"\.").unwrap();
        let word = Regex::new(r"(\w+)bot").unwrap();
        registry.register(Rule::new("rule", Matcher::Rule(word.clone()), Noop)).unwrap();
        registry.register(Rule::new("search", Matcher::Search(word.clone()), Noop)).unwrap();
        registry.register(Rule::new("find", Matcher::Find(word), Noop)).unwrap();

        let text = "hi sopelbot and willowbot";
        let rule = &registry.entries[entry(&registry, "rule")];
        let search = &registry.entries[entry(&registry, "search")];
        let find = &registry.entries[entry(&registry, "find")];

        assert!(rule.matches(text).is_empty());
        assert_eq!(rule.matches("sopelbot!")[0][1].as_deref(), Some("sopel"));
        assert_eq!(search.matches(text)[0][1].as_deref(), Some("sopel"));
        let all: Vec<_> = find.matches(text).into_iter().map(|g| g[1].clone()).collect();
        assert_eq!(all, vec![Some("sopel".into()), Some("willow".into())]);
    }

    #[test]
    fn test_accepts_filters() {
        let plain = Rule::new("plain", Matcher::Any, Noop);
        let action = Rule::new("action", Matcher::Any, Noop).ctcp(&["action"]);
        let notices = Rule::new("notices", Matcher::Any, Noop).events(&["notice"]).allow_echo();

        let msg = trigger(":Foo!f@h PRIVMSG #sopel :hi");
        let act = trigger(":Foo!f@h PRIVMSG #sopel :\x01ACTION waves\x01");
        let echo = trigger(":Sopel!s@h NOTICE #sopel :hi");

        assert!(plain.accepts(&msg));
        assert!(!plain.accepts(&act));
        assert!(action.accepts(&act));
        assert!(!action.accepts(&msg));
        assert!(notices.accepts(&echo));
        assert!(!notices.accepts(&msg));
        assert!(!plain.accepts(&trigger(":Sopel!s@h PRIVMSG #sopel :hi")));
    }

    #[test]
    fn test_invalid_prefix() {
        assert!(Registry::new("(").is_err());
    }

    #[tokio::test]
    async fn test_failing_rule_counts_error() {
        use crate::backend::mock::MockBackend;
        use crate::config::CoreConfig;

        let mut registry = Registry::new(r"\.").unwrap();
        registry.register(Rule::command(&["boom"], Fails)).unwrap();
        let mut bot = Bot::new(CoreConfig::new("Sopel", "irc.example.net"), registry);
        bot.set_backend(Arc::new(MockBackend::new()));

        bot.on_message(":Foo!f@h PRIVMSG #sopel :.boom").await.unwrap();
        assert_eq!(bot.error_count(), 1);
    }
}
