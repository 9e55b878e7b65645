//! Rules every bot carries: help and the usual CTCP replies.

use async_trait::async_trait;
use chrono::Utc;

use crate::bot::Bot;
use crate::config::CoreConfig;
use crate::dispatch::{Handler, Matcher, Registry, Rule};
use crate::error::{HandlerError, HandlerResult};
use crate::trigger::Trigger;

const VERSION: &str = concat!("Sopel ", env!("CARGO_PKG_VERSION"));

/// Registry with the built-in rules, using the configured command prefix.
pub fn registry(core: &CoreConfig) -> Result<Registry, regex::Error> {
    let mut registry = Registry::new(&core.prefix)?;

    registry.register(
        Rule::command(
            &["help", "commands"],
            Help {
                help_prefix: core.help_prefix.clone(),
                owner: core.owner.clone(),
            },
        )
        .doc("Show what a command does, or list all commands."),
    )?;
    registry.register(Rule::new("ctcp_version", Matcher::Any, CtcpVersion).ctcp(&["VERSION"]))?;
    registry.register(Rule::new("ctcp_ping", Matcher::Any, CtcpPing).ctcp(&["PING"]))?;
    registry.register(Rule::new("ctcp_time", Matcher::Any, CtcpTime).ctcp(&["TIME"]))?;

    Ok(registry)
}

fn source_nick(trigger: &Trigger) -> Result<String, HandlerError> {
    trigger
        .nick
        .as_ref()
        .map(|nick| nick.as_str().to_owned())
        .ok_or(HandlerError::NeedMoreParams)
}

struct Help {
    help_prefix: String,
    owner: Option<String>,
}

#[async_trait]
impl Handler for Help {
    async fn handle(&self, bot: &mut Bot, trigger: &Trigger) -> HandlerResult {
        let nick = source_nick(trigger)?;
        let dest = trigger
            .sender
            .as_ref()
            .map(|sender| sender.as_str().to_owned())
            .unwrap_or_else(|| nick.clone());

        if let Some(name) = trigger.group(2).map(str::trim).filter(|name| !name.is_empty()) {
            let doc = bot
                .registry()
                .find_command(name)
                .map(|rule| rule.documentation().unwrap_or("No documentation.").to_owned());
            let text = match doc {
                Some(doc) => format!("{}{}: {}", self.help_prefix, name.to_ascii_lowercase(), doc),
                None => format!("No command named {}{}.", self.help_prefix, name),
            };
            bot.reply(&text, &dest, &nick, false).await?;
            return Ok(());
        }

        let commands = bot.registry().commands().join(", ");
        let mut text = format!(
            "Commands I recognise: {}. For help, do '{}help <command>'.",
            commands, self.help_prefix
        );
        if let Some(owner) = &self.owner {
            text.push_str(&format!(" My owner is {}.", owner));
        }
        bot.reply(&text, &dest, &nick, false).await?;
        Ok(())
    }
}

struct CtcpVersion;

#[async_trait]
impl Handler for CtcpVersion {
    async fn handle(&self, bot: &mut Bot, trigger: &Trigger) -> HandlerResult {
        let nick = source_nick(trigger)?;
        bot.notice(&format!("\x01VERSION {}\x01", VERSION), &nick)?;
        Ok(())
    }
}

struct CtcpPing;

#[async_trait]
impl Handler for CtcpPing {
    async fn handle(&self, bot: &mut Bot, trigger: &Trigger) -> HandlerResult {
        let nick = source_nick(trigger)?;
        bot.notice(&format!("\x01PING {}\x01", trigger.text), &nick)?;
        Ok(())
    }
}

struct CtcpTime;

#[async_trait]
impl Handler for CtcpTime {
    async fn handle(&self, bot: &mut Bot, trigger: &Trigger) -> HandlerResult {
        let nick = source_nick(trigger)?;
        let now = Utc::now().to_rfc2822();
        bot.notice(&format!("\x01TIME {}\x01", now), &nick)?;
        Ok(())
    }
}
