//! Core tasks: registration, account auth, and channel/user tracking.
//!
//! Runs for every inbound line before any rule sees it.

use sopel_proto::isupport::{parse_parameter, response_tokens};
use sopel_proto::mode::parse_modestring;
use sopel_proto::{Identifier, ModeMessage};
use tracing::{debug, info, warn};

use super::{Bot, MyInfo, caps, sasl};
use crate::channels::{Channel, Privileges, User};
use crate::config::AuthMethod;
use crate::error::BotError;
use crate::trigger::Trigger;

/// `PREFIX` assumed when the server does not announce one.
const DEFAULT_PREFIX: &[(char, char)] = &[('q', '~'), ('a', '&'), ('o', '@'), ('h', '%'), ('v', '+')];

pub(super) async fn handle(bot: &mut Bot, trigger: &Trigger) -> Result<(), BotError> {
    track_account_tag(bot, trigger);

    match trigger.event.as_str() {
        "CAP" => caps::handle_cap(bot, trigger),
        "AUTHENTICATE" => sasl::on_authenticate(bot, trigger),
        "900" | "901" | "902" | "903" | "904" | "905" | "906" | "907" | "908" => {
            sasl::on_numeric(bot, trigger)
        }
        // RPL_WELCOME
        "001" => on_welcome(bot).await,
        // RPL_MYINFO
        "004" => {
            on_myinfo(bot, trigger);
            Ok(())
        }
        // RPL_ISUPPORT
        "005" => {
            on_isupport(bot, trigger);
            Ok(())
        }
        // ERR_NICKNAMEINUSE
        "433" => on_nick_in_use(bot),
        "NICK" => {
            on_nick(bot, trigger);
            Ok(())
        }
        "JOIN" => on_join(bot, trigger),
        "PART" => {
            if let (Some(nick), Some(channel)) = (&trigger.nick, trigger.args.first()) {
                let channel = bot.make_identifier(channel);
                leave_channel(bot, nick, &channel);
            }
            Ok(())
        }
        "KICK" => {
            if let [channel, target, ..] = trigger.args.as_slice() {
                let channel = bot.make_identifier(channel);
                let target = bot.make_identifier(target);
                info!(channel = %channel, target = %target, reason = %trigger.text, "User kicked");
                leave_channel(bot, &target, &channel);
            }
            Ok(())
        }
        "QUIT" => {
            if let Some(nick) = &trigger.nick {
                on_quit(bot, nick);
            }
            Ok(())
        }
        // RPL_NAMREPLY
        "353" => {
            on_names(bot, trigger);
            Ok(())
        }
        "MODE" => {
            on_mode(bot, &trigger.args);
            Ok(())
        }
        // RPL_CHANNELMODEIS
        "324" => {
            if let Some((_, args)) = trigger.args.split_first() {
                on_mode(bot, args);
            }
            Ok(())
        }
        "TOPIC" | "332" => {
            on_topic(bot, trigger);
            Ok(())
        }
        "CHGHOST" => {
            on_chghost(bot, trigger);
            Ok(())
        }
        "ACCOUNT" => {
            if let (Some(nick), Some(account)) = (&trigger.nick, trigger.args.first()) {
                let account = (account != "*").then(|| account.clone());
                if let Some(user) = bot.users.get_mut(nick) {
                    user.account = account;
                }
            }
            Ok(())
        }
        "AWAY" => {
            if let Some(user) = trigger.nick.as_ref().and_then(|nick| bot.users.get_mut(nick)) {
                user.away = !trigger.args.is_empty();
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn track_account_tag(bot: &mut Bot, trigger: &Trigger) {
    let (Some(nick), Some(account)) = (&trigger.nick, &trigger.account) else {
        return;
    };
    if let Some(user) = bot.users.get_mut(nick) {
        user.account = Some(account.clone());
    }
}

// ============================================================================
// Registration
// ============================================================================

async fn on_welcome(bot: &mut Bot) -> Result<(), BotError> {
    bot.connection_registered = true;
    info!(nick = %bot.nick, "Connection registered");

    let modes = bot.settings.modes.trim();
    if !modes.is_empty() {
        let modes = if modes.starts_with(['+', '-']) {
            modes.to_owned()
        } else {
            format!("+{}", modes)
        };
        let nick = bot.nick.as_str().to_owned();
        bot.write(&["MODE", nick.as_str(), modes.as_str()], None)?;
    }

    identify(bot).await?;

    let channels = bot.settings.channels.clone();
    if channels.is_empty() {
        info!("No initial channels to join");
    }
    for channel in &channels {
        bot.join(channel, None)?;
    }
    Ok(())
}

/// Log in to services with the configured account method.
async fn identify(bot: &mut Bot) -> Result<(), BotError> {
    let core = &bot.settings;
    let Some(method) = core.auth_method else {
        return Ok(());
    };
    if matches!(method, AuthMethod::Sasl | AuthMethod::Server) {
        return Ok(());
    }
    let Some(password) = core.auth_password.clone() else {
        warn!(?method, "Account auth configured without a password");
        return Ok(());
    };
    let account = core.auth_username.clone().unwrap_or_else(|| core.nick.clone());
    let target = core.auth_target.clone();
    debug!(?method, account = %account, "Identifying to services");

    match method {
        AuthMethod::Nickserv => {
            let target = target.unwrap_or_else(|| "NickServ".into());
            bot.say(&format!("IDENTIFY {}", password), &target).await
        }
        AuthMethod::Authserv => bot.write(&["AUTHSERV", "auth", account.as_str(), password.as_str()], None),
        AuthMethod::Q => bot.write(&["AUTH", account.as_str(), password.as_str()], None),
        AuthMethod::Userserv => {
            let target = target.unwrap_or_else(|| "UserServ".into());
            bot.say(&format!("LOGIN {} {}", account, password), &target).await
        }
        AuthMethod::Sasl | AuthMethod::Server => Ok(()),
    }
}

fn on_myinfo(bot: &mut Bot, trigger: &Trigger) {
    match trigger.args.as_slice() {
        [client, servername, version, ..] => {
            info!(server = %servername, version = %version, "Server info");
            bot.myinfo = Some(MyInfo {
                client: client.clone(),
                servername: servername.clone(),
                version: version.clone(),
            });
        }
        _ => warn!(line = %trigger.raw, "Malformed RPL_MYINFO"),
    }
}

fn on_isupport(bot: &mut Bot, trigger: &Trigger) {
    let parsed: Vec<_> = response_tokens(&trigger.args)
        .iter()
        .filter_map(|token| match parse_parameter(token) {
            Ok(param) => Some(param),
            Err(e) => {
                warn!(token = %token, error = %e, "Ignoring invalid ISUPPORT token");
                None
            }
        })
        .collect();
    debug!(count = parsed.len(), "ISUPPORT parameters received");

    bot.isupport = bot.isupport.apply_parsed(parsed);
    bot.rebuild_nick();
    bot.modeparser.update_from_isupport(&bot.isupport);
}

fn on_nick_in_use(bot: &mut Bot) -> Result<(), BotError> {
    if bot.connection_registered {
        debug!("Nick change refused: already in use");
        return Ok(());
    }
    let retry = format!("{}_", bot.nick);
    warn!(nick = %bot.nick, retry = %retry, "Nickname already in use");
    bot.change_current_nick(&retry)
}

// ============================================================================
// Users & channels
// ============================================================================

fn on_nick(bot: &mut Bot, trigger: &Trigger) {
    let (Some(old), Some(new)) = (&trigger.nick, trigger.args.first()) else {
        return;
    };
    let new = bot.make_identifier(new);

    if *old == bot.nick {
        info!(old = %old, new = %new, "Own nick changed");
        bot.nick = new.clone();
        if let Some(hostmask) = bot.hostmask.take() {
            let rest = hostmask.split_once('!').map_or("", |(_, rest)| rest);
            bot.hostmask = Some(format!("{}!{}", new, rest));
        }
    }

    if let Some(mut user) = bot.users.remove(old) {
        user.nick = new.clone();
        for channel in &user.channels {
            if let Some(channel) = bot.channels.get_mut(channel) {
                channel.rename_user(old, new.clone());
            }
        }
        bot.users.insert(new, user);
    }
}

fn on_join(bot: &mut Bot, trigger: &Trigger) -> Result<(), BotError> {
    let (Some(nick), Some(channel)) = (&trigger.nick, trigger.args.first()) else {
        return Ok(());
    };
    let channel = bot.make_identifier(channel);

    if *nick == bot.nick {
        info!(channel = %channel, "Joined channel");
        if trigger.hostmask.is_some() {
            bot.hostmask = trigger.hostmask.clone();
        }
        bot.channels.insert(channel.clone(), Channel::new(channel.clone()));
        bot.write(&["MODE", channel.as_str()], None)?;
    }

    let Some(state) = bot.channels.get_mut(&channel) else {
        debug!(channel = %channel, nick = %nick, "JOIN for a channel we are not in");
        return Ok(());
    };
    state.add_user(nick.clone(), Privileges::NONE);

    let extended = bot.capabilities.is_enabled("extended-join");
    let user = bot
        .users
        .entry(nick.clone())
        .or_insert_with(|| User::new(nick.clone()));
    user.user = trigger.user.clone();
    user.host = trigger.host.clone();
    user.channels.insert(channel);
    if extended {
        if let Some(account) = trigger.args.get(1) {
            user.account = (account != "*").then(|| account.clone());
        }
        if let Some(realname) = trigger.args.get(2) {
            user.realname = Some(realname.clone());
        }
    }
    Ok(())
}

/// Remove `nick` from `channel`, or forget the channel when `nick` is us.
fn leave_channel(bot: &mut Bot, nick: &Identifier, channel: &Identifier) {
    if *nick == bot.nick {
        info!(channel = %channel, "Left channel");
        bot.channels.remove(channel);
        for user in bot.users.values_mut() {
            user.channels.remove(channel);
        }
        bot.users.retain(|_, user| !user.channels.is_empty());
        return;
    }

    if let Some(state) = bot.channels.get_mut(channel) {
        state.remove_user(nick);
    }
    if let Some(user) = bot.users.get_mut(nick) {
        user.channels.remove(channel);
        if user.channels.is_empty() {
            bot.users.remove(nick);
        }
    }
}

fn on_quit(bot: &mut Bot, nick: &Identifier) {
    let Some(user) = bot.users.remove(nick) else {
        return;
    };
    for channel in &user.channels {
        if let Some(state) = bot.channels.get_mut(channel) {
            state.remove_user(nick);
        }
    }
}

/// `353 me <symbol> <channel> :[prefixes]nick[!user@host] ...`
fn on_names(bot: &mut Bot, trigger: &Trigger) {
    let Some(channel) = trigger.args.get(2) else {
        return;
    };
    let channel = bot.make_identifier(channel);
    if !bot.channels.contains_key(&channel) {
        debug!(channel = %channel, "NAMES for a channel we are not in");
        return;
    }
    let prefix: Vec<(char, char)> = bot
        .isupport
        .prefix()
        .unwrap_or(DEFAULT_PREFIX)
        .to_vec();

    for entry in trigger.text.split_whitespace() {
        let mut privileges = Privileges::NONE;
        let mut rest = entry;
        while let Some(first) = rest.chars().next() {
            let Some((mode, _)) = prefix.iter().find(|(_, symbol)| *symbol == first) else {
                break;
            };
            if let Some(privilege) = Privileges::from_mode(*mode) {
                privileges |= privilege;
            }
            rest = &rest[first.len_utf8()..];
        }

        let (name, user_host) = match rest.split_once('!') {
            Some((name, user_host)) => (name, user_host.split_once('@')),
            None => (rest, None),
        };
        if name.is_empty() {
            continue;
        }
        let nick = bot.make_identifier(name);

        if let Some(state) = bot.channels.get_mut(&channel) {
            state.add_user(nick.clone(), privileges);
        }
        let user = bot
            .users
            .entry(nick.clone())
            .or_insert_with(|| User::new(nick));
        user.channels.insert(channel.clone());
        if let Some((ident, host)) = user_host {
            user.user = Some(ident.to_owned());
            user.host = Some(host.to_owned());
        }
    }
}

/// `MODE <target> <modestring> [params...]`
fn on_mode(bot: &mut Bot, args: &[String]) {
    let [target, modestring, params @ ..] = args else {
        return;
    };
    let target = bot.make_identifier(target);

    if target.is_nick() {
        if target != bot.nick {
            return;
        }
        for (mode, added) in parse_modestring(modestring) {
            if added {
                bot.user_modes.insert(mode);
            } else {
                bot.user_modes.remove(&mode);
            }
        }
        debug!(modes = ?bot.user_modes, "User modes updated");
        return;
    }

    let parsed: ModeMessage = bot.modeparser.parse(modestring, params);
    if !parsed.ignored_modes.is_empty() {
        warn!(channel = %target, modes = ?parsed.ignored_modes, "Unknown or incomplete channel modes");
    }

    let casemapping = bot.isupport.casemapping();
    let chantypes = bot.isupport.chantypes().to_owned();
    let Some(channel) = bot.channels.get_mut(&target) else {
        debug!(channel = %target, "MODE for a channel we are not in");
        return;
    };
    let skipped = channel.apply_modes(&parsed, |name| {
        Identifier::with_rules(name, casemapping, chantypes.as_str())
    });
    if !skipped.is_empty() {
        warn!(channel = %target, modes = ?skipped, "Channel modes not tracked");
    }
}

/// `TOPIC <channel> :topic` or `332 me <channel> :topic`.
fn on_topic(bot: &mut Bot, trigger: &Trigger) {
    let channel = if trigger.event == "TOPIC" {
        trigger.args.first()
    } else {
        trigger.args.get(1)
    };
    let Some(channel) = channel else {
        return;
    };
    let channel = bot.make_identifier(channel);
    if let Some(state) = bot.channels.get_mut(&channel) {
        state.topic = trigger.text.clone();
    }
}

/// `CHGHOST <user> <host>`
fn on_chghost(bot: &mut Bot, trigger: &Trigger) {
    let (Some(nick), [ident, host, ..]) = (&trigger.nick, trigger.args.as_slice()) else {
        warn!(line = %trigger.raw, "Malformed CHGHOST");
        return;
    };
    if *nick == bot.nick {
        bot.hostmask = Some(format!("{}!{}@{}", nick, ident, host));
    }
    if let Some(user) = bot.users.get_mut(nick) {
        user.user = Some(ident.clone());
        user.host = Some(host.clone());
    }
}
