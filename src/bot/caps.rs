//! Client capability negotiation (`CAP`).

use sopel_proto::Capabilities;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::{Bot, sasl};
use crate::error::{BotError, CapCallbackError};
use crate::trigger::Trigger;

/// Capabilities the bot asks for whenever the server offers them, in order.
pub const CORE_CAPABILITIES: &[&str] = &[
    "echo-message",
    "multi-prefix",
    "away-notify",
    "chghost",
    "cap-notify",
    "server-time",
    "userhost-in-names",
    "message-tags",
    "account-notify",
    "extended-join",
    "account-tag",
    "sasl",
];

const NEGOTIATION_ERROR: &str = "Error negotiating capabilities.";

/// Outcome of a capability callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapNegotiation {
    /// Nothing more to do for this request.
    Done,
    /// The callback keeps negotiating; `CAP END` waits until it resumes.
    Continue,
    /// Negotiation failed and the bot must quit.
    Error,
}

/// Called with the bot, the request's capabilities, and whether the server
/// acknowledged them.
pub type CapCallback =
    Arc<dyn Fn(&mut Bot, &[String], bool) -> Result<CapNegotiation, CapCallbackError> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CapReqPrefix {
    /// Bare name: request, tolerate refusal.
    Request,
    /// `=name`: refusal ends the connection.
    Require,
    /// `-name`: never request.
    Forbid,
}

#[derive(Debug, Clone)]
struct CapReqEntry {
    prefix: CapReqPrefix,
    plugin: String,
    arg: Option<String>,
}

struct PluginRequest {
    plugin: String,
    callback: Option<CapCallback>,
}

/// Requests registered by plugins plus the state of the current negotiation.
#[derive(Default)]
pub(super) struct CapRequests {
    cap_reqs: BTreeMap<String, Vec<CapReqEntry>>,
    /// Keyed by the sorted capability names, in registration order.
    requests: Vec<(Vec<String>, Vec<PluginRequest>)>,

    started: bool,
    pending: BTreeSet<Vec<String>>,
    continuing: BTreeSet<Vec<String>>,
    complete: bool,
}

impl CapRequests {
    pub fn reset_negotiation(&mut self) {
        self.started = false;
        self.pending.clear();
        self.continuing.clear();
        self.complete = false;
    }

    pub fn cap_req(
        &mut self,
        plugin: &str,
        capability: &str,
        arg: Option<&str>,
        registered: bool,
        capabilities: &Capabilities,
    ) -> Result<(), BotError> {
        let (prefix, name) = if let Some(name) = capability.strip_prefix('-') {
            (CapReqPrefix::Forbid, name)
        } else if let Some(name) = capability.strip_prefix('=') {
            (CapReqPrefix::Require, name)
        } else {
            (CapReqPrefix::Request, capability)
        };

        let entries = self.cap_reqs.entry(name.to_owned()).or_default();
        if entries.iter().any(|entry| entry.arg.as_deref() != arg) {
            return Err(BotError::CapabilityConflict(name.to_owned()));
        }

        match prefix {
            CapReqPrefix::Forbid => {
                if registered && capabilities.is_enabled(name) {
                    return Err(BotError::CapabilityLocked(name.to_owned()));
                }
                if entries.iter().any(|entry| entry.prefix != CapReqPrefix::Forbid) {
                    return Err(BotError::CapabilityConflict(name.to_owned()));
                }
            }
            CapReqPrefix::Request | CapReqPrefix::Require => {
                if registered && !capabilities.is_enabled(name) {
                    return Err(BotError::CapabilityLocked(name.to_owned()));
                }
                if prefix == CapReqPrefix::Require
                    && entries.iter().any(|entry| entry.prefix == CapReqPrefix::Forbid)
                {
                    return Err(BotError::CapabilityConflict(name.to_owned()));
                }
            }
        }

        debug!(plugin = %plugin, capability = %capability, "Capability requested");
        entries.push(CapReqEntry {
            prefix,
            plugin: plugin.to_owned(),
            arg: arg.map(str::to_owned),
        });
        Ok(())
    }

    pub fn register(&mut self, plugin: &str, capabilities: &[&str], callback: Option<CapCallback>) {
        let mut key: Vec<String> = capabilities.iter().map(|cap| (*cap).to_owned()).collect();
        key.sort();
        key.dedup();

        let request = PluginRequest {
            plugin: plugin.to_owned(),
            callback,
        };
        match self.requests.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, plugins)) => plugins.push(request),
            None => self.requests.push((key, vec![request])),
        }
    }

    fn is_forbidden(&self, name: &str) -> bool {
        self.cap_reqs
            .get(name)
            .is_some_and(|entries| entries.iter().any(|entry| entry.prefix == CapReqPrefix::Forbid))
    }

    fn is_required(&self, name: &str) -> bool {
        self.cap_reqs
            .get(name)
            .is_some_and(|entries| entries.iter().any(|entry| entry.prefix == CapReqPrefix::Require))
    }

    /// Decide what to request once the listing is complete.
    ///
    /// Fails when a required capability is not offered.
    fn plan(&mut self, capabilities: &Capabilities) -> Result<Vec<Vec<String>>, String> {
        let mut keys: Vec<Vec<String>> = CORE_CAPABILITIES
            .iter()
            .filter(|cap| capabilities.is_available(cap) && !self.is_forbidden(cap))
            .map(|cap| vec![(*cap).to_owned()])
            .collect();

        for (name, entries) in &self.cap_reqs {
            if entries.iter().all(|entry| entry.prefix == CapReqPrefix::Forbid) {
                continue;
            }
            let key = vec![name.clone()];
            if keys.contains(&key) {
                continue;
            }
            if !capabilities.is_available(name) {
                if self.is_required(name) {
                    return Err(name.clone());
                }
                let plugins: Vec<&str> = entries.iter().map(|e| e.plugin.as_str()).collect();
                debug!(capability = %name, plugins = ?plugins, "Requested capability not available");
                continue;
            }
            keys.push(key);
        }

        for (key, plugins) in &self.requests {
            if keys.contains(key) {
                continue;
            }
            let usable = key
                .iter()
                .all(|cap| capabilities.is_available(cap) && !self.is_forbidden(cap));
            if usable {
                keys.push(key.clone());
            } else {
                let plugins: Vec<&str> = plugins.iter().map(|p| p.plugin.as_str()).collect();
                debug!(capabilities = ?key, plugins = ?plugins, "Skipping capability request");
            }
        }

        self.pending = keys.iter().cloned().collect();
        Ok(keys)
    }

    fn callbacks(&self, key: &[String]) -> Vec<CapCallback> {
        self.requests
            .iter()
            .filter(|(existing, _)| existing == key)
            .flat_map(|(_, plugins)| plugins.iter().filter_map(|p| p.callback.clone()))
            .collect()
    }

    fn should_end(&self) -> bool {
        self.started && !self.complete && self.pending.is_empty() && self.continuing.is_empty()
    }
}

/// Handle a `CAP` line from the server.
pub(super) fn handle_cap(bot: &mut Bot, trigger: &Trigger) -> Result<(), BotError> {
    let subcommand = trigger.args.get(1).map(|s| s.to_ascii_uppercase());
    match subcommand.as_deref() {
        Some("LS") => {
            if !bot.capabilities.handle_ls(&trigger.message) {
                debug!("Waiting for the rest of the capability list");
                return Ok(());
            }
            if bot.cap_requests.started {
                return Ok(());
            }
            bot.cap_requests.started = true;

            let keys = match bot.cap_requests.plan(&bot.capabilities) {
                Ok(keys) => keys,
                Err(missing) => {
                    error!(capability = %missing, "Required capability not available");
                    return abort(bot, NEGOTIATION_ERROR);
                }
            };
            for key in &keys {
                bot.write(&["CAP", "REQ"], Some(&key.join(" ")))?;
            }
            end_if_done(bot)
        }
        Some("ACK") => {
            let names = bot.capabilities.handle_ack(&trigger.message);
            if !bot.cap_requests.pending.contains(&names) {
                debug!(capabilities = ?names, "Unsolicited CAP ACK");
                return Ok(());
            }
            info!(capabilities = ?names, "Capabilities acknowledged");
            resolve(bot, names, true)
        }
        Some("NAK") => {
            let names = bot.capabilities.handle_nak(&trigger.message);
            if !bot.cap_requests.pending.contains(&names) {
                debug!(capabilities = ?names, "Unsolicited CAP NAK");
                return Ok(());
            }
            warn!(capabilities = ?names, "Capabilities refused");
            if names.iter().any(|name| bot.cap_requests.is_required(name)) {
                return abort(bot, NEGOTIATION_ERROR);
            }
            resolve(bot, names, false)
        }
        Some("NEW") => {
            let names = bot.capabilities.handle_new(&trigger.message);
            info!(capabilities = ?names, "Capabilities now available");
            Ok(())
        }
        Some("DEL") => {
            let names = bot.capabilities.handle_del(&trigger.message);
            info!(capabilities = ?names, "Capabilities removed");
            Ok(())
        }
        Some("LIST") => Ok(()),
        other => {
            debug!(subcommand = ?other, "Unknown CAP subcommand");
            Ok(())
        }
    }
}

/// Run the callbacks of a request the server answered.
fn resolve(bot: &mut Bot, key: Vec<String>, acknowledged: bool) -> Result<(), BotError> {
    bot.cap_requests.pending.remove(&key);

    let mut results = Vec::new();
    if key == ["sasl"] {
        results.push(sasl::on_cap_sasl(bot, acknowledged));
    }
    for callback in bot.cap_requests.callbacks(&key) {
        results.push(callback(bot, &key, acknowledged));
    }

    for result in results {
        match result {
            Ok(CapNegotiation::Done) => {}
            Ok(CapNegotiation::Continue) => {
                bot.cap_requests.continuing.insert(key.clone());
            }
            Ok(CapNegotiation::Error) => return abort(bot, NEGOTIATION_ERROR),
            Err(e) => {
                error!(capabilities = ?key, error = %e, "Capability negotiation failed");
                return abort(bot, e.quit_reason());
            }
        }
    }

    end_if_done(bot)
}

/// A callback that answered [`CapNegotiation::Continue`] is finished.
pub(super) fn resume(bot: &mut Bot, key: &[&str]) -> Result<(), BotError> {
    let key: Vec<String> = key.iter().map(|cap| (*cap).to_owned()).collect();
    bot.cap_requests.continuing.remove(&key);
    end_if_done(bot)
}

fn end_if_done(bot: &mut Bot) -> Result<(), BotError> {
    if bot.cap_requests.should_end() {
        bot.cap_requests.complete = true;
        debug!("Capability negotiation complete");
        bot.write(&["CAP", "END"], None)?;
    }
    Ok(())
}

/// End negotiation and quit with `reason`.
pub(super) fn abort(bot: &mut Bot, reason: &str) -> Result<(), BotError> {
    if !bot.cap_requests.complete {
        bot.cap_requests.complete = true;
        bot.write(&["CAP", "END"], None)?;
    }
    bot.quit(Some(reason))
}
