//! Client-side IRCv3 capability bookkeeping.
//!
//! Tracks what the server offers (`CAP LS` / `CAP NEW` / `CAP DEL`) and what
//! it agreed to enable (`CAP ACK`). Deciding what to request is left to the
//! caller.

use std::collections::{BTreeMap, BTreeSet};

use crate::message::Message;

/// Snapshot of one capability's state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapabilityInfo {
    /// Capability name.
    pub name: String,
    /// Parameters advertised with it (`sasl=PLAIN,EXTERNAL`).
    pub params: Option<String>,
    /// Offered by the server.
    pub is_available: bool,
    /// Acknowledged by the server.
    pub is_enabled: bool,
}

/// Available and enabled capabilities for one connection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    available: BTreeMap<String, Option<String>>,
    enabled: BTreeSet<String>,
}

/// Split the capability list of a `CAP` subcommand into `(name, params)`.
///
/// The list is the last parameter; extra spaces are ignored.
fn capability_list(message: &Message) -> impl Iterator<Item = (&str, Option<&str>)> {
    let list = if message.params.len() > 2 {
        message.trailing().unwrap_or_default()
    } else {
        ""
    };
    list.split_whitespace()
        .map(|cap| match cap.split_once('=') {
            Some((name, params)) => (name, Some(params)),
            None => (cap, None),
        })
}

fn sorted_names<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut names: Vec<String> = names.map(str::to_owned).collect();
    names.sort();
    names
}

impl Capabilities {
    /// Empty state, before any `CAP LS`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Capabilities offered by the server with their parameters.
    pub fn available(&self) -> &BTreeMap<String, Option<String>> {
        &self.available
    }

    /// Capabilities acknowledged by the server.
    pub fn enabled(&self) -> &BTreeSet<String> {
        &self.enabled
    }

    /// Whether the server offers `name`.
    pub fn is_available(&self, name: &str) -> bool {
        self.available.contains_key(name)
    }

    /// Whether the server acknowledged `name`.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.contains(name)
    }

    /// Parameters advertised with `name`, if any.
    pub fn params(&self, name: &str) -> Option<&str> {
        self.available.get(name).and_then(Option::as_deref)
    }

    /// Full state of a capability.
    pub fn get_capability_info(&self, name: &str) -> CapabilityInfo {
        CapabilityInfo {
            name: name.to_owned(),
            params: self.params(name).map(str::to_owned),
            is_available: self.is_available(name),
            is_enabled: self.is_enabled(name),
        }
    }

    /// Record a `CAP LS` reply.
    ///
    /// Returns `false` while the server announces more lines to come
    /// (`CAP * LS * :...`), `true` once the listing is complete.
    pub fn handle_ls(&mut self, message: &Message) -> bool {
        for (name, params) in capability_list(message) {
            self.available
                .insert(name.to_owned(), params.map(str::to_owned));
        }
        message.arg(2) != Some("*")
    }

    /// Record a `CAP ACK` reply and return the acknowledged names, sorted.
    ///
    /// A `-` prefix disables the capability. Availability is unchanged.
    pub fn handle_ack(&mut self, message: &Message) -> Vec<String> {
        let names = sorted_names(capability_list(message).map(|(name, _)| name));
        for name in &names {
            match name.strip_prefix('-') {
                Some(disabled) => {
                    self.enabled.remove(disabled);
                }
                None => {
                    self.enabled.insert(name.clone());
                }
            }
        }
        names
    }

    /// Return the names refused by a `CAP NAK` reply, sorted.
    ///
    /// A refused request changes nothing.
    pub fn handle_nak(&mut self, message: &Message) -> Vec<String> {
        sorted_names(capability_list(message).map(|(name, _)| name))
    }

    /// Record a `CAP NEW` notification and return the new names, sorted.
    pub fn handle_new(&mut self, message: &Message) -> Vec<String> {
        let mut names = Vec::new();
        for (name, params) in capability_list(message) {
            self.available
                .insert(name.to_owned(), params.map(str::to_owned));
            names.push(name);
        }
        sorted_names(names.into_iter())
    }

    /// Record a `CAP DEL` notification and return the removed names, sorted.
    ///
    /// Removed capabilities are neither available nor enabled afterwards.
    pub fn handle_del(&mut self, message: &Message) -> Vec<String> {
        let mut names = Vec::new();
        for (name, _) in capability_list(message) {
            self.available.remove(name);
            self.enabled.remove(name);
            names.push(name);
        }
        sorted_names(names.into_iter())
    }
}
