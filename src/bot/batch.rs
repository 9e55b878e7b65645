//! IRCv3 `BATCH` tracking.

use sopel_proto::Message;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchType {
    ChatHistory,
    NetJoin,
    NetSplit,
    Other(String),
}

impl BatchType {
    fn parse(name: &str) -> Self {
        match name {
            "chathistory" => Self::ChatHistory,
            "netjoin" => Self::NetJoin,
            "netsplit" => Self::NetSplit,
            other => Self::Other(other.to_owned()),
        }
    }
}

/// An open batch and the raw lines received in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub reference: String,
    pub batch_type: BatchType,
    /// Reference of the enclosing batch.
    #[allow(dead_code)] // read by plugins
    pub parent: Option<String>,
    #[allow(dead_code)] // read by plugins
    pub params: Vec<String>,
    pub messages: Vec<String>,
}

/// What a line meant for batch tracking.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum BatchEvent {
    /// Not batch related.
    None,
    Opened(String),
    Closed(Batch),
    /// `BATCH -ref` for a batch that was never opened.
    UnknownClosed(String),
    /// Tagged with a batch that is in progress.
    Member(String),
    /// Drop the line: malformed `BATCH` or an unknown batch tag.
    Rejected(&'static str),
}

#[derive(Debug, Default)]
pub(crate) struct Batches {
    open: HashMap<String, Batch>,
}

impl Batches {
    /// Update batch state for an incoming line.
    pub fn track(&mut self, message: &Message, raw: &str) -> BatchEvent {
        let mut event = BatchEvent::None;

        if message.command == "BATCH" {
            let reference = message.arg(0).unwrap_or_default();
            if let Some(reference) = reference.strip_prefix('+').filter(|r| !r.is_empty()) {
                let Some(batch_type) = message.arg(1) else {
                    return BatchEvent::Rejected("malformed BATCH message");
                };
                let parent = message.tag_value("batch").map(str::to_owned);
                if parent.as_ref().is_some_and(|parent| !self.open.contains_key(parent)) {
                    return BatchEvent::Rejected("message in unknown batch");
                }
                self.open.insert(
                    reference.to_owned(),
                    Batch {
                        reference: reference.to_owned(),
                        batch_type: BatchType::parse(batch_type),
                        parent,
                        params: message.params.iter().skip(2).cloned().collect(),
                        messages: Vec::new(),
                    },
                );
                event = BatchEvent::Opened(reference.to_owned());
            } else if let Some(reference) = reference.strip_prefix('-').filter(|r| !r.is_empty()) {
                event = match self.open.remove(reference) {
                    Some(batch) => BatchEvent::Closed(batch),
                    None => BatchEvent::UnknownClosed(reference.to_owned()),
                };
            } else {
                return BatchEvent::Rejected("malformed BATCH message");
            }
        }

        if let Some(tag) = message.tag_value("batch") {
            let Some(batch) = self.open.get_mut(tag) else {
                return BatchEvent::Rejected("message in unknown batch");
            };
            if event == BatchEvent::None {
                batch.messages.push(raw.to_owned());
                event = BatchEvent::Member(tag.to_owned());
            }
        }

        event
    }

    pub fn get(&self, reference: &str) -> Option<&Batch> {
        self.open.get(reference)
    }

    pub fn len(&self) -> usize {
        self.open.len()
    }
}
