//! IRC backends.
//!
//! The bot talks to the server only through [`IrcBackend`]; the backend talks
//! back through [`ConnectionHandler`]. [`TokioBackend`] is the real
//! transport, `MockBackend` records lines for tests.

#[cfg(test)]
pub mod mock;
mod socket;

pub use socket::TokioBackend;

use async_trait::async_trait;
use sopel_proto::{prepare_command, safe};

use crate::error::{BackendError, BotError};

/// Process signals the backend forwards to the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// SIGINT, SIGTERM or SIGUSR1.
    Quit,
    /// SIGUSR2.
    Restart,
}

/// Contract between the bot and a connection.
///
/// Every `send_*` helper returns the raw line it queued, CR-LF included, so
/// the caller can log it and synthesize echoes.
pub trait IrcBackend: Send + Sync {
    /// Whether the connection is up.
    fn is_connected(&self) -> bool;

    /// Queue a raw line for sending. Must not block.
    fn irc_send(&self, line: String) -> Result<(), BackendError>;

    /// Called when the server sends `ERROR`.
    fn on_irc_error(&self, text: &str);

    /// Ask the connection to shut down.
    fn close(&self);

    /// Prepare a line from `args` and trailing `text`, then queue it.
    fn send_command(&self, args: &[&str], text: Option<&str>) -> Result<String, BackendError> {
        let raw = prepare_command(args, text);
        self.irc_send(raw.clone())?;
        Ok(raw)
    }

    fn send_ping(&self, host: &str) -> Result<String, BackendError> {
        self.send_command(&["PING", &safe(host)], None)
    }

    fn send_pong(&self, host: &str) -> Result<String, BackendError> {
        self.send_command(&["PONG", &safe(host)], None)
    }

    fn send_nick(&self, nick: &str) -> Result<String, BackendError> {
        self.send_command(&["NICK", &safe(nick)], None)
    }

    fn send_user(
        &self,
        user: &str,
        mode: &str,
        nick: &str,
        name: &str,
    ) -> Result<String, BackendError> {
        self.send_command(&["USER", &safe(user), mode, &safe(nick)], Some(name))
    }

    fn send_pass(&self, password: &str) -> Result<String, BackendError> {
        self.send_command(&["PASS", &safe(password)], None)
    }

    fn send_join(&self, channel: &str, password: Option<&str>) -> Result<String, BackendError> {
        match password {
            Some(password) => self.send_command(&["JOIN", &safe(channel), &safe(password)], None),
            None => self.send_command(&["JOIN", &safe(channel)], None),
        }
    }

    fn send_part(&self, channel: &str, reason: Option<&str>) -> Result<String, BackendError> {
        self.send_command(&["PART", &safe(channel)], reason)
    }

    /// Send `QUIT`; nothing is sent when not connected.
    fn send_quit(&self, reason: Option<&str>) -> Result<Option<String>, BackendError> {
        if !self.is_connected() {
            return Ok(None);
        }
        self.send_command(&["QUIT"], reason).map(Some)
    }

    fn send_kick(
        &self,
        channel: &str,
        nick: &str,
        reason: Option<&str>,
    ) -> Result<String, BackendError> {
        self.send_command(&["KICK", &safe(channel), &safe(nick)], reason)
    }

    fn send_privmsg(&self, dest: &str, text: &str) -> Result<String, BackendError> {
        self.send_command(&["PRIVMSG", &safe(dest)], Some(text))
    }

    fn send_notice(&self, dest: &str, text: &str) -> Result<String, BackendError> {
        self.send_command(&["NOTICE", &safe(dest)], Some(text))
    }
}

/// Callbacks a backend drives while it runs.
#[async_trait]
pub trait ConnectionHandler: Send {
    /// The connection is established.
    async fn on_connect(&mut self) -> Result<(), BotError>;

    /// A decoded line arrived. An error stops the backend.
    async fn on_message(&mut self, line: &str) -> Result<(), BotError>;

    /// The connection is gone, or never came up.
    async fn on_close(&mut self);

    /// A process signal was received.
    fn on_signal(&mut self, signal: Signal);
}
