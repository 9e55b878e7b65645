//! The bot: connection lifecycle, core protocol state and outbound messages.
//!
//! [`Bot`] implements [`ConnectionHandler`], so a backend drives it with
//! lines from the server. Everything the bot sends goes through an
//! [`IrcBackend`], and through [`Bot::on_message_sent`] afterwards.

mod batch;
mod caps;
mod coretasks;
mod flood;
mod sasl;

pub use batch::Batch;
pub use caps::{CapCallback, CapNegotiation};

use async_trait::async_trait;
use sopel_proto::{
    Capabilities, ConnectOptions, ISupport, Identifier, Message, ModeParser, SaslMechanism,
    get_sendable_message, safe,
};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

use crate::backend::{ConnectionHandler, IrcBackend, Signal, TokioBackend};
use crate::channels::{Channel, User};
use crate::config::CoreConfig;
use crate::dispatch::Registry;
use crate::error::{BackendError, BotError};
use crate::telemetry;
use crate::trigger::Trigger;
use batch::{BatchEvent, Batches};
use caps::CapRequests;
use flood::{AntiLoop, FloodPolicy, RecipientStack};

/// Errors tolerated before the budget is checked.
const ERROR_BURST: u32 = 10;
/// One error is forgiven per full period without errors.
const ERROR_FORGIVE_PERIOD: Duration = Duration::from_secs(5);
/// USERLEN assumed when the server does not announce one.
const DEFAULT_USERLEN: usize = 9;
/// Longest host name a server may report.
const MAX_HOSTNAME_LEN: usize = 63;

/// Server identity from `RPL_MYINFO` (004).
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(dead_code)] // read by plugins
pub struct MyInfo {
    pub client: String,
    pub servername: String,
    pub version: String,
}

/// Options for [`Bot::say_with`].
#[derive(Debug, Clone, Copy)]
pub struct SayOptions<'a> {
    /// Split the text into at most this many lines.
    pub max_messages: usize,
    /// Appended to the last line when the text had to be cut.
    pub truncation: &'a str,
    /// Always appended to the last line.
    pub trailing: &'a str,
}

impl Default for SayOptions<'_> {
    fn default() -> Self {
        Self {
            max_messages: 1,
            truncation: "",
            trailing: "",
        }
    }
}

/// Error rate limiter: too many errors too fast stops the bot.
#[derive(Debug, Default)]
struct ErrorBudget {
    count: u32,
    last: Option<Instant>,
    exhausted: bool,
}

impl ErrorBudget {
    fn record(&mut self, now: Instant) -> Result<(), BotError> {
        if self.count > ERROR_BURST {
            let elapsed = self
                .last
                .map(|last| now.saturating_duration_since(last))
                .unwrap_or_default();
            if elapsed < ERROR_FORGIVE_PERIOD {
                self.exhausted = true;
                return Err(BotError::TooManyErrors);
            }
            let forgiven = elapsed.as_secs() / ERROR_FORGIVE_PERIOD.as_secs();
            self.count = self.count.saturating_sub(forgiven.min(u64::from(u32::MAX)) as u32);
        }
        self.last = Some(now);
        self.count += 1;
        Ok(())
    }
}

/// An IRC bot connected through an [`IrcBackend`].
pub struct Bot {
    settings: CoreConfig,
    registry: Arc<Registry>,
    backend: Option<Arc<dyn IrcBackend>>,

    nick: Identifier,
    isupport: ISupport,
    myinfo: Option<MyInfo>,
    modeparser: ModeParser,
    capabilities: Capabilities,
    cap_requests: CapRequests,
    sasl_mechanism: Option<SaslMechanism>,

    channels: BTreeMap<Identifier, Channel>,
    users: BTreeMap<Identifier, User>,
    user_modes: BTreeSet<char>,
    hostmask: Option<String>,

    connection_registered: bool,
    hasquit: bool,
    wantsrestart: bool,
    last_raw_line: String,
    errors: ErrorBudget,

    flood: FloodPolicy,
    antiloop: AntiLoop,
    stacks: HashMap<Identifier, RecipientStack>,
    batches: Batches,
    echo_queue: VecDeque<String>,
}

impl Bot {
    pub fn new(settings: CoreConfig, registry: Registry) -> Self {
        Self {
            nick: Identifier::new(settings.nick.clone()),
            flood: FloodPolicy::from_settings(&settings),
            antiloop: AntiLoop::from_settings(&settings),
            settings,
            registry: Arc::new(registry),
            backend: None,
            isupport: ISupport::default(),
            myinfo: None,
            modeparser: ModeParser::default(),
            capabilities: Capabilities::new(),
            cap_requests: CapRequests::default(),
            sasl_mechanism: None,
            channels: BTreeMap::new(),
            users: BTreeMap::new(),
            user_modes: BTreeSet::new(),
            hostmask: None,
            connection_registered: false,
            hasquit: false,
            wantsrestart: false,
            last_raw_line: String::new(),
            errors: ErrorBudget::default(),
            stacks: HashMap::new(),
            batches: Batches::default(),
            echo_queue: VecDeque::new(),
        }
    }
}

// ============================================================================
// Accessors
// ============================================================================

#[allow(dead_code)] // read by plugins
impl Bot {
    /// Current nick, which may differ from the configured one.
    pub fn nick(&self) -> &Identifier {
        &self.nick
    }

    pub fn user(&self) -> &str {
        self.settings.user()
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn settings(&self) -> &CoreConfig {
        &self.settings
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn isupport(&self) -> &ISupport {
        &self.isupport
    }

    pub fn myinfo(&self) -> Option<&MyInfo> {
        self.myinfo.as_ref()
    }

    pub fn modeparser(&self) -> &ModeParser {
        &self.modeparser
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn channels(&self) -> &BTreeMap<Identifier, Channel> {
        &self.channels
    }

    pub fn users(&self) -> &BTreeMap<Identifier, User> {
        &self.users
    }

    pub fn user_modes(&self) -> &BTreeSet<char> {
        &self.user_modes
    }

    /// The bot's own `nick!user@host`, once the server has shown it.
    pub fn hostmask(&self) -> Option<&str> {
        self.hostmask.as_deref()
    }

    pub fn connection_registered(&self) -> bool {
        self.connection_registered
    }

    pub fn hasquit(&self) -> bool {
        self.hasquit
    }

    pub fn wantsrestart(&self) -> bool {
        self.wantsrestart
    }

    pub fn last_raw_line(&self) -> &str {
        &self.last_raw_line
    }

    pub fn error_count(&self) -> u32 {
        self.errors.count
    }

    /// Open batch by reference.
    pub fn batch(&self, reference: &str) -> Option<&Batch> {
        self.batches.get(reference)
    }

    /// Use `backend` for everything sent from now on.
    pub fn set_backend(&mut self, backend: Arc<dyn IrcBackend>) {
        self.backend = Some(backend);
    }

    fn backend(&self) -> Result<Arc<dyn IrcBackend>, BotError> {
        self.backend.clone().ok_or(BotError::BackendNotInitialized)
    }
}

impl Bot {
    // ========================================================================
    // Names & lengths
    // ========================================================================

    /// Identifier following the server's CASEMAPPING and CHANTYPES.
    pub fn make_identifier(&self, name: &str) -> Identifier {
        Identifier::with_rules(name, self.isupport.casemapping(), self.isupport.chantypes())
    }

    /// Longest text that fits in one PRIVMSG to `recipient`, as relayed by
    /// the server with the bot's hostmask in front.
    pub fn safe_text_length(&self, recipient: &str) -> usize {
        let max_line_length = self.isupport.linelen();

        let hostmask_length = match &self.hostmask {
            Some(hostmask) => hostmask.len(),
            None => {
                let userlen = self.isupport.userlen().unwrap_or(DEFAULT_USERLEN);
                // nick, "!", optional "~", user, "@", host
                self.nick.as_str().len() + 1 + 1 + self.user().len().min(userlen) + 1 + MAX_HOSTNAME_LEN
            }
        };

        // ":" hostmask " PRIVMSG " recipient " :" text CR-LF
        max_line_length.saturating_sub(1 + hostmask_length + 1 + 7 + 1 + recipient.len() + 2 + 2)
    }

    /// Rebuild the nick with the current case mapping.
    pub fn rebuild_nick(&mut self) {
        self.nick = self.make_identifier(self.nick.as_str());
    }

    /// Switch to `new_nick` without touching the configuration.
    pub fn change_current_nick(&mut self, new_nick: &str) -> Result<(), BotError> {
        let backend = self.backend()?;
        self.nick = self.make_identifier(new_nick);
        debug!(nick = %self.nick, "Sending nick");
        self.emit(backend.send_nick(self.nick.as_str()))
    }

    // ========================================================================
    // Connection lifecycle
    // ========================================================================

    fn connect_options(&self) -> ConnectOptions {
        let core = &self.settings;
        ConnectOptions {
            host: core.host.clone(),
            port: core.port(),
            bind_host: core.bind_host.clone(),
            use_ssl: core.use_ssl,
            verify_ssl: core.verify_ssl,
            ca_certs: core.ca_certs.clone(),
            client_cert: core.client_cert_file.clone(),
            client_key: core.client_cert_key.clone(),
        }
    }

    /// Forget everything learned from the previous connection.
    fn reset_connection(&mut self) {
        self.nick = Identifier::new(self.settings.nick.clone());
        self.isupport = ISupport::default();
        self.myinfo = None;
        self.modeparser = ModeParser::default();
        self.capabilities = Capabilities::new();
        self.cap_requests.reset_negotiation();
        self.sasl_mechanism = None;
        self.channels.clear();
        self.users.clear();
        self.user_modes.clear();
        self.hostmask = None;
        self.connection_registered = false;
        self.hasquit = false;
        self.wantsrestart = false;
        self.errors = ErrorBudget::default();
        self.stacks.clear();
        self.batches = Batches::default();
        self.echo_queue.clear();
    }

    /// Connect and stay connected until the bot quits.
    ///
    /// Reconnects after `reconnect_delay` when the connection drops, and
    /// immediately after a restart. Fails only when errors pile up.
    pub async fn run(&mut self) -> Result<(), BotError> {
        loop {
            self.reset_connection();
            let backend = Arc::new(TokioBackend::new(
                self.connect_options(),
                self.settings.timeout(),
                self.settings.ping_interval(),
            ));
            self.backend = Some(backend.clone() as Arc<dyn IrcBackend>);
            backend.run_forever(self).await;
            self.backend = None;

            if self.errors.exhausted {
                error!("Too many errors, can't continue");
                return Err(BotError::TooManyErrors);
            }
            if self.wantsrestart {
                info!("Restarting");
                continue;
            }
            if self.hasquit {
                info!("Bot has quit");
                return Ok(());
            }

            let delay = Duration::from_secs(self.settings.reconnect_delay);
            warn!(delay_secs = delay.as_secs(), "Disconnected; reconnecting after delay");
            tokio::select! {
                _ = time::sleep(delay) => {}
                _ = tokio::signal::ctrl_c() => {
                    warn!("Interrupted while waiting to reconnect");
                    return Ok(());
                }
            }
        }
    }

    /// Start registration: capability listing, optional PASS, NICK and USER.
    pub fn on_connect(&mut self) -> Result<(), BotError> {
        let backend = self.backend()?;
        info!("Connected, initiating setup sequence");

        debug!("Sending CAP request");
        self.emit(backend.send_command(&["CAP", "LS", "302"], None))?;

        if let Some(password) = self.settings.server_password().map(str::to_owned) {
            debug!("Sending server auth");
            self.emit(backend.send_pass(&password))?;
        }

        debug!(nick = %self.nick, "Sending nick");
        self.emit(backend.send_nick(self.nick.as_str()))?;
        let (user, name) = (self.user().to_owned(), self.name().to_owned());
        debug!(user = %user, name = %name, "Sending user");
        self.emit(backend.send_user(&user, "0", "*", &name))
    }

    /// Handle one line from the server.
    pub async fn on_message(&mut self, line: &str) -> Result<(), BotError> {
        let backend = self.backend()?;
        self.last_raw_line = line.to_owned();
        if self.settings.log_raw {
            telemetry::log_raw(line, "<<");
        }

        let mut message: Message = match line.parse() {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, line = %line, "Unable to parse message");
                return Ok(());
            }
        };
        if !self.capabilities.is_enabled("account-tag")
            && !self.capabilities.is_enabled("extended-join")
        {
            message.remove_tag("account");
        }

        match self.batches.track(&message, line) {
            BatchEvent::Rejected(reason) => {
                error!(line = %line, "Received {}", reason);
                return Ok(());
            }
            BatchEvent::Opened(reference) => debug!(batch = %reference, "Batch opened"),
            BatchEvent::Closed(batch) => debug!(
                batch = %batch.reference,
                batch_type = ?batch.batch_type,
                messages = batch.messages.len(),
                "Batch closed"
            ),
            BatchEvent::UnknownClosed(reference) => {
                warn!(batch = %reference, "Received end of unknown batch")
            }
            BatchEvent::Member(_) | BatchEvent::None => {}
        }

        match message.command.as_str() {
            "PING" => {
                let token = message.trailing().unwrap_or_default().to_owned();
                self.emit(backend.send_pong(&token))?;
            }
            "ERROR" => {
                let text = message.trailing().unwrap_or_default();
                error!(error = %text, "ERROR received from server");
                backend.on_irc_error(text);
                if self.hasquit {
                    backend.close();
                }
            }
            _ => {}
        }

        let trigger = Trigger::new(line, message, &self.nick, |name| self.make_identifier(name));
        if let Err(e) = coretasks::handle(self, &trigger).await {
            error!(command = %trigger.event, error = %e, "Core task failed");
            self.on_error()?;
        }
        self.dispatch(&trigger).await?;
        self.drain_echoes().await
    }

    /// Log a sent line and synthesize its echo when the server will not.
    pub fn on_message_sent(&mut self, raw: &str) {
        if self.settings.log_raw {
            telemetry::log_raw(raw, ">>");
        }

        if self.capabilities.is_enabled("echo-message") {
            return;
        }
        let upper = raw.to_ascii_uppercase();
        if !(upper.starts_with("PRIVMSG") || upper.starts_with("NOTICE")) {
            return;
        }

        let host = match (&self.settings.bind_host, &self.hostmask) {
            (Some(bind_host), _) => bind_host.as_str(),
            (None, Some(hostmask)) => hostmask.rsplit_once('@').map_or(hostmask.as_str(), |(_, host)| host),
            (None, None) => "localhost",
        };
        let echo = format!(
            ":{}!{}@{} {}",
            self.nick,
            self.user(),
            host,
            raw.trim_end_matches(['\r', '\n'])
        );
        self.echo_queue.push_back(echo);
    }

    /// Count an error; fails once errors come too fast.
    pub fn on_error(&mut self) -> Result<(), BotError> {
        error!(last_line = %self.last_raw_line, "Error in core");
        self.errors.record(Instant::now())
    }

    pub async fn on_close(&mut self) {
        info!("Connection closed");
        self.connection_registered = false;
    }

    pub fn on_signal(&mut self, signal: Signal) {
        let result = match signal {
            Signal::Quit => self.quit(Some("Quit")),
            Signal::Restart => self.restart(Some("Restarting")),
        };
        if let Err(e) = result {
            warn!(error = %e, ?signal, "Unable to handle signal");
        }
    }

    async fn dispatch(&mut self, trigger: &Trigger) -> Result<(), BotError> {
        let registry = self.registry.clone();
        registry.dispatch(self, trigger).await
    }

    /// Dispatch the synthesized echoes of what was sent.
    async fn drain_echoes(&mut self) -> Result<(), BotError> {
        while let Some(line) = self.echo_queue.pop_front() {
            let message: Message = match line.parse() {
                Ok(message) => message,
                Err(e) => {
                    debug!(error = %e, "Unable to parse echo");
                    continue;
                }
            };
            let trigger = Trigger::new(&line, message, &self.nick, |name| self.make_identifier(name));
            self.dispatch(&trigger).await?;
        }
        Ok(())
    }
}

// ============================================================================
// Capabilities
// ============================================================================

#[allow(dead_code)] // plugin API
impl Bot {
    /// Ask for `capability` at connection time.
    ///
    /// `-cap` forbids the capability and `=cap` requires it; a bare name is
    /// requested if nobody forbids it. Conflicting requests, and requests
    /// that would change the enabled set after registration, are errors.
    pub fn cap_req(&mut self, plugin: &str, capability: &str, arg: Option<&str>) -> Result<(), BotError> {
        self.cap_requests.cap_req(
            plugin,
            capability,
            arg,
            self.connection_registered,
            &self.capabilities,
        )
    }

    /// Request `capabilities` together, running `callback` on ACK or NAK.
    pub fn register_capability(&mut self, plugin: &str, capabilities: &[&str], callback: Option<CapCallback>) {
        self.cap_requests.register(plugin, capabilities, callback);
    }
}

impl Bot {
    // ========================================================================
    // Sending
    // ========================================================================

    /// Pass a sent line to [`Bot::on_message_sent`].
    fn emit(&mut self, sent: Result<String, BackendError>) -> Result<(), BotError> {
        let raw = sent?;
        self.on_message_sent(&raw);
        Ok(())
    }

    /// Send a raw command; arguments are made safe, `text` is trailing.
    pub fn write(&mut self, args: &[&str], text: Option<&str>) -> Result<(), BotError> {
        let backend = self.backend()?;
        let args: Vec<String> = args.iter().map(|arg| safe(arg)).collect();
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.emit(backend.send_command(&args, text))
    }

    /// `/me` to `dest`.
    #[allow(dead_code)] // plugin API
    pub async fn action(&mut self, text: &str, dest: &str) -> Result<(), BotError> {
        self.say(&format!("\x01ACTION {}\x01", text), dest).await
    }

    /// Join `channel`; `"#chan key"` is split when no password is given.
    pub fn join(&mut self, channel: &str, password: Option<&str>) -> Result<(), BotError> {
        let backend = self.backend()?;
        let (channel, password) = match (password, channel.split_once(' ')) {
            (None, Some((channel, key))) => (channel, Some(key)),
            _ => (channel, password),
        };
        self.emit(backend.send_join(channel, password))
    }

    #[allow(dead_code)] // plugin API
    pub fn kick(&mut self, nick: &str, channel: &str, text: Option<&str>) -> Result<(), BotError> {
        let backend = self.backend()?;
        self.emit(backend.send_kick(channel, nick, text))
    }

    pub fn notice(&mut self, text: &str, dest: &str) -> Result<(), BotError> {
        let backend = self.backend()?;
        self.emit(backend.send_notice(dest, text))
    }

    #[allow(dead_code)] // plugin API
    pub fn part(&mut self, channel: &str, msg: Option<&str>) -> Result<(), BotError> {
        let backend = self.backend()?;
        self.emit(backend.send_part(channel, msg))
    }

    /// Send QUIT and wait for the server to close the connection.
    pub fn quit(&mut self, message: Option<&str>) -> Result<(), BotError> {
        let backend = self.backend()?;
        if let Some(raw) = backend.send_quit(message)? {
            self.on_message_sent(&raw);
        }
        self.hasquit = true;
        Ok(())
    }

    /// Quit, then reconnect right away.
    pub fn restart(&mut self, message: Option<&str>) -> Result<(), BotError> {
        self.wantsrestart = true;
        self.quit(message)
    }

    /// Say `text` to `dest` prefixed with `reply_to: `.
    pub async fn reply(&mut self, text: &str, dest: &str, reply_to: &str, notice: bool) -> Result<(), BotError> {
        let text = format!("{}: {}", reply_to, text);
        if notice {
            self.notice(&text, dest)
        } else {
            self.say(&text, dest).await
        }
    }

    /// Send a PRIVMSG, subject to flood control and loop detection.
    pub async fn say(&mut self, text: &str, recipient: &str) -> Result<(), BotError> {
        self.say_with(text, recipient, SayOptions::default()).await
    }

    /// [`Bot::say`] with splitting, truncation and trailing text.
    pub async fn say_with(
        &mut self,
        text: &str,
        recipient: &str,
        options: SayOptions<'_>,
    ) -> Result<(), BotError> {
        self.backend()?;
        let SayOptions {
            mut max_messages,
            truncation,
            trailing,
        } = options;
        let mut text = text.to_owned();

        loop {
            let mut excess = String::new();
            let mut safe_length = self.safe_text_length(recipient);

            if max_messages > 1 || !truncation.is_empty() || !trailing.is_empty() {
                if max_messages == 1 && !trailing.is_empty() {
                    safe_length = safe_length.saturating_sub(trailing.len());
                }
                (text, excess) = get_sendable_message(&text, safe_length);
            }

            if max_messages == 1 {
                if !excess.is_empty() && !truncation.is_empty() {
                    safe_length = safe_length.saturating_sub(truncation.len());
                    (text, excess) = get_sendable_message(&text, safe_length);
                    text.push_str(truncation);
                }
                text.push_str(trailing);
            }

            if !self.send_throttled(text, recipient).await? {
                return Ok(());
            }

            if max_messages > 1 && !excess.is_empty() {
                text = excess;
                max_messages -= 1;
            } else {
                return Ok(());
            }
        }
    }

    /// Send one PRIVMSG line; `false` when loop detection silenced it.
    async fn send_throttled(&mut self, text: String, recipient: &str) -> Result<bool, BotError> {
        let backend = self.backend()?;
        let recipient_id = self.make_identifier(recipient);
        let burst_lines = self.flood.burst_lines;

        let stack = self
            .stacks
            .entry(recipient_id.clone())
            .or_insert_with(|| RecipientStack::new(burst_lines));
        let elapsed = stack.elapsed(Instant::now());
        if let Some(wait) = stack.throttle(elapsed, &self.flood, &text) {
            debug!(
                wait_secs = wait.as_secs_f64(),
                elapsed_secs = elapsed.as_secs_f64(),
                recipient = %recipient,
                "Flood protection wait"
            );
            time::sleep(wait).await;
        }

        let stack = self
            .stacks
            .entry(recipient_id.clone())
            .or_insert_with(|| RecipientStack::new(burst_lines));
        let Some(text) = self.antiloop.check(stack, elapsed, text) else {
            debug!(recipient = %recipient, "Loop detected; staying silent");
            return Ok(false);
        };

        self.emit(backend.send_privmsg(recipient, &text))?;

        let stack = self
            .stacks
            .entry(recipient_id)
            .or_insert_with(|| RecipientStack::new(burst_lines));
        stack.record(Instant::now(), safe(&text));
        Ok(true)
    }
}

#[async_trait]
impl ConnectionHandler for Bot {
    async fn on_connect(&mut self) -> Result<(), BotError> {
        Bot::on_connect(self)
    }

    async fn on_message(&mut self, line: &str) -> Result<(), BotError> {
        Bot::on_message(self, line).await
    }

    async fn on_close(&mut self) {
        Bot::on_close(self).await
    }

    fn on_signal(&mut self, signal: Signal) {
        Bot::on_signal(self, signal)
    }
}
