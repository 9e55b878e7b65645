//! Tokio backend: one connection driven by a `select!` loop.

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use sopel_proto::{ConnectOptions, LineSink, LineStream, Transport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};

use super::{ConnectionHandler, IrcBackend, Signal};
use crate::error::BackendError;
use crate::telemetry::spans;

/// How long queued lines may take to flush once the connection ends.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Asynchronous TCP/TLS backend.
///
/// Outbound lines go through an unbounded queue drained by a writer task,
/// so [`IrcBackend::irc_send`] never blocks and lines keep their order.
pub struct TokioBackend {
    options: ConnectOptions,
    server_timeout: Duration,
    ping_interval: Duration,
    connected: AtomicBool,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    shutdown: CancellationToken,
}

impl TokioBackend {
    pub fn new(options: ConnectOptions, server_timeout: Duration, ping_interval: Duration) -> Self {
        Self {
            options,
            server_timeout,
            ping_interval,
            connected: AtomicBool::new(false),
            outbound: Mutex::new(None),
            shutdown: CancellationToken::new(),
        }
    }

    /// Connect, then feed `handler` until the connection ends.
    ///
    /// `handler.on_close` is called exactly once, including when the
    /// connection could not be established.
    pub async fn run_forever(&self, handler: &mut dyn ConnectionHandler) {
        let span = spans::connection(&self.options.host, self.options.port);
        self.run_connection(handler).instrument(span).await;
        info!("Connection backend stopped");
        handler.on_close().await;
    }

    async fn run_connection(&self, handler: &mut dyn ConnectionHandler) {
        debug!(tls = self.options.use_ssl, "Connecting");
        let transport = match Transport::connect(&self.options).await {
            Ok(transport) => transport,
            Err(e) => {
                error!(error = %e, "Unable to connect");
                return;
            }
        };

        let (sink, mut stream) = transport.split();
        let (tx, rx) = mpsc::unbounded_channel();
        *self.outbound.lock() = Some(tx);
        let mut writer = tokio::spawn(write_forever(sink, rx));

        self.connected.store(true, Ordering::SeqCst);
        debug!("Connection registered");

        match handler.on_connect().await {
            Ok(()) => {
                debug!("Waiting for messages...");
                let mut signals = Signals::install();
                self.read_forever(&mut stream, handler, &mut signals).await;
            }
            Err(e) => error!(error = %e, "Connection setup failed"),
        }

        self.connected.store(false, Ordering::SeqCst);
        // dropping the sender lets the writer flush what is queued and exit
        self.outbound.lock().take();
        debug!("Shutting down writer");
        match time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await {
            Ok(Ok(())) => debug!("All clear"),
            Ok(Err(e)) => warn!(error = %e, "Writer task failed"),
            Err(_) => {
                warn!("Writer did not drain in time");
                writer.abort();
            }
        }
    }

    async fn read_forever(
        &self,
        stream: &mut LineStream,
        handler: &mut dyn ConnectionHandler,
        signals: &mut Option<Signals>,
    ) {
        let mut ping_at = Some(Instant::now() + self.ping_interval);
        let mut timeout_at = Instant::now() + self.server_timeout;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    debug!("Close requested");
                    break;
                }
                Some(signal) = next_signal(signals) => {
                    info!(?signal, "Received signal");
                    handler.on_signal(signal);
                }
                _ = sleep_until(ping_at) => {
                    ping_at = None;
                    debug!(interval = ?self.ping_interval, "Sending PING after inactivity");
                    if let Err(e) = self.send_ping(&self.options.host) {
                        warn!(error = %e, "Unable to send PING");
                    }
                }
                _ = time::sleep_until(timeout_at) => {
                    warn!(timeout = ?self.server_timeout, "Reached timeout; closing connection");
                    break;
                }
                next = stream.next() => match next {
                    Some(Ok(line)) => {
                        let now = Instant::now();
                        ping_at = Some(now + self.ping_interval);
                        timeout_at = now + self.server_timeout;

                        if line.is_empty() {
                            debug!("No data received");
                            continue;
                        }
                        if let Err(e) = handler.on_message(&line).await {
                            error!(error = %e, "Unexpected error on message handling");
                            warn!("Stopping the backend after error");
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "Unable to read from IRC server");
                        break;
                    }
                    None => {
                        debug!("Reader received EOF");
                        break;
                    }
                },
            }
        }
    }
}

impl IrcBackend for TokioBackend {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn irc_send(&self, line: String) -> Result<(), BackendError> {
        match self.outbound.lock().as_ref() {
            Some(tx) => tx.send(line).map_err(|_| BackendError::NotConnected),
            None => Err(BackendError::NotConnected),
        }
    }

    fn on_irc_error(&self, text: &str) {
        warn!(error = %text, "Error received from server");
    }

    fn close(&self) {
        self.shutdown.cancel();
    }
}

async fn write_forever(mut sink: LineSink, mut rx: mpsc::UnboundedReceiver<String>) {
    while let Some(line) = rx.recv().await {
        if let Err(e) = sink.send(line).await {
            warn!(error = %e, "Unable to write to IRC server");
            return;
        }
    }
    if let Err(e) = sink.close().await {
        debug!(error = %e, "Writer close failed");
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn next_signal(signals: &mut Option<Signals>) -> Option<Signal> {
    match signals {
        Some(signals) => signals.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(unix)]
struct Signals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    user1: tokio::signal::unix::Signal,
    user2: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    fn install() -> Option<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        let install = || -> std::io::Result<Self> {
            Ok(Self {
                interrupt: signal(SignalKind::interrupt())?,
                terminate: signal(SignalKind::terminate())?,
                user1: signal(SignalKind::user_defined1())?,
                user2: signal(SignalKind::user_defined2())?,
            })
        };
        install()
            .map_err(|e| warn!(error = %e, "Unable to install signal handlers"))
            .ok()
    }

    async fn recv(&mut self) -> Option<Signal> {
        tokio::select! {
            Some(()) = self.interrupt.recv() => Some(Signal::Quit),
            Some(()) = self.terminate.recv() => Some(Signal::Quit),
            Some(()) = self.user1.recv() => Some(Signal::Quit),
            Some(()) = self.user2.recv() => Some(Signal::Restart),
            else => None,
        }
    }
}

#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn install() -> Option<Self> {
        Some(Self)
    }

    async fn recv(&mut self) -> Option<Signal> {
        tokio::signal::ctrl_c().await.ok().map(|()| Signal::Quit)
    }
}
