//! Backend that records sent lines instead of writing to a socket.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use super::IrcBackend;
use crate::error::BackendError;

/// Recording backend, connected by default.
#[derive(Debug)]
pub struct MockBackend {
    sent: Mutex<Vec<String>>,
    connected: AtomicBool,
    closed: AtomicBool,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
            closed: AtomicBool::new(false),
        }
    }

    /// Every line sent so far, CR-LF included.
    pub fn message_sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// Lines sent after the first `n`.
    pub fn sent_since(&self, n: usize) -> Vec<String> {
        self.sent.lock().iter().skip(n).cloned().collect()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl IrcBackend for MockBackend {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn irc_send(&self, line: String) -> Result<(), BackendError> {
        self.sent.lock().push(line);
        Ok(())
    }

    fn on_irc_error(&self, _text: &str) {}

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Raw lines as the backend sends them.
pub fn rawlist(lines: &[&str]) -> Vec<String> {
    lines.iter().map(|line| format!("{}\r\n", line)).collect()
}
