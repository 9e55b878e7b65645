//! Outbound flood protection and loop detection.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::CoreConfig;

/// Messages remembered per recipient.
const HISTORY_LEN: usize = 10;
/// Elapsed time assumed before the first message to a recipient.
const NO_HISTORY_ELAPSED: Duration = Duration::from_secs(300);
/// Highest accepted anti-loop threshold.
const MAX_ANTILOOP_THRESHOLD: usize = 10;

/// Token bucket settings.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FloodPolicy {
    pub burst_lines: u32,
    pub empty_wait: f64,
    pub refill_rate: u32,
    pub max_wait: f64,
    pub text_length: usize,
    pub penalty_ratio: f64,
}

impl FloodPolicy {
    pub fn from_settings(core: &CoreConfig) -> Self {
        Self {
            burst_lines: core.flood_burst_lines,
            empty_wait: core.flood_empty_wait,
            refill_rate: core.flood_refill_rate,
            max_wait: core.flood_max_wait,
            text_length: core.flood_text_length,
            penalty_ratio: core.flood_penalty_ratio,
        }
    }

    /// Wait imposed on `text` once the bucket is empty, in seconds.
    ///
    /// Text longer than `text_length` adds a penalty; the total is capped
    /// at `max_wait`.
    pub fn wait_for(&self, text: &str) -> f64 {
        let mut penalty = 0.0;
        if self.penalty_ratio > 0.0 {
            let overflow = text.chars().count().saturating_sub(self.text_length) as f64;
            penalty = overflow / (self.text_length as f64 * self.penalty_ratio);
        }
        (self.empty_wait + penalty).min(self.max_wait)
    }
}

/// Repeated message detection settings.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AntiLoop {
    pub threshold: usize,
    pub window: f64,
    pub repeat_text: String,
    pub silent_after: usize,
}

impl AntiLoop {
    pub fn from_settings(core: &CoreConfig) -> Self {
        Self {
            threshold: core.antiloop_threshold.min(MAX_ANTILOOP_THRESHOLD),
            window: core.antiloop_window,
            repeat_text: core.antiloop_repeat_text.clone(),
            silent_after: core.antiloop_silent_after,
        }
    }

    /// Text to actually send, or `None` to stay silent.
    pub fn check(&self, stack: &RecipientStack, elapsed: Duration, text: String) -> Option<String> {
        if self.threshold == 0 || elapsed.as_secs_f64() >= self.window {
            return Some(text);
        }
        if stack.count(&text) < self.threshold {
            return Some(text);
        }
        if stack.count(&self.repeat_text) >= self.silent_after {
            return None;
        }
        Some(self.repeat_text.clone())
    }
}

/// Recent history of what was sent to one recipient.
#[derive(Debug, Clone)]
pub(crate) struct RecipientStack {
    messages: VecDeque<(Instant, String)>,
    flood_left: u32,
}

impl RecipientStack {
    pub fn new(burst_lines: u32) -> Self {
        Self {
            messages: VecDeque::with_capacity(HISTORY_LEN),
            flood_left: burst_lines,
        }
    }

    /// Time since the last message, or five minutes without history.
    pub fn elapsed(&self, now: Instant) -> Duration {
        match self.messages.back() {
            Some((sent, _)) => now.saturating_duration_since(*sent),
            None => NO_HISTORY_ELAPSED,
        }
    }

    /// Refill an empty bucket, then return how long to wait before sending.
    pub fn throttle(&mut self, elapsed: Duration, policy: &FloodPolicy, text: &str) -> Option<Duration> {
        if self.flood_left == 0 {
            let refill = (elapsed.as_secs() as u32).saturating_mul(policy.refill_rate);
            self.flood_left = policy.burst_lines.min(refill);
        }
        if self.flood_left > 0 {
            return None;
        }

        let wait = Duration::try_from_secs_f64(policy.wait_for(text).max(0.0)).unwrap_or(Duration::ZERO);
        (elapsed < wait).then(|| wait - elapsed)
    }

    pub fn count(&self, text: &str) -> usize {
        self.messages.iter().filter(|(_, sent)| sent == text).count()
    }

    /// Record a sent message and spend one line of the bucket.
    pub fn record(&mut self, now: Instant, text: String) {
        self.flood_left = self.flood_left.saturating_sub(1);
        if self.messages.len() == HISTORY_LEN {
            self.messages.pop_front();
        }
        self.messages.push_back((now, text));
    }

    pub fn flood_left(&self) -> u32 {
        self.flood_left
    }
}
