//! Exponential reconnection backoff.

use std::time::Duration;

use crate::config::ReconnectConfig;

/// Delay before reconnection attempt `attempt` (zero-based): `min(base * 2^attempt, max)`.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
    Duration::from_millis(base_ms.saturating_mul(factor).min(max_ms))
}

/// Reconnection policy for one feed session.
///
/// Tracks the attempt count and whether a reconnection timer is pending.
/// Only one timer may be pending at a time; `schedule` while pending returns
/// `None`, so a burst of close/error notifications cannot stack channels.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    base_ms: u64,
    max_ms: u64,
    attempt: u32,
    pending: bool,
}

impl ReconnectPolicy {
    pub fn new(config: &ReconnectConfig) -> Self {
        Self {
            base_ms: config.base_delay_ms,
            max_ms: config.max_delay_ms,
            attempt: 0,
            pending: false,
        }
    }

    /// Claim the reconnection timer. Returns the delay to wait, or `None`
    /// when a timer is already pending.
    pub fn schedule(&mut self) -> Option<Duration> {
        if self.pending {
            return None;
        }
        let delay = calculate_backoff(self.attempt, self.base_ms, self.max_ms);
        self.attempt = self.attempt.saturating_add(1);
        self.pending = true;
        Some(delay)
    }

    /// The pending timer elapsed.
    pub fn fired(&mut self) {
        self.pending = false;
    }

    /// The pending timer was dropped without firing.
    pub fn cancel(&mut self) {
        self.pending = false;
    }

    /// A channel opened: start counting from zero again.
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.pending = false;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }
}
