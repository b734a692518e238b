//! Liveness state machine.
//!
//! # States
//! - Idle: no endpoint, or torn down
//! - Connecting: a channel attempt is in progress or scheduled
//! - Connected: a channel is open
//! - FallingBack: the channel missed the fallback window; polling is active
//!   while the channel keeps retrying in the background
//!
//! # State Transitions
//! ```text
//! Idle        → Connecting:  start
//! Connecting  → Connected:   channel opened
//! Connecting  → FallingBack: fallback timer fired
//! FallingBack → Connected:   channel opened (polling stopped in the same step)
//! Connected   → Connecting:  channel lost (reconnect scheduled, fallback re-armed)
//! any         → Idle:        teardown
//! ```
//!
//! The machine performs no I/O. Each input returns the actions the driver
//! must execute, in order.

use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::resilience::ReconnectPolicy;

/// Connection status reported to the view binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Polling,
    Disconnected,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Polling => "polling",
            ConnectionStatus::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessState {
    Idle,
    Connecting,
    Connected,
    FallingBack,
}

impl LivenessState {
    pub fn status(&self) -> ConnectionStatus {
        match self {
            LivenessState::Idle => ConnectionStatus::Disconnected,
            LivenessState::Connecting => ConnectionStatus::Connecting,
            LivenessState::Connected => ConnectionStatus::Connected,
            LivenessState::FallingBack => ConnectionStatus::Polling,
        }
    }
}

/// Side effects requested by the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    OpenChannel,
    CloseChannel,
    ArmFallbackTimer(Duration),
    CancelFallbackTimer,
    ScheduleReconnect(Duration),
    CancelReconnect,
    StartPolling,
    StopPolling,
    /// Re-fetch the bulk list; issued when a channel re-opens after a loss.
    Refresh,
}

/// Liveness state machine for one feed session.
#[derive(Debug, Clone)]
pub struct LivenessMachine {
    state: LivenessState,
    policy: ReconnectPolicy,
    fallback_ceiling: Duration,
    fallback_armed: bool,
    polling: bool,
    channel_open: bool,
    lost_since_open: bool,
    refresh_on_reconnect: bool,
}

impl LivenessMachine {
    pub fn new(policy: ReconnectPolicy, fallback_ceiling: Duration, refresh_on_reconnect: bool) -> Self {
        Self {
            state: LivenessState::Idle,
            policy,
            fallback_ceiling,
            fallback_armed: false,
            polling: false,
            channel_open: false,
            lost_since_open: false,
            refresh_on_reconnect,
        }
    }

    pub fn state(&self) -> LivenessState {
        self.state
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state.status()
    }

    pub fn is_polling(&self) -> bool {
        self.polling
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Idle → Connecting: open a channel and arm the fallback timer.
    pub fn start(&mut self) -> Vec<Action> {
        if self.state != LivenessState::Idle {
            return Vec::new();
        }
        self.state = LivenessState::Connecting;
        let mut actions = vec![Action::OpenChannel];
        self.arm_fallback(&mut actions);
        actions
    }

    /// The current channel opened.
    pub fn on_channel_open(&mut self) -> Vec<Action> {
        if self.state == LivenessState::Idle {
            return Vec::new();
        }
        let mut actions = Vec::new();
        if self.polling {
            self.polling = false;
            actions.push(Action::StopPolling);
        }
        if self.fallback_armed {
            self.fallback_armed = false;
            actions.push(Action::CancelFallbackTimer);
        }
        if self.policy.is_pending() {
            actions.push(Action::CancelReconnect);
        }
        self.policy.reset();
        self.channel_open = true;
        self.state = LivenessState::Connected;

        if self.lost_since_open && self.refresh_on_reconnect {
            actions.push(Action::Refresh);
        }
        self.lost_since_open = false;
        actions
    }

    /// The current channel closed or failed (before or after opening).
    pub fn on_channel_lost(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        match self.state {
            LivenessState::Idle => return actions,
            LivenessState::Connected => {
                self.state = LivenessState::Connecting;
                self.channel_open = false;
                self.lost_since_open = true;
                self.arm_fallback(&mut actions);
            }
            LivenessState::Connecting | LivenessState::FallingBack => {}
        }
        if let Some(delay) = self.policy.schedule() {
            actions.push(Action::ScheduleReconnect(delay));
        }
        actions
    }

    /// The fallback window elapsed without an open channel.
    pub fn on_fallback_timer(&mut self) -> Vec<Action> {
        self.fallback_armed = false;
        if self.state != LivenessState::Connecting {
            return Vec::new();
        }
        self.state = LivenessState::FallingBack;
        self.polling = true;
        vec![Action::StartPolling]
    }

    /// The reconnection delay elapsed.
    pub fn on_reconnect_timer(&mut self) -> Vec<Action> {
        self.policy.fired();
        match self.state {
            LivenessState::Connecting | LivenessState::FallingBack if !self.channel_open => {
                vec![Action::OpenChannel]
            }
            _ => Vec::new(),
        }
    }

    /// Cancel everything and return to Idle. Every cleanup action is issued
    /// unconditionally.
    pub fn teardown(&mut self) -> Vec<Action> {
        self.state = LivenessState::Idle;
        self.polling = false;
        self.fallback_armed = false;
        self.channel_open = false;
        self.lost_since_open = false;
        self.policy.cancel();
        vec![
            Action::CancelFallbackTimer,
            Action::CancelReconnect,
            Action::StopPolling,
            Action::CloseChannel,
        ]
    }

    fn arm_fallback(&mut self, actions: &mut Vec<Action>) {
        self.fallback_armed = true;
        actions.push(Action::ArmFallbackTimer(self.fallback_ceiling));
    }
}
