//! Connection state and the state machine that drives it.
//!
//! ```text
//! Disconnected{failures} --start--> Connecting{attempt}
//! Connecting{n} --ok--> Connected
//! Connecting{n} --err, n < max--> Disconnected{failures: n}
//! Connecting{n} --err, n == max--> Failed{attempts: n}
//! Connected --drop--> Disconnected{failures: 0}
//! Failed --next connect--> Disconnected{failures: 0} (request rejected)
//! ```

use std::time::Duration;

use crate::error::TransportError;

/// Connection state as seen by views (offline indicators and the like).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting { attempt: u32 },
    Connected,
    Failed { reason: String },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(self, ConnectionState::Connecting { .. })
    }
}

/// Configuration for handshake retries
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Consecutive failed handshakes before the cycle is abandoned
    pub max_attempts: u32,
    /// Delay before the first retry in milliseconds
    pub initial_delay_ms: u64,
    /// Maximum delay in milliseconds
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_multiplier: 1.5,
        }
    }
}

impl ReconnectConfig {
    /// Calculate delay for a given retry number (0 = first retry)
    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        let delay = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(retry as i32);
        Duration::from_millis((delay as u64).min(self.max_delay_ms))
    }

    /// Wait applied before handshake `attempt` (1-based). The first attempt
    /// of a cycle goes out immediately.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        match attempt {
            0 | 1 => Duration::ZERO,
            n => self.delay_for_attempt(n - 2),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Phase {
    Disconnected { failures: u32 },
    Connecting { attempt: u32 },
    Connected,
    Failed { attempts: u32, cause: TransportError },
}

/// What a `connect` request should do given the current phase.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ConnectDecision {
    AlreadyConnected,
    InFlight,
    /// Start handshake number `attempt` once the credential checks out.
    Start { attempt: u32 },
    /// The previous cycle used up its attempts. The machine has been reset.
    Exhausted { attempts: u32, cause: TransportError },
}

#[derive(Debug)]
pub(crate) struct ConnectionMachine {
    phase: Phase,
    max_attempts: u32,
}

impl ConnectionMachine {
    pub(crate) fn new(max_attempts: u32) -> Self {
        Self {
            phase: Phase::Disconnected { failures: 0 },
            max_attempts: max_attempts.max(1),
        }
    }

    pub(crate) fn request_connect(&mut self) -> ConnectDecision {
        match &self.phase {
            Phase::Connected => ConnectDecision::AlreadyConnected,
            Phase::Connecting { .. } => ConnectDecision::InFlight,
            Phase::Disconnected { failures } => ConnectDecision::Start {
                attempt: failures + 1,
            },
            Phase::Failed { attempts, cause } => {
                let decision = ConnectDecision::Exhausted {
                    attempts: *attempts,
                    cause: cause.clone(),
                };
                self.phase = Phase::Disconnected { failures: 0 };
                decision
            }
        }
    }

    pub(crate) fn start(&mut self, attempt: u32) {
        self.phase = Phase::Connecting { attempt };
    }

    pub(crate) fn handshake_succeeded(&mut self) {
        self.phase = Phase::Connected;
    }

    /// Record a failed handshake; returns the attempt number it consumed.
    pub(crate) fn handshake_failed(&mut self, cause: TransportError) -> u32 {
        let attempt = match self.phase {
            Phase::Connecting { attempt } => attempt,
            _ => self.failures() + 1,
        };
        self.phase = if attempt >= self.max_attempts {
            Phase::Failed {
                attempts: attempt,
                cause,
            }
        } else {
            Phase::Disconnected { failures: attempt }
        };
        attempt
    }

    /// The live connection went away. Returns false if there was none.
    pub(crate) fn dropped(&mut self) -> bool {
        if self.phase == Phase::Connected {
            self.phase = Phase::Disconnected { failures: 0 };
            true
        } else {
            false
        }
    }

    pub(crate) fn reset(&mut self) {
        self.phase = Phase::Disconnected { failures: 0 };
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.phase == Phase::Connected
    }

    /// Consecutive failed handshakes in the current cycle.
    pub(crate) fn failures(&self) -> u32 {
        match &self.phase {
            Phase::Disconnected { failures } => *failures,
            Phase::Connecting { attempt } => attempt - 1,
            Phase::Connected => 0,
            Phase::Failed { attempts, .. } => *attempts,
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        match &self.phase {
            Phase::Disconnected { .. } => ConnectionState::Disconnected,
            Phase::Connecting { attempt } => ConnectionState::Connecting { attempt: *attempt },
            Phase::Connected => ConnectionState::Connected,
            Phase::Failed { cause, .. } => ConnectionState::Failed {
                reason: cause.to_string(),
            },
        }
    }
}
