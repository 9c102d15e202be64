//! The reconnect state machine.

use std::time::Duration;

use tether_transport::Generation;
use tracing::{debug, info, trace, warn};

use crate::ReconnectPolicy;

/// Where the controller is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// A channel is open, or nothing has been attempted yet.
    Idle,
    /// Waiting out the delay before connecting `generation`.
    Scheduled { generation: Generation, attempt: u32 },
    /// Connecting `generation`.
    Connecting { generation: Generation },
    /// The retry budget ran out. Only [`ReconnectController::connect_now`]
    /// leaves this state.
    Exhausted,
    /// Explicitly closed. Absorbing.
    Closed,
}

/// Answer to a loss signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Connect `generation` after `delay`. `attempt` counts from 1.
    Retry {
        generation: Generation,
        attempt: u32,
        delay: Duration,
    },
    /// Give up: the retry budget is spent.
    Exhausted,
    /// The signal belongs to a superseded generation, or a reconnect for it
    /// is already scheduled. Ignore it.
    Stale,
    /// The controller is closed. Ignore the signal.
    Closed,
}

/// Collapses loss signals into at most one reconnect per generation.
#[derive(Debug)]
pub struct ReconnectController {
    policy: ReconnectPolicy,
    generation: Generation,
    attempt: u32,
    state: ControllerState,
}

impl ReconnectController {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy: policy.validated(),
            generation: Generation::default(),
            attempt: 0,
            state: ControllerState::Idle,
        }
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// The newest generation handed out.
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Failed attempts since the last successful open.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == ControllerState::Closed
    }

    /// Whether `generation` is the one the controller currently tracks.
    pub fn is_current(&self, generation: Generation) -> bool {
        !self.is_closed() && generation == self.generation
    }

    /// Starts a connection immediately, superseding whatever was in flight
    /// and clearing the retry history.
    ///
    /// Used for the initial connect and for a caller-requested reconnect.
    /// Returns `None` once closed.
    pub fn connect_now(&mut self) -> Option<Generation> {
        if self.is_closed() {
            return None;
        }
        self.generation = self.generation.next();
        self.attempt = 0;
        self.state = ControllerState::Connecting {
            generation: self.generation,
        };
        debug!(generation = %self.generation, "connecting now");
        Some(self.generation)
    }

    /// The delay for `generation` has elapsed. Returns `true` if the caller
    /// should connect; `false` if the timer is stale or the controller closed.
    pub fn begin_attempt(&mut self, generation: Generation) -> bool {
        match self.state {
            ControllerState::Scheduled {
                generation: scheduled,
                attempt,
            } if scheduled == generation => {
                self.state = ControllerState::Connecting { generation };
                debug!(generation = %generation, attempt, "reconnect attempt starting");
                true
            }
            _ => {
                trace!(generation = %generation, state = ?self.state, "ignoring stale retry timer");
                false
            }
        }
    }

    /// The channel for `generation` opened. Resets the retry history.
    /// Returns `false` if `generation` is stale.
    pub fn on_open(&mut self, generation: Generation) -> bool {
        match self.state {
            ControllerState::Connecting { generation: current } if current == generation => {
                if self.attempt > 0 {
                    info!(generation = %generation, attempts = self.attempt, "reconnected");
                }
                self.attempt = 0;
                self.state = ControllerState::Idle;
                true
            }
            _ => {
                trace!(generation = %generation, "ignoring open for stale generation");
                false
            }
        }
    }

    /// The channel for `generation` failed to connect, errored or closed.
    ///
    /// The first signal for the current generation moves to the next
    /// generation and either schedules a retry or gives up. Every further
    /// signal for the old generation is [`Decision::Stale`].
    pub fn on_loss(&mut self, generation: Generation) -> Decision {
        let live = match self.state {
            ControllerState::Closed => return Decision::Closed,
            ControllerState::Idle => generation == self.generation,
            ControllerState::Connecting { generation: current } => generation == current,
            ControllerState::Scheduled { .. } | ControllerState::Exhausted => false,
        };
        if !live {
            trace!(generation = %generation, current = %self.generation, "ignoring stale loss signal");
            return Decision::Stale;
        }

        self.generation = self.generation.next();

        if let Some(retries) = self.policy.retries {
            if self.attempt >= retries {
                warn!(
                    generation = %generation,
                    retries,
                    "reconnect attempts exhausted"
                );
                self.state = ControllerState::Exhausted;
                return Decision::Exhausted;
            }
        }

        let delay = self.policy.delay_for(self.attempt);
        self.attempt += 1;
        self.state = ControllerState::Scheduled {
            generation: self.generation,
            attempt: self.attempt,
        };
        debug!(
            lost = %generation,
            next = %self.generation,
            attempt = self.attempt,
            delay_ms = delay.as_millis() as u64,
            "reconnect scheduled"
        );
        Decision::Retry {
            generation: self.generation,
            attempt: self.attempt,
            delay,
        }
    }

    /// Stops all reconnecting for good. Idempotent.
    pub fn close(&mut self) {
        if !self.is_closed() {
            debug!(generation = %self.generation, "reconnect controller closed");
            self.state = ControllerState::Closed;
        }
    }
}
