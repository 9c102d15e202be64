//! Liveness probing.
//!
//! A channel can die silently: no close frame, no read error, just nothing.
//! The heartbeat plugin notices by sending a probe after `interval` of
//! outbound silence and expecting the ack within `wait`. An unanswered probe
//! forces the socket through the same reconnect path as a channel error.
//!
//! Register it **last** in the plugin list, nearest the channel: its ack
//! frames are then consumed before any codec sees them, and its probes are
//! written raw so no codec ever encodes them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tether_protocol::{Inbound, Payload, Plugin, PluginLink, ProtocolError};
use tether_transport::Frame;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Outbound silence after which a probe is sent.
    pub interval: Duration,
    /// How long to wait for the ack before declaring the channel dead.
    pub wait: Duration,
    /// Probe frame text.
    pub probe: String,
    /// Ack frame text. Matching inbound frames are never delivered to
    /// listeners.
    pub ack: String,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            wait: Duration::from_millis(1_500),
            probe: "ping".to_owned(),
            ack: "pong".to_owned(),
        }
    }
}

impl HeartbeatConfig {
    /// Shortest accepted `interval` and `wait`.
    pub const MIN_PERIOD: Duration = Duration::from_millis(10);

    /// Raises `interval` and `wait` to at least [`Self::MIN_PERIOD`].
    pub fn validated(mut self) -> Self {
        if self.interval < Self::MIN_PERIOD {
            warn!(
                interval_ms = self.interval.as_millis() as u64,
                "heartbeat interval too short, clamping"
            );
            self.interval = Self::MIN_PERIOD;
        }
        if self.wait < Self::MIN_PERIOD {
            warn!(
                wait_ms = self.wait.as_millis() as u64,
                "heartbeat wait too short, clamping"
            );
            self.wait = Self::MIN_PERIOD;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Plugin
// ---------------------------------------------------------------------------

/// Per-channel liveness state shared with the probe task.
struct Liveness {
    last_activity: Mutex<Instant>,
    awaiting_ack: AtomicBool,
    acked: Notify,
}

impl Liveness {
    fn new() -> Self {
        Self {
            last_activity: Mutex::new(Instant::now()),
            awaiting_ack: AtomicBool::new(false),
            acked: Notify::new(),
        }
    }

    fn touch(&self) {
        *self.last_activity.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    fn last_activity(&self) -> Instant {
        *self.last_activity.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Session {
    liveness: Arc<Liveness>,
    task: JoinHandle<()>,
}

/// The liveness plugin. See the [module docs](self).
pub struct HeartbeatPlugin {
    config: HeartbeatConfig,
    session: Option<Session>,
}

/// Creates a [`HeartbeatPlugin`] with the default probe and ack frames.
pub fn heartbeat_plugin(interval: Duration, wait: Duration) -> HeartbeatPlugin {
    HeartbeatPlugin::new(HeartbeatConfig {
        interval,
        wait,
        ..Default::default()
    })
}

impl HeartbeatPlugin {
    pub fn new(config: HeartbeatConfig) -> Self {
        Self {
            config: config.validated(),
            session: None,
        }
    }

    pub fn config(&self) -> &HeartbeatConfig {
        &self.config
    }

    fn stop(&mut self) {
        if let Some(session) = self.session.take() {
            session.task.abort();
        }
    }
}

impl Plugin for HeartbeatPlugin {
    fn name(&self) -> &'static str {
        "heartbeat"
    }

    fn on_send(&mut self, payload: Payload) -> Result<Payload, ProtocolError> {
        if let Some(session) = &self.session {
            session.liveness.touch();
        }
        Ok(payload)
    }

    fn on_message(&mut self, payload: Payload) -> Result<Inbound, ProtocolError> {
        let Some(session) = &self.session else {
            return Ok(Inbound::Deliver(payload));
        };
        if payload.as_text() != Some(self.config.ack.as_str()) {
            return Ok(Inbound::Deliver(payload));
        }
        if session.liveness.awaiting_ack.swap(false, Ordering::SeqCst) {
            session.liveness.acked.notify_one();
        }
        Ok(Inbound::Consumed)
    }

    fn on_open(&mut self, link: &PluginLink) {
        self.stop();
        let liveness = Arc::new(Liveness::new());
        let task = tokio::spawn(probe_loop(
            self.config.clone(),
            Arc::clone(&liveness),
            link.clone(),
        ));
        self.session = Some(Session { liveness, task });
    }

    fn on_close(&mut self) {
        self.stop();
    }
}

impl Drop for HeartbeatPlugin {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn probe_loop(config: HeartbeatConfig, liveness: Arc<Liveness>, link: PluginLink) {
    loop {
        let due = liveness.last_activity() + config.interval;
        if Instant::now() < due {
            time::sleep_until(due).await;
            continue;
        }

        liveness.awaiting_ack.store(true, Ordering::SeqCst);
        liveness.touch();
        if !link.send_raw(Frame::Text(config.probe.clone())) {
            return;
        }
        trace!(generation = %link.generation(), "liveness probe sent");

        if time::timeout(config.wait, liveness.acked.notified()).await.is_err() {
            warn!(
                generation = %link.generation(),
                wait_ms = config.wait.as_millis() as u64,
                "liveness probe unanswered, forcing reconnect"
            );
            link.force_reconnect("heartbeat timeout");
            return;
        }
    }
}
