//! Shared helpers: an in-memory mock server and event recording.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tether::prelude::*;
use tether::transport::{memory_endpoint, Channel, Frame, MemoryChannel, MemoryConnector, MemoryControl};
use tokio::sync::{broadcast, mpsc};

/// How the mock server answers.
#[derive(Debug, Clone, Copy)]
pub struct Behavior {
    /// Send every non-probe frame straight back.
    pub echo: bool,
    /// Answer `"ping"` with `"pong"`.
    pub answer_pings: bool,
}

impl Behavior {
    pub const SILENT: Self = Self {
        echo: false,
        answer_pings: false,
    };
    pub const ECHO: Self = Self {
        echo: true,
        answer_pings: true,
    };
}

/// A frame the server received, tagged with the 1-based connection it
/// arrived on.
pub type Received = (usize, Frame);

pub struct MockServer {
    pub connector: MemoryConnector,
    pub control: MemoryControl,
    received: mpsc::UnboundedReceiver<Received>,
    kick: broadcast::Sender<()>,
    accepted: Arc<AtomicUsize>,
}

impl MockServer {
    pub fn start(behavior: Behavior) -> Self {
        let (connector, mut listener) = memory_endpoint();
        let control = listener.control();
        let (received_tx, received) = mpsc::unbounded_channel();
        let (kick, _) = broadcast::channel(16);

        let accepted = Arc::new(AtomicUsize::new(0));

        let kick_tx = kick.clone();
        let accepted_count = Arc::clone(&accepted);
        tokio::spawn(async move {
            while let Some(channel) = listener.accept().await {
                let index = accepted_count.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::spawn(serve(
                    index,
                    channel,
                    behavior,
                    received_tx.clone(),
                    kick_tx.subscribe(),
                ));
            }
        });

        Self {
            connector,
            control,
            received,
            kick,
            accepted,
        }
    }

    pub fn connections(&self) -> usize {
        self.control.connection_count()
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.control.set_reachable(reachable);
    }

    /// Drops every connection the server currently holds.
    pub async fn kick(&self) {
        while self.accepted.load(Ordering::SeqCst) < self.connections() {
            tokio::task::yield_now().await;
        }
        let _ = self.kick.send(());
    }

    /// The next frame that is not a liveness probe.
    pub async fn next_frame(&mut self) -> Received {
        loop {
            let received = tokio::time::timeout(Duration::from_secs(600), self.received.recv())
                .await
                .expect("server should receive a frame")
                .expect("server task alive");
            if received.1 != Frame::from("ping") {
                return received;
            }
        }
    }

    /// Everything received so far, probes included.
    pub fn drain(&mut self) -> Vec<Received> {
        std::iter::from_fn(|| self.received.try_recv().ok()).collect()
    }
}

async fn serve(
    index: usize,
    mut channel: MemoryChannel,
    behavior: Behavior,
    received: mpsc::UnboundedSender<Received>,
    mut kick: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = kick.recv() => {
                let _ = channel.close().await;
                return;
            }
            frame = channel.recv() => {
                let Ok(Some(frame)) = frame else { return };
                let _ = received.send((index, frame.clone()));
                let reply = if frame == Frame::from("ping") {
                    behavior.answer_pings.then(|| Frame::from("pong"))
                } else {
                    behavior.echo.then_some(frame)
                };
                if let Some(reply) = reply {
                    let _ = channel.send(reply).await;
                }
            }
        }
    }
}

/// Records every event the socket emits, in dispatch order.
pub fn record(socket: &DurableSocket) -> mpsc::UnboundedReceiver<SocketEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    for kind in [EventKind::Open, EventKind::Close, EventKind::Error, EventKind::Message] {
        let tx = tx.clone();
        socket.add_event_listener(kind, move |event| {
            let _ = tx.send(event.clone());
        });
    }
    rx
}

/// Waits for the next event of `kind`, skipping others.
pub async fn next_event(events: &mut mpsc::UnboundedReceiver<SocketEvent>, kind: EventKind) -> SocketEvent {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(600), events.recv())
            .await
            .unwrap_or_else(|_| panic!("no {kind} event"))
            .expect("socket alive");
        if event.kind() == kind {
            return event;
        }
    }
}

/// Everything already dispatched.
pub fn drain_events(events: &mut mpsc::UnboundedReceiver<SocketEvent>) -> Vec<SocketEvent> {
    std::iter::from_fn(|| events.try_recv().ok()).collect()
}

pub fn count(events: &[SocketEvent], kind: EventKind) -> usize {
    events.iter().filter(|event| event.kind() == kind).count()
}

pub fn fast_policy() -> ReconnectPolicy {
    ReconnectPolicy::fixed(Duration::from_millis(100))
}
