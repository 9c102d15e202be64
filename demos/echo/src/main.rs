//! Echo demo: a local WebSocket echo server and a durable client talking to
//! it. The server hangs up after echoing five frames on a connection, so the
//! client has to reconnect a few times over the run.
//!
//! Run with `RUST_LOG=tether=debug cargo run -p echo` to watch it heal.

use std::time::Duration;

use serde_json::json;
use tether::prelude::*;
use tether::transport::{Channel, Frame, WebSocketListener};
use tracing::info;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

async fn serve(listener: WebSocketListener) {
    let mut accepted = 0u64;
    while let Ok(mut channel) = listener.accept().await {
        accepted += 1;
        let connection = accepted;
        tokio::spawn(async move {
            let mut echoed = 0;
            while let Ok(Some(frame)) = channel.recv().await {
                let reply = match frame.as_text() {
                    Some("ping") => Frame::from("pong"),
                    _ => frame,
                };
                if channel.send(reply).await.is_err() {
                    break;
                }
                echoed += 1;
                if echoed == 5 {
                    info!(connection, "server dropping connection");
                    let _ = channel.close().await;
                    break;
                }
            }
        });
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let listener = WebSocketListener::bind("127.0.0.1:0").await?;
    let url = format!("ws://{}", listener.local_addr()?);
    tokio::spawn(serve(listener));
    info!(%url, "echo server listening");

    let socket = DurableSocket::builder(url)
        .reconnect(ReconnectPolicy::exponential(
            Duration::from_millis(100),
            2.0,
            Duration::from_secs(2),
        ))
        .plugin(json_plugin())
        .plugin(heartbeat_plugin(Duration::from_secs(1), Duration::from_secs(2)))
        .connect();

    socket.add_event_listener(EventKind::Open, |_| info!("client open"));
    socket.add_event_listener(EventKind::Close, |event| {
        if let SocketEvent::Close(close) = event {
            info!(code = close.code, reason = %close.reason, "client closed");
        }
    });

    let scope = EffectScope::new();
    create_websocket_event_effect(&scope, &socket, "counter", |envelope| {
        let n = &envelope["n"];
        info!(%n, "echo received");
    });

    for n in 0..20 {
        socket.send_json(&json!({ "type": "counter", "n": n }))?;
        tokio::time::sleep(Duration::from_millis(250)).await;
    }

    scope.dispose();
    socket.close();
    socket.wait_for_state(ReadyState::Closed).await?;
    Ok(())
}
