pub mod broadcaster;
pub mod codec;
pub mod etf;
pub mod events;
pub mod session;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};

use crate::snowflake;
use crate::state::AppState;
use session::FrameOutcome;
use session::GatewaySession;

/// How long a fresh connection may sit before IDENTIFY arrives.
pub const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(60);

pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel();

    // Pump tasks bridge the socket to the loop so the loop itself stays
    // transport-free (and therefore drivable under a paused clock in tests).
    let reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = stream.next().await {
            if in_tx.send(msg).is_err() {
                break;
            }
        }
    });
    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() || closing {
                break;
            }
        }
    });

    run_session(state, in_rx, out_tx).await;

    reader.abort();
    let _ = writer.await;
}

/// Drives one gateway connection to completion: owns the session's two
/// timers and routes inbound frames into the state machine. The session
/// itself lives in the broadcaster registry from the first frame on, so
/// fan-out and this loop mutate it through the same handle.
pub async fn run_session(
    state: AppState,
    mut inbound: mpsc::UnboundedReceiver<Message>,
    outbound: mpsc::UnboundedSender<Message>,
) {
    let session_id = snowflake::generate();
    let mut session = GatewaySession::new(
        session_id.clone(),
        state.store.clone(),
        state.token.clone(),
        outbound,
    );
    let interval = session.heartbeat_interval();
    if session.hello().is_err() {
        return;
    }
    tracing::debug!(session_id = %session_id, interval_ms = interval.as_millis() as u64, "gateway connection open");
    state.broadcaster.register(session);

    let identify_deadline = time::sleep(IDENTIFY_TIMEOUT);
    let heartbeat_deadline = time::sleep(interval * 2);
    tokio::pin!(identify_deadline);
    tokio::pin!(heartbeat_deadline);
    let mut identified = false;
    let mut closing = false;

    loop {
        tokio::select! {
            _ = &mut identify_deadline, if !identified && !closing => {
                tracing::debug!(session_id = %session_id, "no IDENTIFY within the window, dropping connection");
                state.broadcaster.with_session(&session_id, |s| s.force_close());
                closing = true;
            }
            _ = &mut heartbeat_deadline, if !closing => {
                tracing::debug!(session_id = %session_id, "heartbeat window expired, dropping connection");
                state.broadcaster.with_session(&session_id, |s| s.force_close());
                closing = true;
            }
            msg = inbound.recv() => match msg {
                Some(Message::Binary(raw)) => {
                    match state.broadcaster.with_session(&session_id, |s| s.handle_frame(&raw)) {
                        Some(FrameOutcome::Heartbeat) => {
                            heartbeat_deadline.as_mut().reset(Instant::now() + interval * 2);
                        }
                        Some(FrameOutcome::Identified) => identified = true,
                        Some(FrameOutcome::Closed) | None => closing = true,
                        Some(FrameOutcome::Continue) => {}
                    }
                }
                Some(Message::Close(_)) | None => break,
                // Text, ping and pong are not part of this protocol.
                Some(_) => {}
            }
        }
    }

    state.broadcaster.remove(&session_id);
    tracing::debug!(session_id = %session_id, "gateway connection closed");
}
