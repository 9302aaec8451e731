use axum::extract::ws::{CloseFrame, Message, Utf8Bytes};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use super::codec::{CodecError, FrameCodec};
use super::etf;
use super::events::{self, close_code, InboundFrame, OpCode, Payload};
use crate::store::Store;

/// One-way connection lifecycle. There is no re-entry: a closed session is
/// torn down, reconnecting is the client's problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("connection is closed")]
    Closed,
    #[error("a dispatch needs a non-empty event name")]
    MissingEventName,
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// What the session event loop should do after an inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Continue,
    /// Heartbeat handled; the heartbeat-timeout window restarts.
    Heartbeat,
    /// Identification succeeded; the identify-timeout is dead from here on.
    Identified,
    /// The session queued a close frame; stop arming timers.
    Closed,
}

/// Per-connection gateway state machine. Owns the sequence counter and the
/// live compression context; every byte that leaves the connection goes
/// through `send`.
pub struct GatewaySession {
    session_id: String,
    state: ConnectionState,
    sequence: u64,
    heartbeat_interval: Duration,
    codec: FrameCodec,
    store: Arc<Store>,
    token: String,
    outbound: mpsc::UnboundedSender<Message>,
}

impl GatewaySession {
    pub fn new(
        session_id: String,
        store: Arc<Store>,
        token: String,
        outbound: mpsc::UnboundedSender<Message>,
    ) -> Self {
        Self {
            session_id,
            state: ConnectionState::Connecting,
            sequence: 0,
            heartbeat_interval: Duration::from_millis(
                rand::thread_rng().gen_range(40_000..50_000),
            ),
            codec: FrameCodec::new(),
            store,
            token,
            outbound,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    /// First frame on every connection.
    pub fn hello(&mut self) -> Result<(), SessionError> {
        self.send(Payload::hello(self.heartbeat_interval.as_millis() as u64))
    }

    /// Sends a DISPATCH frame, stamping the next sequence number.
    pub fn dispatch(&mut self, event: &str, data: serde_json::Value) -> Result<(), SessionError> {
        if event.is_empty() {
            return Err(SessionError::MissingEventName);
        }
        self.send(Payload::dispatch(event, data))
    }

    /// The single egress path. Stamps `s` on DISPATCH, encodes through the
    /// shared compression context and queues exactly one transport write.
    fn send(&mut self, mut payload: Payload) -> Result<(), SessionError> {
        if self.state == ConnectionState::Closed {
            return Err(SessionError::Closed);
        }
        if payload.op == OpCode::Dispatch {
            payload.s = Some(self.sequence);
            self.sequence += 1;
        }
        let frame = self.codec.encode(&payload.to_value())?;
        self.outbound
            .send(Message::Binary(frame.into()))
            .map_err(|_| SessionError::Closed)
    }

    /// Routes one raw inbound transport frame.
    pub fn handle_frame(&mut self, raw: &[u8]) -> FrameOutcome {
        let decoded = match etf::decode(raw) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(session_id = %self.session_id, error = %e, "undecodable frame");
                return self.close(close_code::DECODE_ERROR, None);
            }
        };
        let frame = match InboundFrame::from_value(decoded) {
            Some(frame) => frame,
            None => return self.close(close_code::DECODE_ERROR, None),
        };
        match frame.opcode() {
            Some(OpCode::Heartbeat) => self.handle_heartbeat(),
            Some(OpCode::Identify) => self.handle_identify(&frame.d),
            other => {
                tracing::debug!(session_id = %self.session_id, op = ?frame.op, opcode = ?other, "ignoring unhandled opcode");
                FrameOutcome::Continue
            }
        }
    }

    fn handle_heartbeat(&mut self) -> FrameOutcome {
        if self.send(Payload::heartbeat_ack()).is_err() {
            return FrameOutcome::Closed;
        }
        FrameOutcome::Heartbeat
    }

    // Check precedence is part of the wire contract: state, then credential,
    // then the compress flag.
    fn handle_identify(&mut self, d: &serde_json::Value) -> FrameOutcome {
        if self.state != ConnectionState::Connecting {
            return self.close(close_code::ALREADY_AUTHENTICATED, None);
        }
        if d.get("token").and_then(|t| t.as_str()) != Some(self.token.as_str()) {
            return self.close(close_code::AUTH_FAILED, None);
        }
        if d.get("compress").and_then(|c| c.as_bool()).unwrap_or(false) {
            return self.close(close_code::UNSUPPORTED_FEATURE, Some("Unsupported (powerunit)"));
        }

        self.state = ConnectionState::Connected;
        let ready_session = random_session_token();
        let ready = events::ready(&self.store, &ready_session);
        if self.dispatch("READY", ready).is_err()
            || self.dispatch("READY_SUPPLEMENTAL", events::ready_supplemental()).is_err()
        {
            return FrameOutcome::Closed;
        }
        tracing::info!(session_id = %self.session_id, "gateway session identified");
        FrameOutcome::Identified
    }

    /// Queues a close frame and marks the session dead. Idempotent: a second
    /// call is a no-op so a late timer cannot clobber an earlier close.
    pub fn close(&mut self, code: u16, reason: Option<&'static str>) -> FrameOutcome {
        if self.state == ConnectionState::Closed {
            return FrameOutcome::Closed;
        }
        self.state = ConnectionState::Closed;
        let frame = CloseFrame {
            code,
            reason: Utf8Bytes::from_static(reason.unwrap_or("")),
        };
        let _ = self.outbound.send(Message::Close(Some(frame)));
        FrameOutcome::Closed
    }

    /// Timer-driven teardown (missed identify or missed heartbeat). A plain
    /// close, no protocol error code.
    pub fn force_close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.state = ConnectionState::Closed;
        let _ = self.outbound.send(Message::Close(None));
    }

    /// The transport went away underneath us.
    pub fn mark_closed(&mut self) {
        self.state = ConnectionState::Closed;
    }
}

fn random_session_token() -> String {
    data_encoding::HEXLOWER.encode(&rand::random::<[u8; 16]>())
}
