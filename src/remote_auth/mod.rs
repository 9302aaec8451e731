//! Device-link (QR login) handshake engine.
//!
//! JSON text frames, no compression. The mock carries the handshake exactly
//! to the "pending" stage: there is no second device, so the flow never
//! progresses past `pending_remote_init`. Two deliberate simplifications are
//! part of the contract: the client's `nonce_proof` is trusted without
//! checking it decrypted the nonce, and the advertised timeout is never
//! enforced server-side.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use data_encoding::{BASE64, BASE64URL_NOPAD};
use futures_util::{SinkExt, StreamExt};
use rand::rngs::OsRng;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Oaep, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Plaintext the server proves key possession with. The client decrypts this
/// with its private key and echoes a hash back in the real protocol.
pub const PROOF_NONCE: &[u8] = b"powerunit-proof-nonce";

/// Advertised link-session lifetime. One year: the mock never expires it.
const TIMEOUT_MS: u64 = 365 * 24 * 3_600_000;
const HEARTBEAT_INTERVAL_MS: u64 = 60_000;

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum ClientMessage {
    Init { encoded_public_key: String },
    NonceProof,
    Heartbeat,
}

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ServerMessage {
    Hello {
        timeout_ms: u64,
        heartbeat_interval: u64,
    },
    NonceProof {
        encrypted_nonce: String,
    },
    PendingRemoteInit {
        fingerprint: String,
    },
    HeartbeatAck,
}

#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("public key is not valid base64: {0}")]
    Base64(#[from] data_encoding::DecodeError),
    #[error("public key is not a DER/SPKI RSA key: {0}")]
    Spki(#[from] rsa::pkcs8::spki::Error),
    #[error("OAEP encryption failed: {0}")]
    Encrypt(#[from] rsa::Error),
}

/// Per-connection handshake state. The only thing worth remembering between
/// frames is the fingerprint derived from the client's key.
#[derive(Default)]
pub struct RemoteAuthSession {
    fingerprint: String,
}

impl RemoteAuthSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hello() -> ServerMessage {
        ServerMessage::Hello {
            timeout_ms: TIMEOUT_MS,
            heartbeat_interval: HEARTBEAT_INTERVAL_MS,
        }
    }

    /// Handles one inbound text frame. Unknown ops and undecodable frames
    /// produce no reply; errors while processing `init` are surfaced so the
    /// transport can drop the connection.
    pub fn handle_message(&mut self, raw: &str) -> Result<Option<ServerMessage>, HandshakeError> {
        let message = match serde_json::from_str::<ClientMessage>(raw) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(error = %e, "ignoring unparseable remote-auth frame");
                return Ok(None);
            }
        };
        match message {
            ClientMessage::Init { encoded_public_key } => {
                self.handle_init(&encoded_public_key).map(Some)
            }
            ClientMessage::NonceProof => {
                // Deliberately not verified; any proof is accepted.
                Ok(Some(ServerMessage::PendingRemoteInit {
                    fingerprint: self.fingerprint.clone(),
                }))
            }
            ClientMessage::Heartbeat => Ok(Some(ServerMessage::HeartbeatAck)),
        }
    }

    fn handle_init(&mut self, encoded_public_key: &str) -> Result<ServerMessage, HandshakeError> {
        let der = BASE64.decode(encoded_public_key.as_bytes())?;
        let key = RsaPublicKey::from_public_key_der(&der)?;
        let ciphertext = key.encrypt(&mut OsRng, Oaep::new::<Sha256>(), PROOF_NONCE)?;
        self.fingerprint = fingerprint(&der);
        Ok(ServerMessage::NonceProof {
            encrypted_nonce: BASE64.encode(&ciphertext),
        })
    }
}

/// Stable identifier for a public key: URL-safe unpadded base64 of the
/// SHA-256 digest over the raw DER bytes.
pub fn fingerprint(public_key_der: &[u8]) -> String {
    BASE64URL_NOPAD.encode(&Sha256::digest(public_key_der))
}

pub async fn ws_upgrade(ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(handle_socket)
}

async fn handle_socket(socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();
    let mut session = RemoteAuthSession::new();

    if send(&mut sink, &RemoteAuthSession::hello()).await.is_err() {
        return;
    }

    while let Some(Ok(msg)) = stream.next().await {
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            // The handshake is JSON text only.
            _ => continue,
        };
        match session.handle_message(&text) {
            Ok(Some(reply)) => {
                if send(&mut sink, &reply).await.is_err() {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "remote-auth handshake failed, dropping connection");
                break;
            }
        }
    }
    tracing::debug!("remote-auth connection closed");
}

async fn send(
    sink: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    message: &ServerMessage,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(message).map_err(axum::Error::new)?;
    sink.send(Message::Text(text.into())).await
}
