#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use powerunit::gateway::codec::StreamInflater;
use powerunit::gateway::etf;
use powerunit::routes;
use powerunit::state::AppState;

pub type WsClient = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Boots the full router on an ephemeral port. Returns the `ws://` base URL
/// and the state handle so tests can reach the store and broadcaster.
pub async fn spawn_server() -> (String, AppState) {
    let state = AppState::new();
    let app = routes::router(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("ws://127.0.0.1:{}", addr.port()), state)
}

/// Client side of the gateway transport: ETF-packs a payload into a binary
/// ws message.
pub fn pack(payload: &Value) -> Message {
    Message::Binary(etf::encode(payload).into())
}

/// Gateway client bundling the socket with its connection-long inflate
/// context, since frames are useless without it.
pub struct GatewayClient {
    pub ws: WsClient,
    pub inflater: StreamInflater,
}

impl GatewayClient {
    pub async fn connect(base_url: &str) -> Self {
        let (ws, _) = connect_async(format!("{base_url}/")).await.unwrap();
        Self {
            ws,
            inflater: StreamInflater::new(),
        }
    }

    pub async fn send(&mut self, payload: &Value) {
        self.ws.send(pack(payload)).await.unwrap();
    }

    /// Next decoded gateway payload; panics on close or stream end.
    pub async fn next_payload(&mut self) -> Value {
        loop {
            match self.ws.next().await.expect("stream ended").unwrap() {
                Message::Binary(chunk) => return self.inflater.decode(&chunk).unwrap(),
                Message::Close(frame) => panic!("unexpected close: {frame:?}"),
                _ => {}
            }
        }
    }

    /// Reads until the server closes, returning the close code (if any).
    pub async fn next_close_code(&mut self) -> Option<u16> {
        loop {
            match self.ws.next().await? {
                Ok(Message::Close(frame)) => return frame.map(|f| u16::from(f.code)),
                Ok(_) => {}
                Err(_) => return None,
            }
        }
    }
}
