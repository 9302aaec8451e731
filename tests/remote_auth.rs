mod common;

use data_encoding::BASE64;
use futures_util::{SinkExt, StreamExt};
use rand::rngs::OsRng;
use rsa::pkcs8::EncodePublicKey;
use rsa::{Oaep, RsaPrivateKey};
use serde_json::{json, Value};
use sha2::Sha256;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use common::WsClient;

async fn connect(base_url: &str) -> WsClient {
    let (ws, _) = connect_async(format!("{base_url}/remote-auth")).await.unwrap();
    ws
}

async fn next_json(ws: &mut WsClient) -> Value {
    loop {
        match ws.next().await.expect("stream ended").unwrap() {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            Message::Close(frame) => panic!("unexpected close: {frame:?}"),
            _ => {}
        }
    }
}

async fn send_json(ws: &mut WsClient, payload: &Value) {
    ws.send(Message::Text(payload.to_string().into()))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_hello_is_sent_first() {
    let (url, _state) = common::spawn_server().await;
    let mut ws = connect(&url).await;

    let hello = next_json(&mut ws).await;
    assert_eq!(hello["op"], "hello");
    assert_eq!(hello["heartbeat_interval"], 60_000);
    assert_eq!(hello["timeout_ms"], 31_536_000_000u64);
}

#[tokio::test]
async fn test_device_link_handshake() {
    let (url, _state) = common::spawn_server().await;
    let mut ws = connect(&url).await;
    next_json(&mut ws).await; // hello

    let key = RsaPrivateKey::new(&mut OsRng, 1024).unwrap();
    let der = key.to_public_key().to_public_key_der().unwrap();

    send_json(
        &mut ws,
        &json!({ "op": "init", "encoded_public_key": BASE64.encode(der.as_bytes()) }),
    )
    .await;

    let proof = next_json(&mut ws).await;
    assert_eq!(proof["op"], "nonce_proof");
    let encrypted = BASE64.decode(proof["encrypted_nonce"].as_str().unwrap().as_bytes()).unwrap();
    let nonce = key.decrypt(Oaep::new::<Sha256>(), &encrypted).unwrap();
    assert_eq!(nonce, b"powerunit-proof-nonce");

    send_json(&mut ws, &json!({ "op": "nonce_proof", "nonce": "whatever" })).await;

    let pending = next_json(&mut ws).await;
    assert_eq!(pending["op"], "pending_remote_init");
    assert_eq!(
        pending["fingerprint"].as_str().unwrap(),
        powerunit::remote_auth::fingerprint(der.as_bytes()),
    );
}

#[tokio::test]
async fn test_heartbeat_is_acked() {
    let (url, _state) = common::spawn_server().await;
    let mut ws = connect(&url).await;
    next_json(&mut ws).await;

    send_json(&mut ws, &json!({ "op": "heartbeat" })).await;
    let ack = next_json(&mut ws).await;
    assert_eq!(ack["op"], "heartbeat_ack");
}

#[tokio::test]
async fn test_unknown_frames_are_ignored() {
    let (url, _state) = common::spawn_server().await;
    let mut ws = connect(&url).await;
    next_json(&mut ws).await;

    send_json(&mut ws, &json!({ "op": "mystery" })).await;
    send_json(&mut ws, &json!({ "op": "heartbeat" })).await;
    let ack = next_json(&mut ws).await;
    assert_eq!(ack["op"], "heartbeat_ack");
}
