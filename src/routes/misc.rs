//! Endpoints the client calls that only need a plausible canned answer.

use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

pub async fn get_gateway() -> Json<Value> {
    Json(json!({ "url": "wss://gateway.discord.gg" }))
}

pub async fn experiments() -> Json<Value> {
    Json(json!({ "assignments": [], "fingerprint": "1337.uwu" }))
}

pub async fn science() -> StatusCode {
    StatusCode::NO_CONTENT
}

pub async fn library() -> Json<Value> {
    Json(json!([]))
}

pub async fn detectable_applications() -> Json<Value> {
    Json(json!([]))
}
