use axum::extract::State;
use axum::Json;
use data_encoding::BASE64_NOPAD;
use serde_json::{json, Value};

use crate::snowflake;
use crate::state::AppState;

const TOKEN_SIGNATURE: &[u8] = b"powerunit-signature";

/// Hands out a token in the platform's three-part shape. The gateway only
/// ever checks the configured static token, so the value here is cosmetic;
/// the client just needs something that looks right to store.
pub async fn login(State(state): State<AppState>) -> Json<Value> {
    let generation = BASE64_NOPAD.encode(snowflake::ms_since_epoch().to_string().as_bytes());
    let signature = BASE64_NOPAD.encode(TOKEN_SIGNATURE);
    let settings = state.store.read_self().settings;
    Json(json!({
        "token": format!("powerunit.{generation}.{signature}"),
        "user_settings": settings,
    }))
}

pub async fn location_metadata() -> Json<Value> {
    Json(json!({ "consent_required": true, "country_code": "FR" }))
}
