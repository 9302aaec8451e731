mod auth;
mod misc;
mod users;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Host prefix the client uses for the device-link socket. Both engines
/// share one port; the `Host` header decides which one answers, the way the
/// real platform splits them across domains.
const REMOTE_AUTH_HOST_PREFIX: &str = "remote-auth";

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(upgrade_by_host))
        .route("/remote-auth", get(upgrade_remote_auth))
        .nest("/api/v8", api_v8())
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_v8() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(auth::login))
        .route("/auth/location-metadata", get(auth::location_metadata))
        .route("/gateway", get(misc::get_gateway))
        .route("/experiments", get(misc::experiments))
        .route("/science", post(misc::science))
        .route("/users/@me", get(users::get_current_user).patch(users::update_current_user))
        .route("/users/@me/library", get(misc::library))
        .route("/applications/detectable", get(misc::detectable_applications))
}

async fn upgrade_by_host(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default();
    if host.starts_with(REMOTE_AUTH_HOST_PREFIX) {
        crate::remote_auth::ws_upgrade(ws).await
    } else {
        crate::gateway::ws_upgrade(ws, State(state)).await
    }
}

/// Direct path for test clients that cannot spoof the `Host` header.
async fn upgrade_remote_auth(ws: WebSocketUpgrade) -> Response {
    crate::remote_auth::ws_upgrade(ws).await
}

async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "code": 0, "message": "404: Not Found" })),
    )
}
