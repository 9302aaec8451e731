use axum::body::{to_bytes, Body};
use axum::Router;
use http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use powerunit::routes;
use powerunit::state::AppState;

fn app() -> Router {
    routes::router(AppState::new())
}

async fn get_json(app: Router, path: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::get(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn send_json(app: Router, method: &str, path: &str, body: &Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method(method)
                .uri(path)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_login_returns_token_and_settings() {
    let (status, body) =
        send_json(app(), "POST", "/api/v8/auth/login", &json!({ "login": "x", "password": "y" }))
            .await;
    assert_eq!(status, StatusCode::OK);

    let token = body["token"].as_str().unwrap();
    let parts: Vec<&str> = token.split('.').collect();
    assert_eq!(parts.len(), 3);
    assert_eq!(parts[0], "powerunit");
    assert_eq!(body["user_settings"]["theme"], "dark");
    assert_eq!(body["user_settings"]["locale"], "en-GB");
}

#[tokio::test]
async fn test_location_metadata() {
    let (status, body) = get_json(app(), "/api/v8/auth/location-metadata").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["consent_required"], true);
    assert_eq!(body["country_code"], "FR");
}

#[tokio::test]
async fn test_gateway_url() {
    let (status, body) = get_json(app(), "/api/v8/gateway").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["url"], "wss://gateway.discord.gg");
}

#[tokio::test]
async fn test_experiments() {
    let (status, body) = get_json(app(), "/api/v8/experiments").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["assignments"], json!([]));
}

#[tokio::test]
async fn test_science_is_a_black_hole() {
    let response = app()
        .oneshot(
            Request::post("/api/v8/science")
                .header("content-type", "application/json")
                .body(Body::from("{\"events\":[]}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_get_current_user_excludes_settings() {
    let (status, body) = get_json(app(), "/api/v8/users/@me").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "powerunit");
    assert_eq!(body["discriminator"], "0001");
    assert!(body.get("settings").is_none());
}

#[tokio::test]
async fn test_patch_current_user() {
    let app = app();
    let (status, body) = send_json(
        app.clone(),
        "PATCH",
        "/api/v8/users/@me",
        &json!({ "username": "renamed", "id": "123" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "renamed");
    // id is not writable
    assert_ne!(body["id"], "123");

    let (_, body) = get_json(app, "/api/v8/users/@me").await;
    assert_eq!(body["username"], "renamed");
}

#[tokio::test]
async fn test_patch_rejects_non_object() {
    let (status, body) = send_json(app(), "PATCH", "/api/v8/users/@me", &json!([1, 2])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 0);
}

#[tokio::test]
async fn test_unknown_route_shape() {
    let (status, body) = get_json(app(), "/api/v8/does-not-exist").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "code": 0, "message": "404: Not Found" }));
}
