use axum::extract::State;
use axum::Json;
use serde_json::Value;

use crate::error::ApiError;
use crate::project::project;
use crate::state::AppState;

/// The account object as the API returns it: the stored self user without
/// its `settings` sub-object (that one has its own endpoints on the real
/// platform and rides along in READY here).
pub async fn get_current_user(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let user = serde_json::to_value(state.store.read_self())
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(project(&user, &["settings"], true)))
}

pub async fn update_current_user(
    State(state): State<AppState>,
    Json(patch): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    if !patch.is_object() {
        return Err(ApiError::BadRequest("expected a JSON object".to_string()));
    }
    let updated = state.store.patch_self(&patch);
    let user =
        serde_json::to_value(updated).map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(project(&user, &["settings"], true)))
}
