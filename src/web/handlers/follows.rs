// POST/DELETE /api/users/{id}/follow: follow or unfollow a user.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde_json::{json, Value};

use crate::error::Result;
use crate::web::{AppState, AuthUser};

pub async fn follow(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(followee_id): Path<i64>,
) -> Result<Json<Value>> {
    let created = state.service.follow(user_id, followee_id).await?;
    Ok(Json(json!({ "following": true, "created": created })))
}

pub async fn unfollow(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(followee_id): Path<i64>,
) -> Result<Json<Value>> {
    let removed = state.service.unfollow(user_id, followee_id).await?;
    Ok(Json(json!({ "following": false, "removed": removed })))
}
