// Comment create / delete / list.
//
// Comments always attach to the canonical post, so a comment submitted
// from a repost's view lands on (and counts against) the original.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::Result;
use crate::interactions::CommentList;
use crate::web::{AppState, AuthUser};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    pub post_id: i64,
    pub content: String,
}

/// POST /api/comments: returns 201 with the stored comment and new count.
pub async fn create_comment(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(body): Json<NewComment>,
) -> Result<(StatusCode, Json<Value>)> {
    let out = state
        .service
        .add_comment(user_id, body.post_id, &body.content)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "comment": out.comment, "count": out.count })),
    ))
}

/// DELETE /api/comments/{id}: author only.
pub async fn delete_comment(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(comment_id): Path<i64>,
) -> Result<Json<Value>> {
    let count = state.service.delete_comment(user_id, comment_id).await?;
    Ok(Json(json!({ "deleted": true, "count": count })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentsQuery {
    pub post_id: i64,
}

/// GET /api/comments?postId=: oldest first.
pub async fn list_comments(
    State(state): State<AppState>,
    Query(params): Query<CommentsQuery>,
) -> Result<Json<CommentList>> {
    Ok(Json(state.service.list_comments(params.post_id).await?))
}
