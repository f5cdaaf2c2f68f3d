// Like / retweet toggles and counter reads for a post.
//
// POST creates the relation, DELETE removes it. Both are idempotent: a
// repeat returns the current state without touching the counter. The id in
// the path may name a repost; the response always carries the canonical
// post id.

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::db::models::{PostCounts, RelationKind};
use crate::error::{InteractionError, Result};
use crate::web::{AppState, AuthUser};

/// POST /api/posts/{id}/like
pub async fn like(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(post_id): Path<i64>,
) -> Result<Json<Value>> {
    let out = state.service.like(user_id, post_id).await?;
    Ok(Json(json!({ "likes": out.count, "liked": out.active, "postId": out.post_id })))
}

/// DELETE /api/posts/{id}/like
pub async fn unlike(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(post_id): Path<i64>,
) -> Result<Json<Value>> {
    let out = state.service.unlike(user_id, post_id).await?;
    Ok(Json(json!({ "likes": out.count, "liked": out.active, "postId": out.post_id })))
}

/// POST /api/posts/{id}/retweet
pub async fn retweet(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(post_id): Path<i64>,
) -> Result<Json<Value>> {
    let out = state.service.repost(user_id, post_id).await?;
    Ok(Json(json!({
        "retweets": out.count,
        "retweeted": out.active,
        "postId": out.post_id,
        "retweetData": out.repost,
    })))
}

/// DELETE /api/posts/{id}/retweet
pub async fn unretweet(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(post_id): Path<i64>,
) -> Result<Json<Value>> {
    let out = state.service.unrepost(user_id, post_id).await?;
    Ok(Json(json!({
        "retweets": out.count,
        "retweeted": out.active,
        "postId": out.post_id,
    })))
}

/// GET /api/posts/{id}/counts
pub async fn counts(State(state): State<AppState>, Path(post_id): Path<i64>) -> Result<Json<PostCounts>> {
    Ok(Json(state.service.counts(post_id).await?))
}

#[derive(Deserialize)]
pub struct RelationsQuery {
    pub kind: String,
}

/// GET /api/me/relations?kind=like|repost: rebuilds a client's membership cache.
pub async fn my_relations(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Query(params): Query<RelationsQuery>,
) -> Result<Json<Value>> {
    let kind = match params.kind.to_ascii_lowercase().as_str() {
        "like" | "likes" => RelationKind::Like,
        "repost" | "retweet" | "reposts" | "retweets" => RelationKind::Repost,
        other => {
            return Err(InteractionError::validation(format!(
                "Unknown relation kind '{other}'"
            )))
        }
    };
    let post_ids = state.service.relations(user_id, kind).await?;
    Ok(Json(json!({ "kind": kind, "postIds": post_ids })))
}
