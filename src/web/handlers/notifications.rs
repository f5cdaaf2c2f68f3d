// Notification pull, read-state and transaction recording.
//
// GET /api/notifications?type=&page=&perPage= is the authoritative view;
// the SSE stream at /api/notifications/stream is best-effort on top.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::db::models::{Notification, NotificationKind};
use crate::error::{InteractionError, Result};
use crate::notify::{NotificationPage, DEFAULT_PER_PAGE};
use crate::web::{AppState, AuthUser};

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NotificationsQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// GET /api/notifications: newest first, with the total unread count.
pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Query(params): Query<NotificationsQuery>,
) -> Result<Json<NotificationPage>> {
    let kind = match params.kind.as_deref().map(str::trim) {
        None | Some("") | Some("all") => None,
        Some(raw) => Some(NotificationKind::parse(raw).ok_or_else(|| {
            InteractionError::validation(format!("Unknown notification type '{raw}'"))
        })?),
    };

    let page = state
        .service
        .notifier()
        .list(
            user_id,
            kind,
            params.page.unwrap_or(1),
            params.per_page.unwrap_or(DEFAULT_PER_PAGE),
        )
        .await?;
    Ok(Json(page))
}

/// PUT /api/notifications/{id}/read: idempotent.
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(notification_id): Path<i64>,
) -> Result<Json<Notification>> {
    Ok(Json(
        state
            .service
            .notifier()
            .mark_read(user_id, notification_id)
            .await?,
    ))
}

/// PUT /api/notifications/mark-all-read
pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<Json<Value>> {
    let updated = state.service.notifier().mark_all_read(user_id).await?;
    Ok(Json(json!({ "updated": updated, "unreadCount": 0 })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTransaction {
    pub recipient_id: i64,
    pub amount: f64,
    pub signature: String,
}

/// POST /api/transactions: record a completed tip and notify the recipient.
pub async fn record_transaction(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(body): Json<NewTransaction>,
) -> Result<(StatusCode, Json<Value>)> {
    let notification = state
        .service
        .record_transaction(user_id, body.recipient_id, body.amount, &body.signature)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "notification": notification })),
    ))
}
