// Server-sent event streams over the in-process bus.
//
// GET /api/posts/{id}/events      new-comment, comment-deleted, counters
// GET /api/notifications/stream   notification
//
// Each stream owns its bus subscription; when the client disconnects axum
// drops the stream and the subscription unregisters itself.

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::Extension;
use futures::stream::{self, Stream};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::debug;

use crate::bus::{Event, Subscription, Topic};
use crate::error::Result;
use crate::web::{AppState, AuthUser};

fn to_sse(event: &Event) -> SseEvent {
    SseEvent::default()
        .event(event.name())
        .json_data(event)
        .unwrap_or_else(|_| SseEvent::default().comment("unserializable event"))
}

fn event_stream(
    subscription: Subscription,
    rx: UnboundedReceiver<Event>,
) -> impl Stream<Item = std::result::Result<SseEvent, Infallible>> {
    stream::unfold((subscription, rx), |(subscription, mut rx)| async move {
        let event = rx.recv().await?;
        Some((Ok(to_sse(&event)), (subscription, rx)))
    })
}

/// GET /api/posts/{id}/events: push channel for the canonical post.
pub async fn post_events(
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
) -> Result<Sse<impl Stream<Item = std::result::Result<SseEvent, Infallible>>>> {
    let post = state.service.resolve_post(post_id).await?;
    let (subscription, rx) = state.service.bus().subscribe_channel(Topic::Post(post.id));
    debug!(post_id = post.id, "Post event stream opened");
    Ok(Sse::new(event_stream(subscription, rx)).keep_alive(KeepAlive::default()))
}

/// GET /api/notifications/stream: push channel for the caller.
pub async fn notification_stream(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Sse<impl Stream<Item = std::result::Result<SseEvent, Infallible>>> {
    let (subscription, rx) = state.service.bus().subscribe_channel(Topic::User(user_id));
    debug!(user_id, "Notification stream opened");
    Sse::new(event_stream(subscription, rx)).keep_alive(KeepAlive::default())
}
