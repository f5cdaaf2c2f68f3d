// Client session: the device-side half of the interaction engine.
//
// A Session is one signed-in user on one device: the API handle, the
// membership cache, a local event bus that fans updates out to every open
// PostView, and the toggle controller. Events arriving on the push channel
// (SSE from the server, or the server's own bus when embedded) are fed in
// through `ingest`; `listen` runs that loop for an SSE channel until the
// returned `PushTask` is dropped.

pub mod api;
pub mod comments;
pub mod http;
pub mod local;
pub mod membership;
pub mod sse;
pub mod toggle;
pub mod view;

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use api::{InteractionApi, PushChannel};
pub use membership::MembershipCache;
pub use toggle::{ToggleController, ToggleOutcome};
pub use view::{PostView, ViewSnapshot};

use crate::bus::{Event, EventBus};
use crate::db::models::{Post, RelationKind};
use crate::error::Result;

struct SessionInner {
    api: Arc<dyn InteractionApi>,
    cache: Arc<MembershipCache>,
    bus: EventBus,
    controller: ToggleController,
}

#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub fn new(
        api: Arc<dyn InteractionApi>,
        cache: MembershipCache,
        bus: EventBus,
        debounce: Duration,
    ) -> Self {
        let cache = Arc::new(cache);
        let controller = ToggleController::new(api.clone(), cache.clone(), bus.clone(), debounce);
        Self {
            inner: Arc::new(SessionInner {
                api,
                cache,
                bus,
                controller,
            }),
        }
    }

    pub fn api(&self) -> &Arc<dyn InteractionApi> {
        &self.inner.api
    }

    pub fn memberships(&self) -> &MembershipCache {
        &self.inner.cache
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    /// Flip a relation on a post. A repost id flips the original.
    pub async fn toggle(&self, kind: RelationKind, post_id: i64) -> Result<ToggleOutcome> {
        self.inner.controller.toggle(kind, post_id).await
    }

    pub(crate) fn remember_post(&self, post: &Post) {
        self.inner.controller.remember(post);
    }

    /// Rebuild the membership cache from the server and persist it.
    pub async fn sync_memberships(&self) -> Result<()> {
        for kind in [RelationKind::Like, RelationKind::Repost] {
            let ids = self.inner.api.relations(kind).await?;
            self.inner.cache.rebuild(kind, ids);
        }
        self.inner.cache.persist()?;
        info!(
            likes = self.inner.cache.ids(RelationKind::Like).len(),
            reposts = self.inner.cache.ids(RelationKind::Repost).len(),
            "Membership cache synced"
        );
        Ok(())
    }

    /// Deliver an event from the push channel to local views.
    pub fn ingest(&self, event: Event) -> usize {
        self.inner.bus.publish(event.topic(), event)
    }

    /// Feed a server push channel into `ingest`, reconnecting after
    /// failures. None when the API has no push channel of its own.
    pub fn listen(&self, channel: PushChannel) -> Option<PushTask> {
        let first = self.inner.api.push_events(channel)?;
        let session = self.clone();
        let handle = tokio::spawn(async move {
            let mut events = first;
            let mut delay = RECONNECT_MIN;
            loop {
                while let Some(item) = events.next().await {
                    match item {
                        Ok(event) => {
                            delay = RECONNECT_MIN;
                            session.ingest(event);
                        }
                        Err(e) => {
                            warn!(?channel, error = %e, "Push channel failed");
                            break;
                        }
                    }
                }
                debug!(?channel, delay_ms = delay.as_millis() as u64, "Reconnecting push channel");
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(RECONNECT_MAX);
                match session.inner.api.push_events(channel) {
                    Some(next) => events = next,
                    None => break,
                }
            }
        });
        Some(PushTask { handle })
    }
}

const RECONNECT_MIN: Duration = Duration::from_millis(500);
const RECONNECT_MAX: Duration = Duration::from_secs(30);

/// A running push listener. Dropping it closes the channel.
#[derive(Debug)]
pub struct PushTask {
    handle: JoinHandle<()>,
}

impl PushTask {
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for PushTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
