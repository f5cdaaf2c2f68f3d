//! In-process publish/subscribe for post and user topics.
//!
//! Views subscribe to the canonical post they render; the server's SSE
//! endpoints subscribe on behalf of remote clients. Delivery is
//! at-least-once from the consumer's point of view, so every handler must
//! be idempotent (the comment aggregator dedups by id, counter events are
//! absolute values).
//!
//! Handlers are snapshotted under the lock and invoked outside it, so a
//! handler may itself publish or subscribe without deadlocking.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::db::models::{Comment, Notification, PostCounts};

/// What a subscriber listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Events for one canonical post.
    Post(i64),
    /// Events addressed to one user (notifications).
    User(i64),
}

/// A pushed event. Serialized as the SSE `data:` payload; `name()` is the
/// SSE event name.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Event {
    NewComment(CommentEvent),
    CommentDeleted(CommentDeletedEvent),
    Counters(PostCounts),
    Notification(Notification),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentEvent {
    pub post_id: i64,
    pub id: i64,
    pub author: String,
    pub content: String,
    pub created_at: String,
}

impl From<&Comment> for CommentEvent {
    fn from(c: &Comment) -> Self {
        Self {
            post_id: c.post_id,
            id: c.id,
            author: c.author.clone(),
            content: c.content.clone(),
            created_at: c.created_at.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentDeletedEvent {
    pub post_id: i64,
    pub id: i64,
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::NewComment(_) => "new-comment",
            Event::CommentDeleted(_) => "comment-deleted",
            Event::Counters(_) => "counters",
            Event::Notification(_) => "notification",
        }
    }

    /// Rebuild an event from its SSE name and `data:` payload. Unknown
    /// names are skipped so older clients survive new event types.
    pub fn decode(name: &str, data: &str) -> serde_json::Result<Option<Event>> {
        let event = match name {
            "new-comment" => Event::NewComment(serde_json::from_str(data)?),
            "comment-deleted" => Event::CommentDeleted(serde_json::from_str(data)?),
            "counters" => Event::Counters(serde_json::from_str(data)?),
            "notification" => Event::Notification(serde_json::from_str(data)?),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    /// The topic this event belongs on.
    pub fn topic(&self) -> Topic {
        match self {
            Event::NewComment(e) => Topic::Post(e.post_id),
            Event::CommentDeleted(e) => Topic::Post(e.post_id),
            Event::Counters(c) => Topic::Post(c.post_id),
            Event::Notification(n) => Topic::User(n.user_id),
        }
    }
}

type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

struct Entry {
    handler: Handler,
    alive: Arc<AtomicBool>,
}

#[derive(Default)]
struct BusInner {
    next_id: AtomicU64,
    topics: Mutex<HashMap<Topic, HashMap<u64, Entry>>>,
}

/// Cloneable handle to a shared bus.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `topic`. The handler stays registered until
    /// the returned `Subscription` is dropped or cancelled.
    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let alive = Arc::new(AtomicBool::new(true));
        let entry = Entry {
            handler: Arc::new(handler),
            alive: alive.clone(),
        };
        if let Ok(mut topics) = self.inner.topics.lock() {
            topics.entry(topic).or_default().insert(id, entry);
        }
        Subscription {
            bus: Arc::downgrade(&self.inner),
            topic,
            id,
            alive,
        }
    }

    /// Subscribe with a channel instead of a callback. Used by the SSE
    /// endpoints: the stream owns the `Subscription`, so a disconnected
    /// client unregisters when its stream is dropped.
    pub fn subscribe_channel(&self, topic: Topic) -> (Subscription, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sub = self.subscribe(topic, move |event| {
            // Receiver gone means the stream is being torn down.
            let _ = tx.send(event.clone());
        });
        (sub, rx)
    }

    /// Deliver `event` to every live subscriber of `topic`. Returns the
    /// number of handlers invoked.
    pub fn publish(&self, topic: Topic, event: Event) -> usize {
        let snapshot: Vec<(Handler, Arc<AtomicBool>)> = match self.inner.topics.lock() {
            Ok(topics) => topics
                .get(&topic)
                .map(|subs| {
                    subs.values()
                        .map(|e| (e.handler.clone(), e.alive.clone()))
                        .collect()
                })
                .unwrap_or_default(),
            Err(_) => return 0,
        };

        let mut delivered = 0;
        for (handler, alive) in snapshot {
            // A subscription cancelled after the snapshot was taken.
            if !alive.load(Ordering::Acquire) {
                continue;
            }
            handler(&event);
            delivered += 1;
        }
        tracing::trace!(?topic, event = event.name(), delivered, "Published");
        delivered
    }

    /// Number of live subscribers on a topic.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.inner
            .topics
            .lock()
            .map(|topics| topics.get(&topic).map_or(0, HashMap::len))
            .unwrap_or(0)
    }
}

/// RAII registration. Dropping it unregisters the handler.
pub struct Subscription {
    bus: std::sync::Weak<BusInner>,
    topic: Topic,
    id: u64,
    alive: Arc<AtomicBool>,
}

impl Subscription {
    pub fn topic(&self) -> Topic {
        self.topic
    }

    pub fn is_active(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Unregister now. Idempotent; also runs on drop.
    pub fn cancel(&self) {
        if !self.alive.swap(false, Ordering::AcqRel) {
            return;
        }
        let Some(bus) = self.bus.upgrade() else {
            return;
        };
        let Ok(mut topics) = bus.topics.lock() else {
            return;
        };
        if let Some(subs) = topics.get_mut(&self.topic) {
            subs.remove(&self.id);
            if subs.is_empty() {
                topics.remove(&self.topic);
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counters(post_id: i64, likes: i64) -> Event {
        Event::Counters(PostCounts {
            post_id,
            likes,
            retweets: 0,
            comments: 0,
        })
    }

    #[test]
    fn test_publish_reaches_only_topic_subscribers() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let _sub = bus.subscribe(Topic::Post(1), move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(bus.publish(Topic::Post(1), counters(1, 3)), 1);
        assert_eq!(bus.publish(Topic::Post(2), counters(2, 3)), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let bus = EventBus::new();
        let sub = bus.subscribe(Topic::User(9), |_| {});
        assert_eq!(bus.subscriber_count(Topic::User(9)), 1);
        drop(sub);
        assert_eq!(bus.subscriber_count(Topic::User(9)), 0);
        assert_eq!(bus.publish(Topic::User(9), counters(1, 1)), 0);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let bus = EventBus::new();
        let sub = bus.subscribe(Topic::Post(4), |_| {});
        sub.cancel();
        sub.cancel();
        assert!(!sub.is_active());
        assert_eq!(bus.subscriber_count(Topic::Post(4)), 0);
    }

    #[test]
    fn test_subscription_outlives_bus() {
        let bus = EventBus::new();
        let first = bus.subscribe(Topic::Post(5), |_| {});
        let second = bus.subscribe(Topic::Post(5), |_| {});
        drop(first);
        assert_eq!(bus.subscriber_count(Topic::Post(5)), 1);
        drop(bus);
        second.cancel();
        assert!(!second.is_active());
    }

    #[test]
    fn test_handler_may_subscribe_during_publish() {
        let bus = EventBus::new();
        let inner_bus = bus.clone();
        let held = Arc::new(Mutex::new(Vec::new()));
        let held2 = held.clone();
        let _sub = bus.subscribe(Topic::Post(1), move |_| {
            let s = inner_bus.subscribe(Topic::Post(2), |_| {});
            held2.lock().unwrap().push(s);
        });
        bus.publish(Topic::Post(1), counters(1, 1));
        assert_eq!(bus.subscriber_count(Topic::Post(2)), 1);
    }

    #[tokio::test]
    async fn test_channel_subscription_receives_events() {
        let bus = EventBus::new();
        let (_sub, mut rx) = bus.subscribe_channel(Topic::Post(5));
        bus.publish(Topic::Post(5), counters(5, 2));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.name(), "counters");
        assert_eq!(event, counters(5, 2));
    }

    #[test]
    fn test_event_payload_shape() {
        let event = Event::CommentDeleted(CommentDeletedEvent { post_id: 3, id: 8 });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json, serde_json::json!({ "postId": 3, "id": 8 }));
        assert_eq!(event.name(), "comment-deleted");
    }

    #[test]
    fn test_decode_by_event_name() {
        let event = counters(7, 4);
        let data = serde_json::to_string(&event).unwrap();
        assert_eq!(Event::decode(event.name(), &data).unwrap(), Some(event));
        assert_eq!(Event::decode("typing", "{}").unwrap(), None);
        assert!(Event::decode("new-comment", "{\"postId\":1}").is_err());
    }
}
