// Toggle controller: turns a like/repost tap into at most one server call.
//
// Taps may name a repost; the controller resolves it to the original post
// (asking the server once per unknown id) before anything else, so the
// debounce slot and the membership lookup always use the canonical id.
//
// Per (kind, canonical post) the controller keeps an in-flight flag and the
// time of the last accepted tap. A tap while a request is outstanding, or
// within the debounce window of the previous one, is collapsed and reports
// the current cached state. An accepted tap flips the membership cache
// optimistically, asks the server for the new state, then reconciles the
// cache to the server's answer (or rolls it back on failure).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::api::InteractionApi;
use super::membership::MembershipCache;
use crate::bus::{Event, EventBus, Topic};
use crate::db::models::{Post, RelationKind};
use crate::error::Result;

/// Default debounce window between accepted taps on the same button.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// The server confirmed a new state.
    Applied { active: bool, count: i64 },
    /// The tap was collapsed into one already in progress.
    Debounced { active: bool },
}

impl ToggleOutcome {
    pub fn active(&self) -> bool {
        match self {
            ToggleOutcome::Applied { active, .. } | ToggleOutcome::Debounced { active } => *active,
        }
    }
}

type Key = (RelationKind, i64);

#[derive(Default)]
struct Slot {
    in_flight: bool,
    last_accepted: Option<Instant>,
}

pub struct ToggleController {
    api: Arc<dyn InteractionApi>,
    cache: Arc<MembershipCache>,
    bus: EventBus,
    debounce: Duration,
    slots: Arc<Mutex<HashMap<Key, Slot>>>,
    /// Post id -> canonical post id, for every post seen so far.
    canonical: Mutex<HashMap<i64, i64>>,
}

/// Clears the in-flight flag even if the toggle future is dropped mid-call.
struct InFlight {
    slots: Arc<Mutex<HashMap<Key, Slot>>>,
    key: Key,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = slots.get_mut(&self.key) {
            slot.in_flight = false;
        }
    }
}

impl ToggleController {
    pub fn new(
        api: Arc<dyn InteractionApi>,
        cache: Arc<MembershipCache>,
        bus: EventBus,
        debounce: Duration,
    ) -> Self {
        Self {
            api,
            cache,
            bus,
            debounce,
            slots: Arc::new(Mutex::new(HashMap::new())),
            canonical: Mutex::new(HashMap::new()),
        }
    }

    /// Record a post's canonical id so toggles on it need no lookup.
    pub fn remember(&self, post: &Post) {
        let mut canonical = self.canonical.lock().unwrap_or_else(PoisonError::into_inner);
        canonical.insert(post.id, post.canonical_id());
        canonical.insert(post.canonical_id(), post.canonical_id());
    }

    /// The original post behind `post_id`. The counts endpoint resolves
    /// reposts, so its answer carries the canonical id.
    async fn resolve(&self, post_id: i64) -> Result<i64> {
        let known = self
            .canonical
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&post_id)
            .copied();
        if let Some(id) = known {
            return Ok(id);
        }

        let counts = self.api.post_counts(post_id).await?;
        let mut canonical = self.canonical.lock().unwrap_or_else(PoisonError::into_inner);
        canonical.insert(post_id, counts.post_id);
        canonical.insert(counts.post_id, counts.post_id);
        if counts.post_id != post_id {
            debug!(post_id, canonical = counts.post_id, "Resolved repost to original");
        }
        Ok(counts.post_id)
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<Key, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Try to claim the (kind, post) slot. None means the tap is collapsed.
    fn claim(&self, key: Key) -> Option<InFlight> {
        let mut slots = self.slots();
        let slot = slots.entry(key).or_default();
        let now = Instant::now();
        let too_soon = slot
            .last_accepted
            .is_some_and(|t| now.duration_since(t) < self.debounce);
        if slot.in_flight || too_soon {
            return None;
        }
        slot.in_flight = true;
        slot.last_accepted = Some(now);
        Some(InFlight {
            slots: self.slots.clone(),
            key,
        })
    }

    /// Flip the session user's `kind` relation with `post_id` (an original
    /// or a repost of it).
    pub async fn toggle(&self, kind: RelationKind, post_id: i64) -> Result<ToggleOutcome> {
        let post_id = self.resolve(post_id).await?;
        let key = (kind, post_id);
        let Some(_guard) = self.claim(key) else {
            let active = self.cache.has(kind, post_id);
            debug!(kind = %kind, post_id, active, "Toggle debounced");
            return Ok(ToggleOutcome::Debounced { active });
        };

        let previous = self.cache.has(kind, post_id);
        let target = !previous;
        self.cache.set(kind, post_id, target);

        match self.api.set_relation(kind, post_id, target).await {
            Ok(state) => {
                // The server answer wins over the optimistic flip.
                if state.post_id != post_id {
                    self.cache.set(kind, post_id, previous);
                }
                self.cache.set(kind, state.post_id, state.active);
                if let Err(e) = self.cache.persist() {
                    warn!(error = %e, "Failed to persist membership cache");
                }
                self.publish_counts(state.post_id).await;
                Ok(ToggleOutcome::Applied {
                    active: state.active,
                    count: state.count,
                })
            }
            Err(e) => {
                self.cache.set(kind, post_id, previous);
                warn!(kind = %kind, post_id, error = %e, retryable = e.is_retryable(), "Toggle failed, rolled back");
                Err(e)
            }
        }
    }

    /// Push fresh counts to every local view of the post.
    async fn publish_counts(&self, post_id: i64) {
        match self.api.post_counts(post_id).await {
            Ok(counts) => {
                self.bus.publish(Topic::Post(post_id), Event::Counters(counts));
            }
            // The server's own push will converge the views.
            Err(e) => debug!(post_id, error = %e, "Could not refresh counts after toggle"),
        }
    }
}
