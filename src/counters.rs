// Counter reconciler: reads, adjusts and repairs the denormalized
// like/repost/comment counters on posts.
//
// Relation writes adjust their counter inside the store's own transaction;
// this type is the standalone entry point for everything else (snapshots
// for initial view loads, manual adjustments, and the periodic drift pass).
// Every post a drift pass corrects gets a fresh `counters` event so open
// views stop showing the stale value.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::bus::{Event, EventBus, Topic};
use crate::db::models::{CounterDrift, CounterField, PostCounts};
use crate::db::Database;
use crate::error::{InteractionError, Result};

#[derive(Clone)]
pub struct CounterReconciler {
    db: Arc<dyn Database>,
    bus: EventBus,
}

impl CounterReconciler {
    pub fn new(db: Arc<dyn Database>, bus: EventBus) -> Self {
        Self { db, bus }
    }

    /// Atomically apply `delta` to one counter, floored at zero.
    pub async fn adjust(&self, post_id: i64, field: CounterField, delta: i64) -> Result<i64> {
        self.db
            .adjust_counter(post_id, field, delta)
            .await?
            .ok_or_else(|| InteractionError::not_found(format!("Post {post_id}")))
    }

    /// Current counters for a post.
    pub async fn snapshot(&self, post_id: i64) -> Result<PostCounts> {
        self.db
            .post_counts(post_id)
            .await?
            .ok_or_else(|| InteractionError::not_found(format!("Post {post_id}")))
    }

    /// Recompute every counter from the relation rows and fix drift.
    pub async fn reconcile(&self) -> Result<Vec<CounterDrift>> {
        let drifts = self.db.reconcile_counters().await?;
        for d in &drifts {
            warn!(
                post_id = d.post_id,
                field = d.field.column(),
                stored = d.stored,
                actual = d.actual,
                "Counter drift corrected"
            );
        }
        info!(corrected = drifts.len(), "Counter reconciliation complete");

        let posts: BTreeSet<i64> = drifts.iter().map(|d| d.post_id).collect();
        for post_id in posts {
            match self.db.post_counts(post_id).await {
                Ok(Some(counts)) => {
                    self.bus.publish(Topic::Post(post_id), Event::Counters(counts));
                }
                Ok(None) => {}
                Err(e) => debug!(post_id, error = %e, "Could not publish corrected counters"),
            }
        }
        Ok(drifts)
    }
}
