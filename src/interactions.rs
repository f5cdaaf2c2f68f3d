// Interaction service: the server-side mutation path.
//
// Every operation resolves the target post to its canonical id (the
// original for a repost), writes through the store (relation + counter in
// one transaction), then publishes to the bus and fans out notifications.
// Fan-out failures are logged and swallowed: the interaction has already
// committed and the pull path will still show the correct counts.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::bus::{CommentDeletedEvent, CommentEvent, Event, EventBus, Topic};
use crate::counters::CounterReconciler;
use crate::db::models::{Comment, Notification, Post, PostCounts, RelationKind};
use crate::db::Database;
use crate::error::{InteractionError, Result};
use crate::notify::{Notifier, Trigger};

/// Longest comment body accepted, in characters.
pub const MAX_COMMENT_CHARS: usize = 2_000;

/// Result of a like/repost toggle as seen by the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationOutcome {
    /// Canonical post the relation was written against.
    pub post_id: i64,
    pub kind: RelationKind,
    /// State after the call.
    pub active: bool,
    /// False for a duplicate request that changed nothing.
    pub changed: bool,
    /// Counter after the call.
    pub count: i64,
    /// Derived repost row (created on repost, removed on unrepost).
    pub repost: Option<Post>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentOutcome {
    pub comment: Comment,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentList {
    pub post_id: i64,
    pub comments: Vec<Comment>,
    pub count: i64,
}

#[derive(Clone)]
pub struct InteractionService {
    db: Arc<dyn Database>,
    notifier: Notifier,
    bus: EventBus,
    counters: CounterReconciler,
}

impl InteractionService {
    pub fn new(db: Arc<dyn Database>, bus: EventBus) -> Self {
        Self {
            notifier: Notifier::new(db.clone(), bus.clone()),
            counters: CounterReconciler::new(db.clone(), bus.clone()),
            db,
            bus,
        }
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn counters(&self) -> &CounterReconciler {
        &self.counters
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn db(&self) -> &Arc<dyn Database> {
        &self.db
    }

    /// Look up a post and follow a repost to its original.
    pub async fn resolve_post(&self, post_id: i64) -> Result<Post> {
        let post = self
            .db
            .get_post(post_id)
            .await?
            .ok_or_else(|| InteractionError::not_found(format!("Post {post_id}")))?;

        match post.original_post_id {
            None => Ok(post),
            Some(original_id) => self
                .db
                .get_post(original_id)
                .await?
                .ok_or_else(|| InteractionError::not_found(format!("Post {original_id}"))),
        }
    }

    async fn require_user(&self, user_id: i64) -> Result<()> {
        if self.db.user_exists(user_id).await? {
            Ok(())
        } else {
            Err(InteractionError::not_found(format!("User {user_id}")))
        }
    }

    async fn publish_counts(&self, post_id: i64) {
        match self.db.post_counts(post_id).await {
            Ok(Some(counts)) => {
                self.bus.publish(Topic::Post(post_id), Event::Counters(counts));
            }
            Ok(None) => {}
            Err(e) => warn!(post_id, error = %e, "Failed to read counters for push"),
        }
    }

    async fn fan_out(&self, recipient: i64, actor: i64, trigger: Trigger) {
        if let Err(e) = self.notifier.notify(recipient, actor, &trigger, None).await {
            warn!(recipient, actor, kind = %trigger.kind(), error = %e, "Notification fan-out failed");
        }
    }

    // --- Likes & reposts ---

    /// Drive the (user, post, kind) relation to `active`. Repeating a call
    /// with the same target state is a no-op that returns the current count.
    pub async fn set_relation(
        &self,
        kind: RelationKind,
        user_id: i64,
        post_id: i64,
        active: bool,
    ) -> Result<RelationOutcome> {
        self.require_user(user_id).await?;
        let post = self.resolve_post(post_id).await?;

        let write = self
            .db
            .write_relation(kind, user_id, post.id, active)
            .await?;

        if write.changed {
            info!(user_id, post_id = post.id, kind = %kind, active, count = write.count, "Relation updated");
            self.publish_counts(post.id).await;

            let trigger = match kind {
                RelationKind::Like => Trigger::Like { post_id: post.id },
                RelationKind::Repost => Trigger::Repost { post_id: post.id },
            };
            if active {
                self.fan_out(post.author_id, user_id, trigger).await;
            } else if kind == RelationKind::Repost {
                if let Err(e) = self.notifier.retract(post.author_id, user_id, &trigger).await {
                    warn!(post_id = post.id, error = %e, "Failed to retract repost notification");
                }
            }
        }

        Ok(RelationOutcome {
            post_id: post.id,
            kind,
            active,
            changed: write.changed,
            count: write.count,
            repost: write.repost,
        })
    }

    pub async fn like(&self, user_id: i64, post_id: i64) -> Result<RelationOutcome> {
        self.set_relation(RelationKind::Like, user_id, post_id, true).await
    }

    pub async fn unlike(&self, user_id: i64, post_id: i64) -> Result<RelationOutcome> {
        self.set_relation(RelationKind::Like, user_id, post_id, false).await
    }

    pub async fn repost(&self, user_id: i64, post_id: i64) -> Result<RelationOutcome> {
        self.set_relation(RelationKind::Repost, user_id, post_id, true).await
    }

    pub async fn unrepost(&self, user_id: i64, post_id: i64) -> Result<RelationOutcome> {
        self.set_relation(RelationKind::Repost, user_id, post_id, false).await
    }

    /// Canonical post ids `user_id` has an active relation of `kind` with.
    pub async fn relations(&self, user_id: i64, kind: RelationKind) -> Result<Vec<i64>> {
        Ok(self.db.related_post_ids(user_id, kind).await?)
    }

    pub async fn counts(&self, post_id: i64) -> Result<PostCounts> {
        Ok(self.resolve_post(post_id).await?.counts())
    }

    // --- Comments ---

    /// Attach a comment to the canonical post, even when `post_id` names a
    /// repost.
    pub async fn add_comment(&self, user_id: i64, post_id: i64, content: &str) -> Result<CommentOutcome> {
        let content = content.trim();
        if content.is_empty() {
            return Err(InteractionError::validation("Comment cannot be empty"));
        }
        if content.chars().count() > MAX_COMMENT_CHARS {
            return Err(InteractionError::validation(format!(
                "Comment exceeds {MAX_COMMENT_CHARS} characters"
            )));
        }
        self.require_user(user_id).await?;
        let post = self.resolve_post(post_id).await?;

        let (comment, count) = self.db.insert_comment(post.id, user_id, content).await?;
        info!(comment_id = comment.id, post_id = post.id, user_id, count, "Comment added");

        self.bus
            .publish(Topic::Post(post.id), Event::NewComment(CommentEvent::from(&comment)));
        self.publish_counts(post.id).await;
        self.fan_out(
            post.author_id,
            user_id,
            Trigger::Comment {
                post_id: post.id,
                comment_id: comment.id,
            },
        )
        .await;

        Ok(CommentOutcome { comment, count })
    }

    /// Soft-delete a comment. Only its author may do this.
    pub async fn delete_comment(&self, user_id: i64, comment_id: i64) -> Result<i64> {
        let comment = self
            .db
            .get_comment(comment_id)
            .await?
            .ok_or_else(|| InteractionError::not_found(format!("Comment {comment_id}")))?;
        if comment.user_id != user_id {
            return Err(InteractionError::Forbidden(
                "Only the author can delete a comment".to_string(),
            ));
        }

        let count = self
            .db
            .delete_comment(comment_id)
            .await?
            .ok_or_else(|| InteractionError::not_found(format!("Comment {comment_id}")))?;
        info!(comment_id, post_id = comment.post_id, count, "Comment deleted");

        self.bus.publish(
            Topic::Post(comment.post_id),
            Event::CommentDeleted(CommentDeletedEvent {
                post_id: comment.post_id,
                id: comment_id,
            }),
        );
        self.publish_counts(comment.post_id).await;
        Ok(count)
    }

    /// Oldest-first comments on the canonical post, with the stored count.
    pub async fn list_comments(&self, post_id: i64) -> Result<CommentList> {
        let post = self.resolve_post(post_id).await?;
        let comments = self.db.list_comments(post.id).await?;
        Ok(CommentList {
            post_id: post.id,
            comments,
            count: post.comment_count,
        })
    }

    // --- Follows ---

    /// Returns true when a new follow was created.
    pub async fn follow(&self, follower_id: i64, followee_id: i64) -> Result<bool> {
        if follower_id == followee_id {
            return Err(InteractionError::validation("Cannot follow yourself"));
        }
        self.require_user(follower_id).await?;
        self.require_user(followee_id).await?;

        let created = self.db.insert_follow(follower_id, followee_id).await?;
        if created {
            info!(follower_id, followee_id, "Follow created");
            self.fan_out(followee_id, follower_id, Trigger::Follow).await;
        }
        Ok(created)
    }

    /// Returns true when a follow was removed.
    pub async fn unfollow(&self, follower_id: i64, followee_id: i64) -> Result<bool> {
        Ok(self.db.delete_follow(follower_id, followee_id).await?)
    }

    // --- Transactions ---

    /// Record that `sender` tipped `recipient`. The transfer itself happened
    /// elsewhere; `signature` is stored as an opaque reference.
    pub async fn record_transaction(
        &self,
        sender: i64,
        recipient: i64,
        amount: f64,
        signature: &str,
    ) -> Result<Option<Notification>> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(InteractionError::validation("Amount must be a positive number"));
        }
        let signature = signature.trim();
        if signature.is_empty() {
            return Err(InteractionError::validation("Transaction signature is required"));
        }
        self.require_user(recipient).await?;

        self.notifier
            .notify(
                recipient,
                sender,
                &Trigger::Transaction {
                    amount,
                    signature: signature.to_string(),
                },
                None,
            )
            .await
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::db::sqlite::SqliteDatabase;

    struct Fixture {
        service: InteractionService,
        alice: i64,
        bob: i64,
        post: Post,
    }

    async fn fixture() -> Fixture {
        let db: Arc<dyn Database> = Arc::new(SqliteDatabase::in_memory().unwrap());
        let alice = db.create_user("alice").await.unwrap();
        let bob = db.create_user("bob").await.unwrap();
        let post = db.create_post(alice, "first post").await.unwrap();
        Fixture {
            service: InteractionService::new(db, EventBus::new()),
            alice,
            bob,
            post,
        }
    }

    #[tokio::test]
    async fn test_duplicate_like_is_noop() {
        let f = fixture().await;
        let first = f.service.like(f.bob, f.post.id).await.unwrap();
        assert!(first.changed);
        assert_eq!(first.count, 1);

        let second = f.service.like(f.bob, f.post.id).await.unwrap();
        assert!(!second.changed);
        assert_eq!(second.count, 1);

        assert_eq!(f.service.notifier().unread_count(f.alice).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unlike_without_like_stays_at_zero() {
        let f = fixture().await;
        let out = f.service.unlike(f.bob, f.post.id).await.unwrap();
        assert!(!out.changed);
        assert_eq!(out.count, 0);
    }

    #[tokio::test]
    async fn test_like_on_repost_counts_against_original() {
        let f = fixture().await;
        let repost = f.service.repost(f.bob, f.post.id).await.unwrap();
        let derived = repost.repost.unwrap();
        assert_eq!(derived.original_post_id, Some(f.post.id));

        let out = f.service.like(f.alice, derived.id).await.unwrap();
        assert_eq!(out.post_id, f.post.id);
        assert_eq!(f.service.counts(f.post.id).await.unwrap().likes, 1);
        assert_eq!(f.service.counts(derived.id).await.unwrap().likes, 1);
    }

    #[tokio::test]
    async fn test_unrepost_restores_count_and_hides_derived_row() {
        let f = fixture().await;
        let repost = f.service.repost(f.bob, f.post.id).await.unwrap();
        assert_eq!(repost.count, 1);
        let derived = repost.repost.unwrap();

        let undone = f.service.unrepost(f.bob, f.post.id).await.unwrap();
        assert!(undone.changed);
        assert_eq!(undone.count, 0);

        let listed = f.service.db().list_posts(50).await.unwrap();
        assert!(listed.iter().all(|p| p.id != derived.id));
        assert!(matches!(
            f.service.resolve_post(derived.id).await.unwrap_err(),
            InteractionError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_unrepost_retracts_unread_notification() {
        let f = fixture().await;
        f.service.repost(f.bob, f.post.id).await.unwrap();
        assert_eq!(f.service.notifier().unread_count(f.alice).await.unwrap(), 1);
        f.service.unrepost(f.bob, f.post.id).await.unwrap();
        assert_eq!(f.service.notifier().unread_count(f.alice).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_comment_on_repost_attaches_to_original() {
        let f = fixture().await;
        let derived = f.service.repost(f.bob, f.post.id).await.unwrap().repost.unwrap();

        let out = f.service.add_comment(f.bob, derived.id, "nice").await.unwrap();
        assert_eq!(out.comment.post_id, f.post.id);
        assert_eq!(out.count, 1);

        let list = f.service.list_comments(derived.id).await.unwrap();
        assert_eq!(list.post_id, f.post.id);
        assert_eq!(list.count, 1);
        assert_eq!(list.comments[0].author, "bob");
    }

    #[tokio::test]
    async fn test_empty_comment_rejected() {
        let f = fixture().await;
        let err = f.service.add_comment(f.bob, f.post.id, "   ").await.unwrap_err();
        assert!(matches!(err, InteractionError::Validation(_)));
        assert_eq!(f.service.counts(f.post.id).await.unwrap().comments, 0);
    }

    #[tokio::test]
    async fn test_only_author_deletes_comment() {
        let f = fixture().await;
        let out = f.service.add_comment(f.bob, f.post.id, "hi").await.unwrap();

        let err = f
            .service
            .delete_comment(f.alice, out.comment.id)
            .await
            .unwrap_err();
        assert!(matches!(err, InteractionError::Forbidden(_)));

        assert_eq!(f.service.delete_comment(f.bob, out.comment.id).await.unwrap(), 0);
        let err = f
            .service
            .delete_comment(f.bob, out.comment.id)
            .await
            .unwrap_err();
        assert!(matches!(err, InteractionError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_follow_rules() {
        let f = fixture().await;
        assert!(matches!(
            f.service.follow(f.bob, f.bob).await.unwrap_err(),
            InteractionError::Validation(_)
        ));
        assert!(f.service.follow(f.bob, f.alice).await.unwrap());
        assert!(!f.service.follow(f.bob, f.alice).await.unwrap());
        assert!(f.service.unfollow(f.bob, f.alice).await.unwrap());
        assert!(!f.service.unfollow(f.bob, f.alice).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_post_is_not_found() {
        let f = fixture().await;
        let err = f.service.like(f.bob, f.post.id + 100).await.unwrap_err();
        assert!(matches!(err, InteractionError::NotFound(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_transaction_validation() {
        let f = fixture().await;
        for amount in [0.0, -1.0, f64::NAN] {
            let err = f
                .service
                .record_transaction(f.bob, f.alice, amount, "sig")
                .await
                .unwrap_err();
            assert!(matches!(err, InteractionError::Validation(_)));
        }
        let n = f
            .service
            .record_transaction(f.bob, f.alice, 2.0, "sig")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n.message, "You received 2.00 SOL.");
    }
}
