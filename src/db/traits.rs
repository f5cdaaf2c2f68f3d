// Database trait: backend-agnostic async interface for all DB operations.
//
// Implementors: SqliteDatabase (wraps rusqlite), PgDatabase (wraps sqlx).
// All methods are async so both sync (rusqlite via Mutex) and native async
// (sqlx) backends fit behind a single interface.
//
// Relation writes are atomic with their counter adjustment on every backend.

use anyhow::Result;
use async_trait::async_trait;

use super::models::{
    Comment, CounterDrift, CounterField, NewNotification, Notification, NotificationFilter,
    NotificationKind, Post, PostCounts, RelationKind, RelationWrite,
};

#[async_trait]
pub trait Database: Send + Sync {
    // --- Lifecycle ---

    /// Count the number of user-created tables in the database.
    async fn table_count(&self) -> Result<i64>;

    // --- Users & posts ---

    async fn create_user(&self, username: &str) -> Result<i64>;

    /// True if the user exists and isn't soft-deleted.
    async fn user_exists(&self, user_id: i64) -> Result<bool>;

    async fn create_post(&self, author_id: i64, content: &str) -> Result<Post>;

    /// Get a non-deleted post.
    async fn get_post(&self, post_id: i64) -> Result<Option<Post>>;

    /// Newest-first listing of non-deleted posts.
    async fn list_posts(&self, limit: u32) -> Result<Vec<Post>>;

    // --- Counters ---

    /// Atomically add `delta` to a counter, floored at zero.
    /// Returns None if the post is missing.
    async fn adjust_counter(&self, post_id: i64, field: CounterField, delta: i64)
        -> Result<Option<i64>>;

    async fn post_counts(&self, post_id: i64) -> Result<Option<PostCounts>>;

    /// Recompute counters from relation rows and correct drift.
    async fn reconcile_counters(&self) -> Result<Vec<CounterDrift>>;

    // --- Relations ---

    /// Create (`active = true`) or destroy a like/retweet relation together
    /// with its counter adjustment. Duplicates report `changed = false`.
    async fn write_relation(
        &self,
        kind: RelationKind,
        user_id: i64,
        post_id: i64,
        active: bool,
    ) -> Result<RelationWrite>;

    /// Post ids the user has an active relation of this kind with.
    async fn related_post_ids(&self, user_id: i64, kind: RelationKind) -> Result<Vec<i64>>;

    /// Returns true if a new follow row was created.
    async fn insert_follow(&self, follower_id: i64, followee_id: i64) -> Result<bool>;

    /// Returns true if a follow row was removed.
    async fn delete_follow(&self, follower_id: i64, followee_id: i64) -> Result<bool>;

    // --- Comments ---

    /// Insert a comment and bump the counter. Returns (comment, new count).
    async fn insert_comment(&self, post_id: i64, user_id: i64, content: &str)
        -> Result<(Comment, i64)>;

    async fn get_comment(&self, comment_id: i64) -> Result<Option<Comment>>;

    /// Soft-delete a comment and decrement. None if it was already gone.
    async fn delete_comment(&self, comment_id: i64) -> Result<Option<i64>>;

    async fn list_comments(&self, post_id: i64) -> Result<Vec<Comment>>;

    // --- Notifications ---

    async fn insert_notification(&self, new: &NewNotification) -> Result<Notification>;

    async fn find_unread_notification(
        &self,
        user_id: i64,
        actor_id: i64,
        kind: NotificationKind,
        entity_id: Option<&str>,
    ) -> Result<Option<Notification>>;

    async fn get_notification(&self, notification_id: i64) -> Result<Option<Notification>>;

    /// Newest-first page of live notifications.
    async fn list_notifications(
        &self,
        user_id: i64,
        filter: &NotificationFilter,
    ) -> Result<Vec<Notification>>;

    async fn unread_count(&self, user_id: i64) -> Result<i64>;

    /// Idempotent. None if the notification doesn't exist.
    async fn mark_notification_read(&self, notification_id: i64) -> Result<Option<Notification>>;

    async fn mark_all_notifications_read(&self, user_id: i64) -> Result<u64>;

    /// Soft-delete matching unread notifications. Read ones are kept.
    async fn retract_unread_notifications(
        &self,
        user_id: i64,
        actor_id: i64,
        kind: NotificationKind,
        entity_id: Option<&str>,
    ) -> Result<u64>;
}
