// SqliteDatabase: rusqlite backend implementing the Database trait.
//
// The Connection is wrapped in tokio::sync::Mutex because Connection is !Send.
// Trait methods lock the mutex, do synchronous rusqlite work, and return.
// The lock is never held across .await points; Rust enforces this because
// MutexGuard is !Send.
//
// Holding the lock for the whole of a relation write also serializes
// concurrent writers, on top of the transaction inside queries.rs.

use anyhow::Result;
use async_trait::async_trait;
use rusqlite::Connection;
use tokio::sync::Mutex;

use super::models::{
    Comment, CounterDrift, CounterField, NewNotification, Notification, NotificationFilter,
    NotificationKind, Post, PostCounts, RelationKind, RelationWrite,
};
use super::queries;
use super::traits::Database;

pub struct SqliteDatabase {
    conn: Mutex<Connection>,
}

impl SqliteDatabase {
    /// Wrap an already-opened rusqlite Connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Fresh in-memory database with the schema applied. Used by tests and
    /// by embedders that don't need persistence.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        super::schema::create_tables(&conn)?;
        Ok(Self::new(conn))
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    async fn table_count(&self) -> Result<i64> {
        let conn = self.conn.lock().await;
        super::schema::table_count(&conn)
    }

    async fn create_user(&self, username: &str) -> Result<i64> {
        let conn = self.conn.lock().await;
        queries::create_user(&conn, username)
    }

    async fn user_exists(&self, user_id: i64) -> Result<bool> {
        let conn = self.conn.lock().await;
        queries::user_exists(&conn, user_id)
    }

    async fn create_post(&self, author_id: i64, content: &str) -> Result<Post> {
        let conn = self.conn.lock().await;
        queries::create_post(&conn, author_id, content)
    }

    async fn get_post(&self, post_id: i64) -> Result<Option<Post>> {
        let conn = self.conn.lock().await;
        queries::get_post(&conn, post_id)
    }

    async fn list_posts(&self, limit: u32) -> Result<Vec<Post>> {
        let conn = self.conn.lock().await;
        queries::list_posts(&conn, limit)
    }

    async fn adjust_counter(
        &self,
        post_id: i64,
        field: CounterField,
        delta: i64,
    ) -> Result<Option<i64>> {
        let conn = self.conn.lock().await;
        queries::adjust_counter(&conn, post_id, field, delta)
    }

    async fn post_counts(&self, post_id: i64) -> Result<Option<PostCounts>> {
        let conn = self.conn.lock().await;
        queries::post_counts(&conn, post_id)
    }

    async fn reconcile_counters(&self) -> Result<Vec<CounterDrift>> {
        let mut conn = self.conn.lock().await;
        queries::reconcile_counters(&mut conn)
    }

    async fn write_relation(
        &self,
        kind: RelationKind,
        user_id: i64,
        post_id: i64,
        active: bool,
    ) -> Result<RelationWrite> {
        let mut conn = self.conn.lock().await;
        match (kind, active) {
            (RelationKind::Like, true) => queries::insert_like(&mut conn, user_id, post_id),
            (RelationKind::Like, false) => queries::delete_like(&mut conn, user_id, post_id),
            (RelationKind::Repost, true) => queries::insert_repost(&mut conn, user_id, post_id),
            (RelationKind::Repost, false) => queries::delete_repost(&mut conn, user_id, post_id),
        }
    }

    async fn related_post_ids(&self, user_id: i64, kind: RelationKind) -> Result<Vec<i64>> {
        let conn = self.conn.lock().await;
        queries::related_post_ids(&conn, user_id, kind)
    }

    async fn insert_follow(&self, follower_id: i64, followee_id: i64) -> Result<bool> {
        let conn = self.conn.lock().await;
        queries::insert_follow(&conn, follower_id, followee_id)
    }

    async fn delete_follow(&self, follower_id: i64, followee_id: i64) -> Result<bool> {
        let conn = self.conn.lock().await;
        queries::delete_follow(&conn, follower_id, followee_id)
    }

    async fn insert_comment(
        &self,
        post_id: i64,
        user_id: i64,
        content: &str,
    ) -> Result<(Comment, i64)> {
        let mut conn = self.conn.lock().await;
        queries::insert_comment(&mut conn, post_id, user_id, content)
    }

    async fn get_comment(&self, comment_id: i64) -> Result<Option<Comment>> {
        let conn = self.conn.lock().await;
        queries::get_comment(&conn, comment_id)
    }

    async fn delete_comment(&self, comment_id: i64) -> Result<Option<i64>> {
        let mut conn = self.conn.lock().await;
        queries::delete_comment(&mut conn, comment_id)
    }

    async fn list_comments(&self, post_id: i64) -> Result<Vec<Comment>> {
        let conn = self.conn.lock().await;
        queries::list_comments(&conn, post_id)
    }

    async fn insert_notification(&self, new: &NewNotification) -> Result<Notification> {
        let conn = self.conn.lock().await;
        queries::insert_notification(&conn, new)
    }

    async fn find_unread_notification(
        &self,
        user_id: i64,
        actor_id: i64,
        kind: NotificationKind,
        entity_id: Option<&str>,
    ) -> Result<Option<Notification>> {
        let conn = self.conn.lock().await;
        queries::find_unread_notification(&conn, user_id, actor_id, kind, entity_id)
    }

    async fn get_notification(&self, notification_id: i64) -> Result<Option<Notification>> {
        let conn = self.conn.lock().await;
        queries::get_notification(&conn, notification_id)
    }

    async fn list_notifications(
        &self,
        user_id: i64,
        filter: &NotificationFilter,
    ) -> Result<Vec<Notification>> {
        let conn = self.conn.lock().await;
        queries::list_notifications(&conn, user_id, filter)
    }

    async fn unread_count(&self, user_id: i64) -> Result<i64> {
        let conn = self.conn.lock().await;
        queries::unread_count(&conn, user_id)
    }

    async fn mark_notification_read(&self, notification_id: i64) -> Result<Option<Notification>> {
        let conn = self.conn.lock().await;
        queries::mark_notification_read(&conn, notification_id)
    }

    async fn mark_all_notifications_read(&self, user_id: i64) -> Result<u64> {
        let conn = self.conn.lock().await;
        queries::mark_all_notifications_read(&conn, user_id)
    }

    async fn retract_unread_notifications(
        &self,
        user_id: i64,
        actor_id: i64,
        kind: NotificationKind,
        entity_id: Option<&str>,
    ) -> Result<u64> {
        let conn = self.conn.lock().await;
        queries::retract_unread_notifications(&conn, user_id, actor_id, kind, entity_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> SqliteDatabase {
        SqliteDatabase::in_memory().unwrap()
    }

    #[tokio::test]
    async fn test_trait_table_count() {
        let db = test_db().await;
        assert_eq!(db.table_count().await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_trait_relation_roundtrip() {
        let db = test_db().await;
        let alice = db.create_user("alice").await.unwrap();
        let bob = db.create_user("bob").await.unwrap();
        let post = db.create_post(alice, "gm").await.unwrap();

        let liked = db
            .write_relation(RelationKind::Like, bob, post.id, true)
            .await
            .unwrap();
        assert!(liked.changed);
        assert_eq!(liked.count, 1);
        assert_eq!(
            db.related_post_ids(bob, RelationKind::Like).await.unwrap(),
            vec![post.id]
        );

        let unliked = db
            .write_relation(RelationKind::Like, bob, post.id, false)
            .await
            .unwrap();
        assert!(unliked.changed);
        assert_eq!(unliked.count, 0);
        assert!(db
            .related_post_ids(bob, RelationKind::Like)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_trait_concurrent_likes_both_counted() {
        let db = std::sync::Arc::new(test_db().await);
        let alice = db.create_user("alice").await.unwrap();
        let bob = db.create_user("bob").await.unwrap();
        let carol = db.create_user("carol").await.unwrap();
        let post = db.create_post(alice, "gm").await.unwrap();

        let (a, b) = tokio::join!(
            db.write_relation(RelationKind::Like, bob, post.id, true),
            db.write_relation(RelationKind::Like, carol, post.id, true),
        );
        assert!(a.unwrap().changed);
        assert!(b.unwrap().changed);
        assert_eq!(db.post_counts(post.id).await.unwrap().unwrap().likes, 2);
    }

    #[tokio::test]
    async fn test_trait_user_exists() {
        let db = test_db().await;
        let id = db.create_user("dana").await.unwrap();
        assert!(db.user_exists(id).await.unwrap());
        assert!(!db.user_exists(id + 100).await.unwrap());
    }
}
