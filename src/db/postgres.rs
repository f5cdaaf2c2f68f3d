// PgDatabase: PostgreSQL backend implementing the Database trait.
//
// Uses sqlx PgPool for native async queries. All queries use runtime
// parameter binding (not compile-time macros) to avoid requiring
// DATABASE_URL at compile time.
//
// Key differences from SQLite:
// - TIMESTAMPTZ instead of TEXT for timestamps (formatted back to ISO-8601)
// - GREATEST() instead of two-argument MAX() for the counter floor
// - IS NOT DISTINCT FROM instead of IS for nullable equality
// - $1/$2 parameter syntax (handled by sqlx)
// - GENERATED ALWAYS AS IDENTITY for auto-increment
//
// Counter updates are single UPDATE … RETURNING statements; the row lock
// they take is what keeps concurrent likers from losing updates.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use sqlx_core::pool::Pool;
use sqlx_core::row::Row;
use sqlx_postgres::{PgRow, Postgres};

use super::models::{
    Comment, CounterDrift, CounterField, EntityType, NewNotification, Notification,
    NotificationFilter, NotificationKind, Post, PostCounts, RelationKind, RelationWrite,
};
use super::traits::Database;

/// Type alias for the PostgreSQL connection pool.
pub type PgPool = Pool<Postgres>;

const TS_FORMAT: &str = r#"'YYYY-MM-DD"T"HH24:MI:SS.MS"Z"'"#;

fn post_columns() -> String {
    format!(
        "id, author_id, content, to_char(created_at AT TIME ZONE 'UTC', {TS_FORMAT}) AS created_at, \
         like_count, repost_count, comment_count, original_post_id"
    )
}

fn notification_columns() -> String {
    format!(
        "id, user_id, actor_id, type, message, amount, entity_id, entity_type, is_read, \
         to_char(created_at AT TIME ZONE 'UTC', {TS_FORMAT}) AS created_at"
    )
}

fn comment_select() -> String {
    format!(
        "SELECT c.id, c.post_id, c.user_id, u.username, c.content,
                to_char(c.created_at AT TIME ZONE 'UTC', {TS_FORMAT}) AS created_at
         FROM comments c JOIN users u ON u.id = c.user_id"
    )
}

fn post_from_row(row: &PgRow) -> Post {
    Post {
        id: row.get(0),
        author_id: row.get(1),
        content: row.get(2),
        created_at: row.get(3),
        like_count: row.get(4),
        repost_count: row.get(5),
        comment_count: row.get(6),
        original_post_id: row.get(7),
    }
}

fn comment_from_row(row: &PgRow) -> Comment {
    Comment {
        id: row.get(0),
        post_id: row.get(1),
        user_id: row.get(2),
        author: row.get(3),
        content: row.get(4),
        created_at: row.get(5),
    }
}

fn notification_from_row(row: &PgRow) -> Result<Notification> {
    let kind: String = row.get(3);
    let entity_type: Option<String> = row.get(7);
    Ok(Notification {
        id: row.get(0),
        user_id: row.get(1),
        actor_id: row.get(2),
        kind: NotificationKind::parse(&kind)
            .ok_or_else(|| anyhow!("unknown notification type '{kind}'"))?,
        message: row.get(4),
        amount: row.get(5),
        entity_id: row.get(6),
        entity_type: entity_type.as_deref().and_then(EntityType::parse),
        is_read: row.get(8),
        created_at: row.get(9),
    })
}

pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    /// Connect to PostgreSQL and run migrations.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Run all pending migrations.
    ///
    /// Acquires a Postgres session-level advisory lock so that concurrent
    /// processes (e.g. two server instances starting together) don't race
    /// to apply the same migration. The lock and unlock run on the same
    /// dedicated connection; the unlock always runs even if a migration
    /// fails. Each migration runs in its own transaction.
    async fn run_migrations(&self) -> Result<()> {
        // ASCII "MURMUR" as a big-endian i64.
        const MIGRATION_LOCK_KEY: i64 = 0x4D55524D5552_i64;

        let mut lock_conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire connection for migration advisory lock")?;

        sqlx_core::query::query("SELECT pg_advisory_lock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .execute(&mut *lock_conn)
            .await
            .context("Failed to acquire migration advisory lock")?;

        let migration_result: Result<()> = async {
            sqlx_core::query::query(
                "CREATE TABLE IF NOT EXISTS schema_version (
                    version INTEGER PRIMARY KEY,
                    applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                )",
            )
            .execute(&self.pool)
            .await?;

            let migrations = [
                (
                    1,
                    include_str!("../../migrations/postgres/0001_initial.sql"),
                ),
                (
                    2,
                    include_str!("../../migrations/postgres/0002_notification_listing.sql"),
                ),
            ];

            for (version, sql) in migrations {
                let applied: bool = sqlx_core::query::query(
                    "SELECT COUNT(*) > 0 FROM schema_version WHERE version = $1",
                )
                .bind(version)
                .fetch_one(&self.pool)
                .await
                .map(|row| row.get::<bool, _>(0))
                .unwrap_or(false);

                if !applied {
                    let mut tx = self.pool.begin().await?;
                    sqlx_core::raw_sql::raw_sql(sql).execute(&mut *tx).await?;
                    tx.commit().await?;
                }
            }

            Ok(())
        }
        .await;

        let unlock_result = sqlx_core::query::query("SELECT pg_advisory_unlock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .execute(&mut *lock_conn)
            .await
            .context("Failed to release migration advisory lock");

        // Migration error takes priority over unlock error.
        migration_result?;
        unlock_result?;

        Ok(())
    }

    /// Recount one post in its own short transaction. The row lock is taken
    /// by a separate statement first so the counting statement runs on a
    /// snapshot that includes every writer that held the lock before us.
    async fn reconcile_post(&self, post_id: i64) -> Result<Vec<CounterDrift>> {
        let mut tx = self.pool.begin().await?;
        let locked = sqlx_core::query::query(
            "SELECT id FROM posts WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
        )
        .bind(post_id)
        .fetch_optional(&mut *tx)
        .await?;
        if locked.is_none() {
            return Ok(Vec::new());
        }

        let row = sqlx_core::query::query(
            "SELECT p.like_count, (SELECT COUNT(*) FROM likes l WHERE l.post_id = p.id),
                    p.repost_count, (SELECT COUNT(*) FROM retweets r WHERE r.post_id = p.id),
                    p.comment_count, (SELECT COUNT(*) FROM comments c
                                      WHERE c.post_id = p.id AND c.deleted_at IS NULL)
             FROM posts p
             WHERE p.id = $1",
        )
        .bind(post_id)
        .fetch_one(&mut *tx)
        .await?;

        let mut drifts = Vec::new();
        for (field, stored_idx) in [
            (CounterField::Like, 0usize),
            (CounterField::Repost, 2),
            (CounterField::Comment, 4),
        ] {
            let stored: i64 = row.get(stored_idx);
            let actual: i64 = row.get(stored_idx + 1);
            if stored == actual {
                continue;
            }
            let col = field.column();
            sqlx_core::query::query(&format!("UPDATE posts SET {col} = $2 WHERE id = $1"))
                .bind(post_id)
                .bind(actual)
                .execute(&mut *tx)
                .await?;
            drifts.push(CounterDrift {
                post_id,
                field,
                stored,
                actual,
            });
        }

        tx.commit().await?;
        Ok(drifts)
    }

    async fn counter_in<'c, E>(
        executor: E,
        post_id: i64,
        field: CounterField,
        delta: i64,
    ) -> Result<i64>
    where
        E: sqlx_core::executor::Executor<'c, Database = Postgres>,
    {
        let col = field.column();
        let sql = if delta == 0 {
            format!("SELECT {col} FROM posts WHERE id = $1 AND deleted_at IS NULL")
        } else {
            format!(
                "UPDATE posts SET {col} = GREATEST({col} + $2, 0)
                 WHERE id = $1 AND deleted_at IS NULL
                 RETURNING {col}"
            )
        };
        let mut query = sqlx_core::query::query(&sql).bind(post_id);
        if delta != 0 {
            query = query.bind(delta);
        }
        let row = query.fetch_optional(executor).await?;
        row.map(|r| r.get::<i64, _>(0))
            .ok_or_else(|| anyhow!("post {post_id} disappeared during {col} update"))
    }

    async fn write_like(&self, user_id: i64, post_id: i64, active: bool) -> Result<RelationWrite> {
        let mut tx = self.pool.begin().await?;
        let sql = if active {
            "INSERT INTO likes (user_id, post_id) VALUES ($1, $2)
             ON CONFLICT (user_id, post_id) DO NOTHING"
        } else {
            "DELETE FROM likes WHERE user_id = $1 AND post_id = $2"
        };
        let changed = sqlx_core::query::query(sql)
            .bind(user_id)
            .bind(post_id)
            .execute(&mut *tx)
            .await?
            .rows_affected()
            == 1;
        let delta = match (changed, active) {
            (false, _) => 0,
            (true, true) => 1,
            (true, false) => -1,
        };
        let count = Self::counter_in(&mut *tx, post_id, CounterField::Like, delta).await?;
        tx.commit().await?;
        Ok(RelationWrite {
            changed,
            count,
            repost: None,
        })
    }

    async fn insert_repost(&self, user_id: i64, post_id: i64) -> Result<RelationWrite> {
        let mut tx = self.pool.begin().await?;

        let repost_row = sqlx_core::query::query(&format!(
            "INSERT INTO posts (author_id, content, original_post_id)
             SELECT $1, content, id FROM posts WHERE id = $2 AND deleted_at IS NULL
             RETURNING {}",
            post_columns()
        ))
        .bind(user_id)
        .bind(post_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| anyhow!("post {post_id} disappeared before repost"))?;
        let repost = post_from_row(&repost_row);

        // The primary key serializes duplicate requests: the loser waits for
        // the winner to commit, then does nothing.
        let inserted = sqlx_core::query::query(
            "INSERT INTO retweets (user_id, post_id, repost_post_id) VALUES ($1, $2, $3)
             ON CONFLICT (user_id, post_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(post_id)
        .bind(repost.id)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        if !inserted {
            // Drops the derived row we just created.
            tx.rollback().await?;
            let existing = sqlx_core::query::query(&format!(
                "SELECT {} FROM posts p
                 WHERE p.id = (SELECT repost_post_id FROM retweets WHERE user_id = $1 AND post_id = $2)
                   AND p.deleted_at IS NULL",
                post_columns()
            ))
            .bind(user_id)
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await?;
            let count = Self::counter_in(&self.pool, post_id, CounterField::Repost, 0).await?;
            return Ok(RelationWrite {
                changed: false,
                count,
                repost: existing.as_ref().map(post_from_row),
            });
        }

        let count = Self::counter_in(&mut *tx, post_id, CounterField::Repost, 1).await?;
        tx.commit().await?;
        Ok(RelationWrite {
            changed: true,
            count,
            repost: Some(repost),
        })
    }

    async fn delete_repost(&self, user_id: i64, post_id: i64) -> Result<RelationWrite> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx_core::query::query(
            "DELETE FROM retweets WHERE user_id = $1 AND post_id = $2 RETURNING repost_post_id",
        )
        .bind(user_id)
        .bind(post_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(removed) = removed else {
            let count = Self::counter_in(&mut *tx, post_id, CounterField::Repost, 0).await?;
            tx.commit().await?;
            return Ok(RelationWrite {
                changed: false,
                count,
                repost: None,
            });
        };
        let repost_id: i64 = removed.get(0);

        let repost = sqlx_core::query::query(&format!(
            "UPDATE posts SET deleted_at = NOW()
             WHERE id = $1 AND deleted_at IS NULL
             RETURNING {}",
            post_columns()
        ))
        .bind(repost_id)
        .fetch_optional(&mut *tx)
        .await?;
        let count = Self::counter_in(&mut *tx, post_id, CounterField::Repost, -1).await?;
        tx.commit().await?;

        Ok(RelationWrite {
            changed: true,
            count,
            repost: repost.as_ref().map(post_from_row),
        })
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn table_count(&self) -> Result<i64> {
        let row = sqlx_core::query::query(
            "SELECT COUNT(*)::bigint FROM information_schema.tables
             WHERE table_schema = 'public' AND table_type = 'BASE TABLE'",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<i64, _>(0))
    }

    async fn create_user(&self, username: &str) -> Result<i64> {
        let row = sqlx_core::query::query("INSERT INTO users (username) VALUES ($1) RETURNING id")
            .bind(username)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>(0))
    }

    async fn user_exists(&self, user_id: i64) -> Result<bool> {
        let row = sqlx_core::query::query(
            "SELECT COUNT(*) > 0 FROM users WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<bool, _>(0))
    }

    async fn create_post(&self, author_id: i64, content: &str) -> Result<Post> {
        let row = sqlx_core::query::query(&format!(
            "INSERT INTO posts (author_id, content) VALUES ($1, $2) RETURNING {}",
            post_columns()
        ))
        .bind(author_id)
        .bind(content)
        .fetch_one(&self.pool)
        .await?;
        Ok(post_from_row(&row))
    }

    async fn get_post(&self, post_id: i64) -> Result<Option<Post>> {
        let row = sqlx_core::query::query(&format!(
            "SELECT {} FROM posts WHERE id = $1 AND deleted_at IS NULL",
            post_columns()
        ))
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(post_from_row))
    }

    async fn list_posts(&self, limit: u32) -> Result<Vec<Post>> {
        let rows = sqlx_core::query::query(&format!(
            "SELECT {} FROM posts
             WHERE deleted_at IS NULL
             ORDER BY created_at DESC, id DESC
             LIMIT $1",
            post_columns()
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(post_from_row).collect())
    }

    async fn adjust_counter(
        &self,
        post_id: i64,
        field: CounterField,
        delta: i64,
    ) -> Result<Option<i64>> {
        let col = field.column();
        let row = sqlx_core::query::query(&format!(
            "UPDATE posts SET {col} = GREATEST({col} + $2, 0)
             WHERE id = $1 AND deleted_at IS NULL
             RETURNING {col}"
        ))
        .bind(post_id)
        .bind(delta)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.get::<i64, _>(0)))
    }

    async fn post_counts(&self, post_id: i64) -> Result<Option<PostCounts>> {
        Ok(self.get_post(post_id).await?.map(|p| p.counts()))
    }

    async fn reconcile_counters(&self) -> Result<Vec<CounterDrift>> {
        let ids: Vec<i64> = sqlx_core::query::query(
            "SELECT id FROM posts WHERE original_post_id IS NULL AND deleted_at IS NULL ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|r| r.get::<i64, _>(0))
        .collect();

        let mut drifts = Vec::new();
        for post_id in ids {
            drifts.extend(self.reconcile_post(post_id).await?);
        }
        Ok(drifts)
    }

    async fn write_relation(
        &self,
        kind: RelationKind,
        user_id: i64,
        post_id: i64,
        active: bool,
    ) -> Result<RelationWrite> {
        match (kind, active) {
            (RelationKind::Like, _) => self.write_like(user_id, post_id, active).await,
            (RelationKind::Repost, true) => self.insert_repost(user_id, post_id).await,
            (RelationKind::Repost, false) => self.delete_repost(user_id, post_id).await,
        }
    }

    async fn related_post_ids(&self, user_id: i64, kind: RelationKind) -> Result<Vec<i64>> {
        let sql = match kind {
            RelationKind::Like => "SELECT post_id FROM likes WHERE user_id = $1 ORDER BY post_id",
            RelationKind::Repost => {
                "SELECT post_id FROM retweets WHERE user_id = $1 ORDER BY post_id"
            }
        };
        let rows = sqlx_core::query::query(sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|r| r.get::<i64, _>(0)).collect())
    }

    async fn insert_follow(&self, follower_id: i64, followee_id: i64) -> Result<bool> {
        let result = sqlx_core::query::query(
            "INSERT INTO follows (follower_id, followee_id) VALUES ($1, $2)
             ON CONFLICT (follower_id, followee_id) DO NOTHING",
        )
        .bind(follower_id)
        .bind(followee_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_follow(&self, follower_id: i64, followee_id: i64) -> Result<bool> {
        let result =
            sqlx_core::query::query("DELETE FROM follows WHERE follower_id = $1 AND followee_id = $2")
                .bind(follower_id)
                .bind(followee_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn insert_comment(
        &self,
        post_id: i64,
        user_id: i64,
        content: &str,
    ) -> Result<(Comment, i64)> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx_core::query::query(
            "INSERT INTO comments (post_id, user_id, content) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(post_id)
        .bind(user_id)
        .bind(content)
        .fetch_one(&mut *tx)
        .await?;
        let comment_id: i64 = row.get(0);

        let count = Self::counter_in(&mut *tx, post_id, CounterField::Comment, 1).await?;
        let row = sqlx_core::query::query(&format!("{} WHERE c.id = $1", comment_select()))
            .bind(comment_id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok((comment_from_row(&row), count))
    }

    async fn get_comment(&self, comment_id: i64) -> Result<Option<Comment>> {
        let row = sqlx_core::query::query(&format!(
            "{} WHERE c.id = $1 AND c.deleted_at IS NULL",
            comment_select()
        ))
        .bind(comment_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(comment_from_row))
    }

    async fn delete_comment(&self, comment_id: i64) -> Result<Option<i64>> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx_core::query::query(
            "UPDATE comments SET deleted_at = NOW()
             WHERE id = $1 AND deleted_at IS NULL
               AND post_id IN (SELECT id FROM posts WHERE deleted_at IS NULL)
             RETURNING post_id",
        )
        .bind(comment_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let post_id: i64 = row.get(0);
        let count = Self::counter_in(&mut *tx, post_id, CounterField::Comment, -1).await?;
        tx.commit().await?;
        Ok(Some(count))
    }

    async fn list_comments(&self, post_id: i64) -> Result<Vec<Comment>> {
        let rows = sqlx_core::query::query(&format!(
            "{} WHERE c.post_id = $1 AND c.deleted_at IS NULL
             ORDER BY c.created_at ASC, c.id ASC",
            comment_select()
        ))
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(comment_from_row).collect())
    }

    async fn insert_notification(&self, new: &NewNotification) -> Result<Notification> {
        let row = sqlx_core::query::query(&format!(
            "INSERT INTO notifications
                (user_id, actor_id, type, message, amount, entity_id, entity_type)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {}",
            notification_columns()
        ))
        .bind(new.user_id())
        .bind(new.actor_id())
        .bind(new.kind.as_str())
        .bind(&new.message)
        .bind(new.amount)
        .bind(&new.entity_id)
        .bind(new.entity_type.map(|t| t.as_str()))
        .fetch_one(&self.pool)
        .await?;
        notification_from_row(&row)
    }

    async fn find_unread_notification(
        &self,
        user_id: i64,
        actor_id: i64,
        kind: NotificationKind,
        entity_id: Option<&str>,
    ) -> Result<Option<Notification>> {
        let row = sqlx_core::query::query(&format!(
            "SELECT {} FROM notifications
             WHERE user_id = $1 AND actor_id = $2 AND type = $3
               AND entity_id IS NOT DISTINCT FROM $4
               AND is_read = FALSE AND deleted_at IS NULL
             ORDER BY id DESC LIMIT 1",
            notification_columns()
        ))
        .bind(user_id)
        .bind(actor_id)
        .bind(kind.as_str())
        .bind(entity_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(notification_from_row).transpose()
    }

    async fn get_notification(&self, notification_id: i64) -> Result<Option<Notification>> {
        let row = sqlx_core::query::query(&format!(
            "SELECT {} FROM notifications WHERE id = $1 AND deleted_at IS NULL",
            notification_columns()
        ))
        .bind(notification_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(notification_from_row).transpose()
    }

    async fn list_notifications(
        &self,
        user_id: i64,
        filter: &NotificationFilter,
    ) -> Result<Vec<Notification>> {
        let rows = sqlx_core::query::query(&format!(
            "SELECT {} FROM notifications
             WHERE user_id = $1 AND deleted_at IS NULL AND ($2::text IS NULL OR type = $2)
             ORDER BY created_at DESC, id DESC
             LIMIT $3 OFFSET $4",
            notification_columns()
        ))
        .bind(user_id)
        .bind(filter.kind.map(|k| k.as_str()))
        .bind(i64::from(filter.limit))
        .bind(i64::from(filter.offset))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(notification_from_row).collect()
    }

    async fn unread_count(&self, user_id: i64) -> Result<i64> {
        let row = sqlx_core::query::query(
            "SELECT COUNT(*)::bigint FROM notifications
             WHERE user_id = $1 AND is_read = FALSE AND deleted_at IS NULL",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<i64, _>(0))
    }

    async fn mark_notification_read(&self, notification_id: i64) -> Result<Option<Notification>> {
        let row = sqlx_core::query::query(&format!(
            "UPDATE notifications SET is_read = TRUE
             WHERE id = $1 AND deleted_at IS NULL
             RETURNING {}",
            notification_columns()
        ))
        .bind(notification_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(notification_from_row).transpose()
    }

    async fn mark_all_notifications_read(&self, user_id: i64) -> Result<u64> {
        let result = sqlx_core::query::query(
            "UPDATE notifications SET is_read = TRUE
             WHERE user_id = $1 AND is_read = FALSE AND deleted_at IS NULL",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn retract_unread_notifications(
        &self,
        user_id: i64,
        actor_id: i64,
        kind: NotificationKind,
        entity_id: Option<&str>,
    ) -> Result<u64> {
        let result = sqlx_core::query::query(
            "UPDATE notifications SET deleted_at = NOW()
             WHERE user_id = $1 AND actor_id = $2 AND type = $3
               AND entity_id IS NOT DISTINCT FROM $4
               AND is_read = FALSE AND deleted_at IS NULL",
        )
        .bind(user_id)
        .bind(actor_id)
        .bind(kind.as_str())
        .bind(entity_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
