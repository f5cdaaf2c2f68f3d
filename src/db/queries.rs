// Database queries: CRUD operations for all tables.
//
// Every database interaction goes through this module. This keeps SQL
// contained in one place and gives the rest of the app clean Rust interfaces.
//
// Relation writes (likes, retweets, comments) run inside a transaction that
// also adjusts the post's denormalized counter, so the relation row and the
// counter commit or roll back together. Duplicate inserts hit the primary
// key and do nothing, and the counter is only touched when a row changed.

use anyhow::{anyhow, Result};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::models::{
    Comment, CounterDrift, CounterField, EntityType, NewNotification, Notification,
    NotificationFilter, NotificationKind, Post, PostCounts, RelationKind, RelationWrite,
};
use super::schema::NOW;

const POST_COLUMNS: &str = "id, author_id, content, created_at, like_count, repost_count, \
                            comment_count, original_post_id";

const NOTIFICATION_COLUMNS: &str = "id, user_id, actor_id, type, message, amount, entity_id, \
                                    entity_type, is_read, created_at";

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        author_id: row.get(1)?,
        content: row.get(2)?,
        created_at: row.get(3)?,
        like_count: row.get(4)?,
        repost_count: row.get(5)?,
        comment_count: row.get(6)?,
        original_post_id: row.get(7)?,
    })
}

fn notification_from_row(row: &Row<'_>) -> rusqlite::Result<Notification> {
    let kind: String = row.get(3)?;
    let kind = NotificationKind::parse(&kind).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            Type::Text,
            format!("unknown notification type '{kind}'").into(),
        )
    })?;
    let entity_type: Option<String> = row.get(7)?;
    Ok(Notification {
        id: row.get(0)?,
        user_id: row.get(1)?,
        actor_id: row.get(2)?,
        kind,
        message: row.get(4)?,
        amount: row.get(5)?,
        entity_id: row.get(6)?,
        entity_type: entity_type.as_deref().and_then(EntityType::parse),
        is_read: row.get(8)?,
        created_at: row.get(9)?,
    })
}

// --- Users ---

/// Create a user and return its id.
pub fn create_user(conn: &Connection, username: &str) -> Result<i64> {
    conn.execute("INSERT INTO users (username) VALUES (?1)", params![username])?;
    Ok(conn.last_insert_rowid())
}

/// True if the user exists and isn't soft-deleted.
pub fn user_exists(conn: &Connection, user_id: i64) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM users WHERE id = ?1 AND deleted_at IS NULL",
        params![user_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

// --- Posts ---

/// Create an original (non-repost) post.
pub fn create_post(conn: &Connection, author_id: i64, content: &str) -> Result<Post> {
    let sql = format!(
        "INSERT INTO posts (author_id, content) VALUES (?1, ?2) RETURNING {POST_COLUMNS}"
    );
    let post = conn.query_row(&sql, params![author_id, content], post_from_row)?;
    Ok(post)
}

/// Get a non-deleted post by id.
pub fn get_post(conn: &Connection, post_id: i64) -> Result<Option<Post>> {
    let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1 AND deleted_at IS NULL");
    let post = conn.query_row(&sql, params![post_id], post_from_row).optional()?;
    Ok(post)
}

/// Newest-first listing of non-deleted posts (originals and live reposts).
pub fn list_posts(conn: &Connection, limit: u32) -> Result<Vec<Post>> {
    let sql = format!(
        "SELECT {POST_COLUMNS} FROM posts
         WHERE deleted_at IS NULL
         ORDER BY created_at DESC, id DESC
         LIMIT ?1"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![limit], post_from_row)?;

    let mut posts = Vec::new();
    for row in rows {
        posts.push(row?);
    }
    Ok(posts)
}

/// Current counter snapshot for a non-deleted post.
pub fn post_counts(conn: &Connection, post_id: i64) -> Result<Option<PostCounts>> {
    Ok(get_post(conn, post_id)?.map(|p| p.counts()))
}

// --- Counters ---

/// Atomically add `delta` to a counter, flooring at zero.
///
/// Single UPDATE … RETURNING statement: no read-modify-write, so concurrent
/// adjusters can't lose updates. Returns None if the post is missing.
pub fn adjust_counter(
    conn: &Connection,
    post_id: i64,
    field: CounterField,
    delta: i64,
) -> Result<Option<i64>> {
    let col = field.column();
    let sql = format!(
        "UPDATE posts SET {col} = MAX({col} + ?2, 0)
         WHERE id = ?1 AND deleted_at IS NULL
         RETURNING {col}"
    );
    let value = conn
        .query_row(&sql, params![post_id, delta], |row| row.get(0))
        .optional()?;
    Ok(value)
}

fn read_counter(conn: &Connection, post_id: i64, field: CounterField) -> Result<Option<i64>> {
    let col = field.column();
    let sql = format!("SELECT {col} FROM posts WHERE id = ?1 AND deleted_at IS NULL");
    let value = conn
        .query_row(&sql, params![post_id], |row| row.get(0))
        .optional()?;
    Ok(value)
}

fn counter_after(
    conn: &Connection,
    post_id: i64,
    field: CounterField,
    changed: bool,
    delta: i64,
) -> Result<i64> {
    let value = if changed {
        adjust_counter(conn, post_id, field, delta)?
    } else {
        read_counter(conn, post_id, field)?
    };
    value.ok_or_else(|| anyhow!("post {post_id} disappeared during {} update", field.column()))
}

/// Recompute every original post's counters from the relation rows and
/// correct any drift. Returns what was corrected.
pub fn reconcile_counters(conn: &mut Connection) -> Result<Vec<CounterDrift>> {
    let tx = conn.transaction()?;

    let mut drifts = Vec::new();
    {
        let mut stmt = tx.prepare(
            "SELECT p.id,
                    p.like_count, (SELECT COUNT(*) FROM likes l WHERE l.post_id = p.id),
                    p.repost_count, (SELECT COUNT(*) FROM retweets r WHERE r.post_id = p.id),
                    p.comment_count, (SELECT COUNT(*) FROM comments c
                                      WHERE c.post_id = p.id AND c.deleted_at IS NULL)
             FROM posts p
             WHERE p.original_post_id IS NULL",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                [
                    (CounterField::Like, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?),
                    (CounterField::Repost, row.get(3)?, row.get(4)?),
                    (CounterField::Comment, row.get(5)?, row.get(6)?),
                ],
            ))
        })?;

        for row in rows {
            let (post_id, fields) = row?;
            for (field, stored, actual) in fields {
                if stored != actual {
                    drifts.push(CounterDrift {
                        post_id,
                        field,
                        stored,
                        actual,
                    });
                }
            }
        }
    }

    for drift in &drifts {
        let col = drift.field.column();
        tx.execute(
            &format!("UPDATE posts SET {col} = ?2 WHERE id = ?1"),
            params![drift.post_id, drift.actual],
        )?;
    }

    tx.commit()?;
    Ok(drifts)
}

// --- Likes ---

/// Insert a like and bump the counter in one transaction.
pub fn insert_like(conn: &mut Connection, user_id: i64, post_id: i64) -> Result<RelationWrite> {
    let tx = conn.transaction()?;
    let inserted = tx.execute(
        "INSERT INTO likes (user_id, post_id) VALUES (?1, ?2)
         ON CONFLICT(user_id, post_id) DO NOTHING",
        params![user_id, post_id],
    )? == 1;
    let count = counter_after(&tx, post_id, CounterField::Like, inserted, 1)?;
    tx.commit()?;
    Ok(RelationWrite {
        changed: inserted,
        count,
        repost: None,
    })
}

/// Remove a like and decrement the counter in one transaction.
pub fn delete_like(conn: &mut Connection, user_id: i64, post_id: i64) -> Result<RelationWrite> {
    let tx = conn.transaction()?;
    let deleted = tx.execute(
        "DELETE FROM likes WHERE user_id = ?1 AND post_id = ?2",
        params![user_id, post_id],
    )? == 1;
    let count = counter_after(&tx, post_id, CounterField::Like, deleted, -1)?;
    tx.commit()?;
    Ok(RelationWrite {
        changed: deleted,
        count,
        repost: None,
    })
}

// --- Retweets ---

/// Create the retweet relation, its derived post row, and bump the counter.
///
/// The derived row copies the original's content under the reposting user.
/// A duplicate request leaves everything untouched and returns the existing
/// derived row.
pub fn insert_repost(conn: &mut Connection, user_id: i64, post_id: i64) -> Result<RelationWrite> {
    let tx = conn.transaction()?;

    let existing: Option<i64> = tx
        .query_row(
            "SELECT repost_post_id FROM retweets WHERE user_id = ?1 AND post_id = ?2",
            params![user_id, post_id],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(repost_id) = existing {
        let repost = get_post(&tx, repost_id)?;
        let count = counter_after(&tx, post_id, CounterField::Repost, false, 0)?;
        tx.commit()?;
        return Ok(RelationWrite {
            changed: false,
            count,
            repost,
        });
    }

    let sql = format!(
        "INSERT INTO posts (author_id, content, original_post_id)
         SELECT ?1, content, id FROM posts WHERE id = ?2 AND deleted_at IS NULL
         RETURNING {POST_COLUMNS}"
    );
    let repost = tx
        .query_row(&sql, params![user_id, post_id], post_from_row)
        .optional()?
        .ok_or_else(|| anyhow!("post {post_id} disappeared before repost"))?;

    tx.execute(
        "INSERT INTO retweets (user_id, post_id, repost_post_id) VALUES (?1, ?2, ?3)",
        params![user_id, post_id, repost.id],
    )?;
    let count = counter_after(&tx, post_id, CounterField::Repost, true, 1)?;
    tx.commit()?;

    Ok(RelationWrite {
        changed: true,
        count,
        repost: Some(repost),
    })
}

/// Remove the retweet relation, soft-delete its derived row, decrement.
pub fn delete_repost(conn: &mut Connection, user_id: i64, post_id: i64) -> Result<RelationWrite> {
    let tx = conn.transaction()?;

    let existing: Option<i64> = tx
        .query_row(
            "DELETE FROM retweets WHERE user_id = ?1 AND post_id = ?2 RETURNING repost_post_id",
            params![user_id, post_id],
            |row| row.get(0),
        )
        .optional()?;

    let Some(repost_id) = existing else {
        let count = counter_after(&tx, post_id, CounterField::Repost, false, 0)?;
        tx.commit()?;
        return Ok(RelationWrite {
            changed: false,
            count,
            repost: None,
        });
    };

    let sql = format!(
        "UPDATE posts SET deleted_at = {NOW}
         WHERE id = ?1 AND deleted_at IS NULL
         RETURNING {POST_COLUMNS}"
    );
    let repost = tx
        .query_row(&sql, params![repost_id], post_from_row)
        .optional()?;
    let count = counter_after(&tx, post_id, CounterField::Repost, true, -1)?;
    tx.commit()?;

    Ok(RelationWrite {
        changed: true,
        count,
        repost,
    })
}

/// Post ids the user currently has an active relation with.
pub fn related_post_ids(conn: &Connection, user_id: i64, kind: RelationKind) -> Result<Vec<i64>> {
    let sql = match kind {
        RelationKind::Like => "SELECT post_id FROM likes WHERE user_id = ?1 ORDER BY post_id",
        RelationKind::Repost => "SELECT post_id FROM retweets WHERE user_id = ?1 ORDER BY post_id",
    };
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params![user_id], |row| row.get(0))?;

    let mut ids = Vec::new();
    for row in rows {
        ids.push(row?);
    }
    Ok(ids)
}

// --- Follows ---

/// Returns true if a new follow row was created.
pub fn insert_follow(conn: &Connection, follower_id: i64, followee_id: i64) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT INTO follows (follower_id, followee_id) VALUES (?1, ?2)
         ON CONFLICT(follower_id, followee_id) DO NOTHING",
        params![follower_id, followee_id],
    )?;
    Ok(inserted == 1)
}

/// Returns true if a follow row was removed.
pub fn delete_follow(conn: &Connection, follower_id: i64, followee_id: i64) -> Result<bool> {
    let deleted = conn.execute(
        "DELETE FROM follows WHERE follower_id = ?1 AND followee_id = ?2",
        params![follower_id, followee_id],
    )?;
    Ok(deleted == 1)
}

// --- Comments ---

const COMMENT_SELECT: &str = "SELECT c.id, c.post_id, c.user_id, u.username, c.content, c.created_at
                              FROM comments c JOIN users u ON u.id = c.user_id";

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        post_id: row.get(1)?,
        user_id: row.get(2)?,
        author: row.get(3)?,
        content: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Insert a comment and bump the post's comment counter. Returns the
/// comment and the new count.
pub fn insert_comment(
    conn: &mut Connection,
    post_id: i64,
    user_id: i64,
    content: &str,
) -> Result<(Comment, i64)> {
    let tx = conn.transaction()?;
    let comment_id: i64 = tx.query_row(
        "INSERT INTO comments (post_id, user_id, content) VALUES (?1, ?2, ?3) RETURNING id",
        params![post_id, user_id, content],
        |row| row.get(0),
    )?;
    let count = counter_after(&tx, post_id, CounterField::Comment, true, 1)?;
    let comment = tx.query_row(
        &format!("{COMMENT_SELECT} WHERE c.id = ?1"),
        params![comment_id],
        comment_from_row,
    )?;
    tx.commit()?;
    Ok((comment, count))
}

/// Get a non-deleted comment.
pub fn get_comment(conn: &Connection, comment_id: i64) -> Result<Option<Comment>> {
    let comment = conn
        .query_row(
            &format!("{COMMENT_SELECT} WHERE c.id = ?1 AND c.deleted_at IS NULL"),
            params![comment_id],
            comment_from_row,
        )
        .optional()?;
    Ok(comment)
}

/// Soft-delete a comment and decrement the counter. Returns the new count,
/// or None if the comment was already gone.
pub fn delete_comment(conn: &mut Connection, comment_id: i64) -> Result<Option<i64>> {
    let tx = conn.transaction()?;
    // A comment on a post that is itself gone counts as gone.
    let post_id: Option<i64> = tx
        .query_row(
            &format!(
                "UPDATE comments SET deleted_at = {NOW}
                 WHERE id = ?1 AND deleted_at IS NULL
                   AND post_id IN (SELECT id FROM posts WHERE deleted_at IS NULL)
                 RETURNING post_id"
            ),
            params![comment_id],
            |row| row.get(0),
        )
        .optional()?;

    let Some(post_id) = post_id else {
        return Ok(None);
    };
    let count = counter_after(&tx, post_id, CounterField::Comment, true, -1)?;
    tx.commit()?;
    Ok(Some(count))
}

/// All live comments on a post, oldest first.
pub fn list_comments(conn: &Connection, post_id: i64) -> Result<Vec<Comment>> {
    let mut stmt = conn.prepare(&format!(
        "{COMMENT_SELECT} WHERE c.post_id = ?1 AND c.deleted_at IS NULL
         ORDER BY c.created_at ASC, c.id ASC"
    ))?;
    let rows = stmt.query_map(params![post_id], comment_from_row)?;

    let mut comments = Vec::new();
    for row in rows {
        comments.push(row?);
    }
    Ok(comments)
}

// --- Notifications ---

/// Store a validated notification.
pub fn insert_notification(conn: &Connection, new: &NewNotification) -> Result<Notification> {
    let sql = format!(
        "INSERT INTO notifications (user_id, actor_id, type, message, amount, entity_id, entity_type)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         RETURNING {NOTIFICATION_COLUMNS}"
    );
    let notification = conn.query_row(
        &sql,
        params![
            new.user_id(),
            new.actor_id(),
            new.kind.as_str(),
            new.message,
            new.amount,
            new.entity_id,
            new.entity_type.map(|t| t.as_str()),
        ],
        notification_from_row,
    )?;
    Ok(notification)
}

/// Find a live, unread notification for the same (recipient, actor, type, entity).
pub fn find_unread_notification(
    conn: &Connection,
    user_id: i64,
    actor_id: i64,
    kind: NotificationKind,
    entity_id: Option<&str>,
) -> Result<Option<Notification>> {
    let sql = format!(
        "SELECT {NOTIFICATION_COLUMNS} FROM notifications
         WHERE user_id = ?1 AND actor_id = ?2 AND type = ?3 AND entity_id IS ?4
           AND is_read = 0 AND deleted_at IS NULL
         ORDER BY id DESC LIMIT 1"
    );
    let found = conn
        .query_row(
            &sql,
            params![user_id, actor_id, kind.as_str(), entity_id],
            notification_from_row,
        )
        .optional()?;
    Ok(found)
}

/// Get a live notification by id.
pub fn get_notification(conn: &Connection, notification_id: i64) -> Result<Option<Notification>> {
    let sql = format!(
        "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = ?1 AND deleted_at IS NULL"
    );
    let found = conn
        .query_row(&sql, params![notification_id], notification_from_row)
        .optional()?;
    Ok(found)
}

/// Newest-first page of a user's live notifications, optionally by type.
pub fn list_notifications(
    conn: &Connection,
    user_id: i64,
    filter: &NotificationFilter,
) -> Result<Vec<Notification>> {
    let sql = format!(
        "SELECT {NOTIFICATION_COLUMNS} FROM notifications
         WHERE user_id = ?1 AND deleted_at IS NULL AND (?2 IS NULL OR type = ?2)
         ORDER BY created_at DESC, id DESC
         LIMIT ?3 OFFSET ?4"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![
            user_id,
            filter.kind.map(|k| k.as_str()),
            filter.limit,
            filter.offset
        ],
        notification_from_row,
    )?;

    let mut notifications = Vec::new();
    for row in rows {
        notifications.push(row?);
    }
    Ok(notifications)
}

pub fn unread_count(conn: &Connection, user_id: i64) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM notifications
         WHERE user_id = ?1 AND is_read = 0 AND deleted_at IS NULL",
        params![user_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Flip is_read on one notification. Idempotent; returns the row, or None
/// if it doesn't exist.
pub fn mark_notification_read(
    conn: &Connection,
    notification_id: i64,
) -> Result<Option<Notification>> {
    let sql = format!(
        "UPDATE notifications SET is_read = 1
         WHERE id = ?1 AND deleted_at IS NULL
         RETURNING {NOTIFICATION_COLUMNS}"
    );
    let updated = conn
        .query_row(&sql, params![notification_id], notification_from_row)
        .optional()?;
    Ok(updated)
}

/// Mark every unread notification for a user as read. Returns how many flipped.
pub fn mark_all_notifications_read(conn: &Connection, user_id: i64) -> Result<u64> {
    let changed = conn.execute(
        "UPDATE notifications SET is_read = 1
         WHERE user_id = ?1 AND is_read = 0 AND deleted_at IS NULL",
        params![user_id],
    )?;
    Ok(changed as u64)
}

/// Soft-delete matching notifications that haven't been read yet.
pub fn retract_unread_notifications(
    conn: &Connection,
    user_id: i64,
    actor_id: i64,
    kind: NotificationKind,
    entity_id: Option<&str>,
) -> Result<u64> {
    let changed = conn.execute(
        &format!(
            "UPDATE notifications SET deleted_at = {NOW}
             WHERE user_id = ?1 AND actor_id = ?2 AND type = ?3 AND entity_id IS ?4
               AND is_read = 0 AND deleted_at IS NULL"
        ),
        params![user_id, actor_id, kind.as_str(), entity_id],
    )?;
    Ok(changed as u64)
}
