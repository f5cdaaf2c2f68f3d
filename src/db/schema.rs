// Database schema: table creation and migrations.
//
// We use a simple version-based migration approach: a `schema_version` table
// tracks which migrations have run, and each migration is a function that
// executes SQL statements.
//
// Timestamps are ISO-8601 UTC text with millisecond precision so that
// newest-first ordering is meaningful inside a single second.

use anyhow::{Context, Result};
use rusqlite::Connection;

/// SQL expression for "now" in the stored timestamp format.
pub const NOW: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";

/// Create all tables if they don't exist yet.
///
/// This is idempotent and safe to call on every startup.
pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute_batch(
        "
        -- Tracks schema version for future migrations
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );

        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            deleted_at TEXT
        );

        -- Posts carry denormalized counters. A repost is its own row with
        -- original_post_id set; its counters stay at zero.
        CREATE TABLE IF NOT EXISTS posts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            author_id INTEGER NOT NULL REFERENCES users(id),
            content TEXT NOT NULL,
            original_post_id INTEGER REFERENCES posts(id),
            like_count INTEGER NOT NULL DEFAULT 0 CHECK (like_count >= 0),
            repost_count INTEGER NOT NULL DEFAULT 0 CHECK (repost_count >= 0),
            comment_count INTEGER NOT NULL DEFAULT 0 CHECK (comment_count >= 0),
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            deleted_at TEXT
        );

        -- Existence of a row means \"liked\". The primary key is the
        -- idempotency guard for duplicate toggle requests.
        CREATE TABLE IF NOT EXISTS likes (
            user_id INTEGER NOT NULL REFERENCES users(id),
            post_id INTEGER NOT NULL REFERENCES posts(id),
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            PRIMARY KEY (user_id, post_id)
        );

        CREATE TABLE IF NOT EXISTS retweets (
            user_id INTEGER NOT NULL REFERENCES users(id),
            post_id INTEGER NOT NULL REFERENCES posts(id),
            repost_post_id INTEGER NOT NULL REFERENCES posts(id),
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            PRIMARY KEY (user_id, post_id)
        );

        CREATE TABLE IF NOT EXISTS follows (
            follower_id INTEGER NOT NULL REFERENCES users(id),
            followee_id INTEGER NOT NULL REFERENCES users(id),
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            PRIMARY KEY (follower_id, followee_id),
            CHECK (follower_id <> followee_id)
        );

        CREATE TABLE IF NOT EXISTS comments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            post_id INTEGER NOT NULL REFERENCES posts(id),
            user_id INTEGER NOT NULL REFERENCES users(id),
            content TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            deleted_at TEXT
        );

        CREATE TABLE IF NOT EXISTS notifications (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(id),
            actor_id INTEGER NOT NULL REFERENCES users(id),
            type TEXT NOT NULL,                -- like / comment / follow / repost / transaction
            message TEXT NOT NULL,
            amount REAL,                       -- transaction only
            entity_id TEXT,                    -- post id, comment id or transaction signature
            entity_type TEXT,
            is_read INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            deleted_at TEXT,
            CHECK (user_id <> actor_id)
        );

        CREATE INDEX IF NOT EXISTS idx_posts_original
            ON posts(original_post_id);

        CREATE INDEX IF NOT EXISTS idx_likes_post
            ON likes(post_id);

        CREATE INDEX IF NOT EXISTS idx_retweets_post
            ON retweets(post_id);

        CREATE INDEX IF NOT EXISTS idx_comments_post
            ON comments(post_id);

        -- Unread counts and list pulls per recipient
        CREATE INDEX IF NOT EXISTS idx_notifications_user_read
            ON notifications(user_id, is_read);
        ",
    )
    .context("Failed to create database tables")?;

    // Record initial schema version if not already set
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [1],
    )?;

    // Migration v2: newest-first notification listing per recipient.
    run_migration(conn, 2, |c| {
        c.execute_batch(
            "CREATE INDEX IF NOT EXISTS idx_notifications_user_created
                ON notifications(user_id, created_at DESC, id DESC);",
        )
    })?;

    Ok(())
}

/// Run a migration if it hasn't been applied yet.
/// The migration function receives the connection and should execute its SQL.
fn run_migration<F>(conn: &Connection, version: i64, migrate: F) -> Result<()>
where
    F: FnOnce(&Connection) -> rusqlite::Result<()>,
{
    let already_applied: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM schema_version WHERE version = ?1",
        [version],
        |row| row.get(0),
    )?;

    if !already_applied {
        migrate(conn).with_context(|| format!("Migration v{version} failed"))?;
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [version],
        )?;
    }

    Ok(())
}

/// Count the number of tables in the database (useful for init confirmation).
pub fn table_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_tables_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        // Running create_tables twice should not error
        create_tables(&conn).unwrap();
        create_tables(&conn).unwrap();
    }

    #[test]
    fn test_table_count() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        let count = table_count(&conn).unwrap();
        // schema_version, users, posts, likes, retweets, follows,
        // comments, notifications = 8 tables
        assert_eq!(count, 8i64);
    }

    #[test]
    fn test_migrations_recorded_once() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        create_tables(&conn).unwrap();
        create_tables(&conn).unwrap();

        let versions: Vec<i64> = conn
            .prepare("SELECT version FROM schema_version ORDER BY version")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(versions, vec![1, 2]);
    }

    #[test]
    fn test_counter_check_constraint_rejects_negative() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        conn.execute("INSERT INTO users (username) VALUES ('a')", [])
            .unwrap();
        conn.execute("INSERT INTO posts (author_id, content) VALUES (1, 'x')", [])
            .unwrap();
        let result = conn.execute("UPDATE posts SET like_count = -1 WHERE id = 1", []);
        assert!(result.is_err());
    }

    #[test]
    fn test_self_notification_rejected_by_schema() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        conn.execute("INSERT INTO users (username) VALUES ('a')", [])
            .unwrap();
        let result = conn.execute(
            "INSERT INTO notifications (user_id, actor_id, type, message) VALUES (1, 1, 'like', 'x')",
            [],
        );
        assert!(result.is_err());
    }
}
