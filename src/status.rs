// System status display: shows store location, table count and the most
// recent posts with their counters.

use anyhow::Result;
use colored::Colorize;
use std::path::Path;
use std::sync::Arc;

use crate::db::Database;

/// Display system status to the terminal.
pub async fn show(db: &Arc<dyn Database>, db_display_path: &str, is_file: bool) -> Result<()> {
    if is_file {
        if !Path::new(db_display_path).exists() {
            println!("Database: not initialized");
            println!("\nRun `murmur init` to set up the database.");
            return Ok(());
        }
        let file_size = std::fs::metadata(db_display_path)
            .map(|m| format_bytes(m.len()))
            .unwrap_or_else(|_| "unknown".to_string());
        println!("Database: {} ({})", db_display_path, file_size);
    } else {
        println!("Database: {}", db_display_path);
    }

    println!("Tables: {}", db.table_count().await?);

    let posts = db.list_posts(5).await?;
    if posts.is_empty() {
        println!("Recent posts: none yet");
        println!("  Run `murmur add-post <author-id> <content>` to create one");
    } else {
        println!("Recent posts:");
        for post in &posts {
            let label = if post.is_repost() {
                format!("#{} (repost of #{})", post.id, post.canonical_id())
            } else {
                format!("#{}", post.id)
            };
            println!(
                "  {}: {} likes, {} reposts, {} comments",
                label.bold(),
                post.like_count,
                post.repost_count,
                post.comment_count
            );
        }
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }
}
